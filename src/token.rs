//! Signed session tokens.
//!
//! Two classes are issued: short-lived access tokens that authorize
//! individual requests, and long-lived refresh tokens that are exchanged for
//! new access tokens. Both are HS256 JWTs carrying the account id; the
//! class rides in the claims so one can never stand in for the other.
//!
//! A refresh token's signature stays valid until its embedded expiry, so
//! server-side revocation (logout, password change) works through the digest
//! the account record keeps, not through the signature.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;

/// Token class, embedded in the claims as `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by every signed token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: String,
    /// Token class; checked on verification.
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    /// Unique id per token so two issued in the same second still differ.
    pub jti: String,
}

/// Verification failure, before collapsing into the public taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("expired token")]
    Expired,
}

/// Issues and verifies both token classes with a single signing secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.token_secret().expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: config.issuer().to_string(),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
        }
    }

    /// Mint a short-lived access token for `account_id`.
    pub fn issue_access(&self, account_id: Uuid) -> Result<String, anyhow::Error> {
        self.issue(account_id, TokenKind::Access, self.access_ttl)
    }

    /// Mint a long-lived refresh token for `account_id`.
    pub fn issue_refresh(&self, account_id: Uuid) -> Result<String, anyhow::Error> {
        self.issue(account_id, TokenKind::Refresh, self.refresh_ttl)
    }

    fn issue(
        &self,
        account_id: Uuid,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: account_id.to_string(),
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| anyhow::anyhow!("failed to sign token: {err}"))?;
        Ok(token)
    }

    /// Verify signature, issuer, expiry, and class; return the account id.
    ///
    /// Expiry is checked with zero leeway so the boundary is deterministic.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Uuid, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        if data.claims.kind != expected {
            return Err(TokenError::Invalid);
        }
        Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::Invalid)
    }
}
