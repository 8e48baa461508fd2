//! Credential lifecycle orchestration.
//!
//! [`AuthEngine`] owns every account state transition: registration, email
//! verification, login/logout, refresh rotation, password change, and
//! password recovery. It talks to its collaborators through traits (the
//! store for durable state, the notifier for out-of-band delivery) and its
//! only outputs are public views, opaque signed tokens, and typed errors.
//!
//! Race-safety comes from running each transition's final check inside the
//! store's atomic update: a mutation re-validates the pending state it is
//! about to consume, so the loser of a race gets a typed failure instead of
//! silently clobbering the winner.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::account::{self, Account, NewAccount, PendingToken, PublicUser};
use crate::config::AuthConfig;
use crate::error::Error;
use crate::notify::{Notification, Notifier, TokenPurpose};
use crate::password::PasswordHasher;
use crate::secret;
use crate::store::AccountStore;
use crate::token::{TokenIssuer, TokenKind};

/// Validated registration payload, as handed over by the transport layer.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Successful login: the public view plus both session tokens.
#[derive(Debug, Serialize)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub access_token: String,
    pub refresh_token: String,
}

/// Fresh tokens from a successful refresh.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthEngine {
    store: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
    config: AuthConfig,
}

impl AuthEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        config: AuthConfig,
    ) -> Self {
        let tokens = TokenIssuer::new(&config);
        Self {
            store,
            notifier,
            hasher: PasswordHasher::new(),
            tokens,
            config,
        }
    }

    /// Swap in a hasher with a non-default cost profile.
    #[must_use]
    pub fn with_password_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Create an unverified account and send the verification link.
    ///
    /// Fails [`Error::Conflict`] when the email or username is taken.
    pub async fn register(&self, request: RegisterRequest) -> Result<PublicUser, Error> {
        let email = account::normalize_email(&request.email);
        let username = account::normalize_username(&request.username);
        let full_name = request
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let password_hash = self.hasher.hash(&request.password).map_err(Error::Internal)?;
        let token = secret::generate_token().map_err(Error::Internal)?;
        let pending = PendingToken {
            token_hash: secret::hash_token(&token),
            expires_at: Utc::now() + self.config.verification_token_ttl(),
        };

        let created = self
            .store
            .create(NewAccount {
                username,
                email,
                full_name,
                password_hash,
                verification: Some(pending),
            })
            .await?;
        info!(account_id = %created.id, "account registered");

        self.dispatch(&created, TokenPurpose::Verification, &token);
        Ok(PublicUser::from(&created))
    }

    /// Consume a verification token and mark the email verified.
    ///
    /// Single-use: the fields are cleared in the same atomic update that
    /// flips the flag, so of two concurrent presentations of one token
    /// exactly one succeeds.
    pub async fn verify_email(&self, token: &str) -> Result<PublicUser, Error> {
        let token_hash = secret::hash_token(token.trim());
        let Some(found) = self
            .store
            .find_by_verification_token_hash(&token_hash)
            .await?
        else {
            return Err(Error::InvalidOrExpiredToken);
        };

        let now = Utc::now();
        let updated = self
            .store
            .update_atomically(
                found.id,
                Box::new(move |account| {
                    let live = account
                        .verification
                        .as_ref()
                        .is_some_and(|pending| pending.is_live(&token_hash, now));
                    if !live {
                        return Err(Error::InvalidOrExpiredToken);
                    }
                    account.email_verified = true;
                    account.verification = None;
                    Ok(())
                }),
            )
            .await?;
        info!(account_id = %updated.id, "email verified");
        Ok(PublicUser::from(&updated))
    }

    /// Replace the pending verification token and resend the link.
    pub async fn resend_verification(&self, account_id: Uuid) -> Result<(), Error> {
        let Some(found) = self.store.find_by_id(account_id).await? else {
            return Err(Error::NotFound);
        };
        if found.email_verified {
            return Err(Error::AlreadyVerified);
        }

        let token = secret::generate_token().map_err(Error::Internal)?;
        let pending = PendingToken {
            token_hash: secret::hash_token(&token),
            expires_at: Utc::now() + self.config.verification_token_ttl(),
        };
        let updated = self
            .store
            .update_atomically(
                account_id,
                Box::new(move |account| {
                    if account.email_verified {
                        return Err(Error::AlreadyVerified);
                    }
                    // One pending token per purpose: the old link dies here.
                    account.verification = Some(pending);
                    Ok(())
                }),
            )
            .await?;

        self.dispatch(&updated, TokenPurpose::Verification, &token);
        Ok(())
    }

    /// Authenticate with email and password and open a session.
    ///
    /// Unknown account and wrong password produce the same
    /// [`Error::InvalidCredentials`]. An unverified email does not block
    /// login; callers that want to gate on it read `email_verified` from the
    /// returned view.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, Error> {
        let email = account::normalize_email(&request.email);
        let Some(found) = self.store.find_by_email(&email).await? else {
            return Err(Error::InvalidCredentials);
        };
        if !self.hasher.verify(&request.password, &found.password_hash) {
            return Err(Error::InvalidCredentials);
        }

        let access_token = self.tokens.issue_access(found.id).map_err(Error::Internal)?;
        let refresh_token = self
            .tokens
            .issue_refresh(found.id)
            .map_err(Error::Internal)?;
        let refresh_hash = secret::hash_token(&refresh_token);
        // Single-session policy: a later login replaces the stored digest
        // and strands any earlier refresh token.
        let updated = self
            .store
            .update_atomically(
                found.id,
                Box::new(move |account| {
                    account.refresh_token_hash = Some(refresh_hash);
                    Ok(())
                }),
            )
            .await?;

        Ok(LoginOutcome {
            user: PublicUser::from(&updated),
            access_token,
            refresh_token,
        })
    }

    /// Exchange a live refresh token for a new token pair.
    ///
    /// The presented token must verify as a refresh token *and* match the
    /// digest on file; logout, password change, and rotation all clear or
    /// replace that digest, which is what revokes a token whose signature is
    /// still valid. Every successful refresh rotates: the old token dies.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let account_id = self
            .tokens
            .verify(refresh_token, TokenKind::Refresh)
            .map_err(|_| Error::InvalidOrExpiredToken)?;
        let presented_hash = secret::hash_token(refresh_token);

        let Some(found) = self.store.find_by_id(account_id).await? else {
            return Err(Error::InvalidOrExpiredToken);
        };
        let on_file = found
            .refresh_token_hash
            .as_deref()
            .is_some_and(|stored| secret::hashes_match(stored, &presented_hash));
        if !on_file {
            return Err(Error::InvalidOrExpiredToken);
        }

        let access_token = self
            .tokens
            .issue_access(account_id)
            .map_err(Error::Internal)?;
        let next_refresh = self
            .tokens
            .issue_refresh(account_id)
            .map_err(Error::Internal)?;
        let next_hash = secret::hash_token(&next_refresh);
        self.store
            .update_atomically(
                account_id,
                Box::new(move |account| {
                    let still_current = account
                        .refresh_token_hash
                        .as_deref()
                        .is_some_and(|stored| secret::hashes_match(stored, &presented_hash));
                    if !still_current {
                        // Logged out or rotated away by a concurrent request.
                        return Err(Error::InvalidOrExpiredToken);
                    }
                    account.refresh_token_hash = Some(next_hash);
                    Ok(())
                }),
            )
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token: next_refresh,
        })
    }

    /// Close the account's session. Idempotent: logging out twice is fine.
    pub async fn logout(&self, account_id: Uuid) -> Result<(), Error> {
        self.store
            .update_atomically(
                account_id,
                Box::new(|account| {
                    account.refresh_token_hash = None;
                    Ok(())
                }),
            )
            .await?;
        info!(account_id = %account_id, "session closed");
        Ok(())
    }

    /// Replace the password after re-proving the old one, and force every
    /// outstanding session to log in again.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        request: ChangePasswordRequest,
    ) -> Result<(), Error> {
        let Some(found) = self.store.find_by_id(account_id).await? else {
            return Err(Error::NotFound);
        };
        if !self.hasher.verify(&request.old_password, &found.password_hash) {
            return Err(Error::InvalidCredentials);
        }

        // The slow hash runs before the store takes exclusivity.
        let new_hash = self
            .hasher
            .hash(&request.new_password)
            .map_err(Error::Internal)?;
        self.store
            .update_atomically(
                account_id,
                Box::new(move |account| {
                    account.password_hash = new_hash;
                    account.refresh_token_hash = None;
                    Ok(())
                }),
            )
            .await?;
        info!(account_id = %account_id, "password changed");
        Ok(())
    }

    /// Start password recovery for `email`.
    ///
    /// The response shape is identical whether or not the account exists;
    /// only the work differs: no token is minted and nothing is sent for an
    /// unknown address.
    pub async fn forgot_password(&self, email: &str) -> Result<(), Error> {
        let email = account::normalize_email(email);
        let Some(found) = self.store.find_by_email(&email).await? else {
            return Ok(());
        };

        let token = secret::generate_token().map_err(Error::Internal)?;
        let pending = PendingToken {
            token_hash: secret::hash_token(&token),
            expires_at: Utc::now() + self.config.reset_token_ttl(),
        };
        let updated = self
            .store
            .update_atomically(
                found.id,
                Box::new(move |account| {
                    // One pending token per purpose: the old link dies here.
                    account.reset = Some(pending);
                    Ok(())
                }),
            )
            .await?;

        self.dispatch(&updated, TokenPurpose::PasswordReset, &token);
        Ok(())
    }

    /// Consume a reset token, install the new password, and revoke the
    /// session. Single-use under concurrency, like [`Self::verify_email`].
    pub async fn reset_password(&self, reset_token: &str, new_password: &str) -> Result<(), Error> {
        let token_hash = secret::hash_token(reset_token.trim());
        let Some(found) = self.store.find_by_reset_token_hash(&token_hash).await? else {
            return Err(Error::InvalidOrExpiredToken);
        };

        let new_hash = self.hasher.hash(new_password).map_err(Error::Internal)?;
        let now = Utc::now();
        let updated = self
            .store
            .update_atomically(
                found.id,
                Box::new(move |account| {
                    let live = account
                        .reset
                        .as_ref()
                        .is_some_and(|pending| pending.is_live(&token_hash, now));
                    if !live {
                        // A concurrent reset consumed the token, or it expired.
                        return Err(Error::InvalidOrExpiredToken);
                    }
                    account.password_hash = new_hash;
                    account.reset = None;
                    account.refresh_token_hash = None;
                    Ok(())
                }),
            )
            .await?;
        info!(account_id = %updated.id, "password reset");
        Ok(())
    }

    /// Pure read of the public view.
    pub async fn current_user(&self, account_id: Uuid) -> Result<PublicUser, Error> {
        let Some(found) = self.store.find_by_id(account_id).await? else {
            return Err(Error::NotFound);
        };
        Ok(PublicUser::from(&found))
    }

    /// Resolve an access token to an account id; the gate the transport
    /// layer runs before any authenticated operation.
    pub fn authenticate(&self, access_token: &str) -> Result<Uuid, Error> {
        self.tokens
            .verify(access_token, TokenKind::Access)
            .map_err(|_| Error::NotAuthenticated)
    }

    // The account mutation is already committed when this runs; delivery
    // failure is logged and swallowed, never surfaced to the caller.
    fn dispatch(&self, account: &Account, purpose: TokenPurpose, token: &str) {
        let message = Notification {
            to_email: account.email.clone(),
            username: account.username.clone(),
            purpose,
            token: token.to_string(),
            target_url: self.config.action_url(purpose, token),
        };
        if let Err(err) = self.notifier.send(&message) {
            warn!(
                to_email = %message.to_email,
                purpose = ?purpose,
                "notification dispatch failed: {err}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;
    use secrecy::SecretString;

    fn engine() -> AuthEngine {
        let config = AuthConfig::new(
            "https://sesamo.dev".to_string(),
            SecretString::from("test-signing-secret".to_string()),
        );
        AuthEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(LogNotifier),
            config,
        )
        .with_password_hasher(PasswordHasher::with_params(8192, 1, 1).expect("params"))
    }

    #[test]
    fn authenticate_rejects_garbage() {
        let engine = engine();
        assert!(matches!(
            engine.authenticate("not-a-token"),
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn authenticate_accepts_issued_access_token() {
        let engine = engine();
        let user = engine
            .register(RegisterRequest {
                email: "a@x.com".to_string(),
                username: "alice".to_string(),
                password: "p1".to_string(),
                full_name: None,
            })
            .await
            .expect("register");
        let outcome = engine
            .login(LoginRequest {
                email: "a@x.com".to_string(),
                password: "p1".to_string(),
            })
            .await
            .expect("login");
        assert_eq!(engine.authenticate(&outcome.access_token).ok(), Some(user.id));
        // A refresh token never passes the access gate.
        assert!(matches!(
            engine.authenticate(&outcome.refresh_token),
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn register_normalizes_identity_fields() {
        let engine = engine();
        let user = engine
            .register(RegisterRequest {
                email: " Alice@Example.COM ".to_string(),
                username: " Alice ".to_string(),
                password: "p1".to_string(),
                full_name: Some("  ".to_string()),
            })
            .await
            .expect("register");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.username, "alice");
        assert_eq!(user.full_name, None);
    }
}
