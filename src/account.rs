//! Account record, pending-token state, and the public view.
//!
//! One [`Account`] exists per registered user. Secrets never appear here in
//! plaintext: the password is an Argon2 PHC string and every token slot holds
//! a SHA-256 digest. A pending token's digest and expiry always travel
//! together inside [`PendingToken`], so the record cannot hold one without
//! the other.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::secret;

/// Minimum accepted username length.
pub const MIN_USERNAME_LEN: usize = 3;

/// A single-use secret awaiting consumption: digest plus expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToken {
    pub token_hash: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

impl PendingToken {
    /// Constant-time match of a presented token's digest.
    #[must_use]
    pub fn matches(&self, candidate_hash: &[u8]) -> bool {
        secret::hashes_match(&self.token_hash, candidate_hash)
    }

    /// A token is expired from its expiry instant onwards.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Matched and still inside its window.
    #[must_use]
    pub fn is_live(&self, candidate_hash: &[u8], now: DateTime<Utc>) -> bool {
        self.matches(candidate_hash) && !self.is_expired(now)
    }
}

/// Durable account record. Only ever exchanged with an
/// [`AccountStore`](crate::store::AccountStore); callers outside the crate
/// see [`PublicUser`].
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub email_verified: bool,
    /// Pending email-verification token, if one is outstanding.
    pub verification: Option<PendingToken>,
    /// Pending password-reset token, if one is outstanding.
    pub reset: Option<PendingToken>,
    /// Digest of the single active refresh token; `None` means no session.
    pub refresh_token_hash: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the caller supplies when creating an account; the store assigns
/// id and timestamps.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub verification: Option<PendingToken>,
}

/// The only outbound account representation. No hash ever crosses this
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for PublicUser {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            email_verified: account.email_verified,
            created_at: account.created_at,
        }
    }
}

/// Normalize an email for lookup and uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalize a username the same way uniqueness sees it.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Basic email format check on already-normalized input. Transport glue
/// owns full request validation; this is the shape the core relies on.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Username shape the core relies on: lowercase, no whitespace, at least
/// [`MIN_USERNAME_LEN`] characters.
#[must_use]
pub fn valid_username(username: &str) -> bool {
    username.chars().count() >= MIN_USERNAME_LEN
        && !username.chars().any(char::is_whitespace)
        && !username.chars().any(char::is_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(expires_in_seconds: i64) -> (PendingToken, Vec<u8>) {
        let hash = secret::hash_token("token");
        let token = PendingToken {
            token_hash: hash.clone(),
            expires_at: Utc::now() + Duration::seconds(expires_in_seconds),
        };
        (token, hash)
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_username_requires_lowercase_and_length() {
        assert!(valid_username("alice"));
        assert!(valid_username("a_b"));
        assert!(!valid_username("al"));
        assert!(!valid_username("Alice"));
        assert!(!valid_username("has space"));
    }

    #[test]
    fn pending_token_matches_exact_hash_only() {
        let (token, hash) = pending(60);
        assert!(token.matches(&hash));
        assert!(!token.matches(&secret::hash_token("other")));
    }

    #[test]
    fn pending_token_expiry_boundary_is_inclusive() {
        let (token, hash) = pending(60);
        assert!(token.is_live(&hash, Utc::now()));
        // At the expiry instant and beyond the token is dead.
        assert!(token.is_expired(token.expires_at));
        assert!(token.is_expired(token.expires_at + Duration::seconds(1)));
        assert!(!token.is_live(&hash, token.expires_at));
    }

    #[test]
    fn public_view_carries_no_secret_material() {
        let account = Account {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            full_name: Some("Alice".to_string()),
            password_hash: "$argon2id$stub".to_string(),
            email_verified: false,
            verification: None,
            reset: None,
            refresh_token_hash: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let view = PublicUser::from(&account);
        let json = serde_json::to_value(&view).expect("serialize");
        let mut keys: Vec<&str> = json
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "created_at",
                "email",
                "email_verified",
                "full_name",
                "id",
                "username"
            ]
        );
    }
}
