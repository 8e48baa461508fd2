//! Explicit configuration for the credential core.
//!
//! Everything that used to be ambient in deployments of this kind (signing
//! secret, link base URL, expiry windows) is carried in one value built at
//! startup and handed to the engine, so tests can run with fake secrets and
//! short windows.

use chrono::Duration;
use secrecy::SecretString;
use url::Url;

use crate::notify::TokenPurpose;

const DEFAULT_ISSUER: &str = "sesamo";
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 30 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    token_secret: SecretString,
    issuer: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    verification_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
}

impl AuthConfig {
    /// Configuration with default expiry windows. `base_url` is where
    /// verification and reset links point; `token_secret` signs session
    /// tokens and must be shared by every instance verifying them.
    #[must_use]
    pub fn new(base_url: String, token_secret: SecretString) -> Self {
        Self {
            base_url,
            token_secret,
            issuer: DEFAULT_ISSUER.to_string(),
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            verification_token_ttl_seconds: DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    /// Whether `base_url` parses as an absolute URL; callers can assert this
    /// at startup instead of discovering broken links in outbound mail.
    #[must_use]
    pub fn base_url_is_absolute(&self) -> bool {
        Url::parse(&self.base_url).is_ok()
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub(crate) fn token_secret(&self) -> &SecretString {
        &self.token_secret
    }

    pub(crate) fn access_token_ttl(&self) -> Duration {
        Duration::seconds(self.access_token_ttl_seconds)
    }

    pub(crate) fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_ttl_seconds)
    }

    pub(crate) fn verification_token_ttl(&self) -> Duration {
        Duration::seconds(self.verification_token_ttl_seconds)
    }

    pub(crate) fn reset_token_ttl(&self) -> Duration {
        Duration::seconds(self.reset_token_ttl_seconds)
    }

    /// Build the link a notification carries for the given purpose.
    #[must_use]
    pub fn action_url(&self, purpose: TokenPurpose, token: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        match purpose {
            TokenPurpose::Verification => format!("{base}/verify-email/{token}"),
            TokenPurpose::PasswordReset => format!("{base}/reset-password/{token}"),
        }
    }
}
