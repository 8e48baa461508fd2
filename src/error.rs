//! Crate-wide error taxonomy.
//!
//! Every lifecycle operation fails with one of these variants so callers can
//! map outcomes to response codes deterministically. Two pairs of cases are
//! deliberately collapsed to keep the external signal uniform:
//!
//! - unknown account and wrong password both surface as [`Error::InvalidCredentials`];
//! - a token that is missing, mismatched, or past its expiry surfaces as
//!   [`Error::InvalidOrExpiredToken`].
//!
//! Collapsing them prevents account enumeration: a caller probing the service
//! cannot tell which half of the pair occurred.

/// Typed failure for account and credential operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The email or username is already registered.
    #[error("email or username already registered")]
    Conflict,

    /// Unknown account or wrong password; intentionally indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Verification, reset, or refresh token missing, mismatched, or expired;
    /// intentionally indistinguishable.
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    /// Resend requested for an account whose email is already verified.
    #[error("email is already verified")]
    AlreadyVerified,

    /// No account with the given id.
    #[error("account not found")]
    NotFound,

    /// Access token missing, tampered with, or expired.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The account store could not serve the request. Not retried here;
    /// retry policy belongs to the transport layer.
    #[error("account store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),

    /// Hashing or token signing failed. Indicates a misconfigured
    /// deployment rather than a lifecycle outcome.
    #[error("internal credential processing error")]
    Internal(#[source] anyhow::Error),
}

impl Error {
    /// Whether the variant is one of the deliberately collapsed signals.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        matches!(
            self,
            Error::InvalidCredentials | Error::InvalidOrExpiredToken
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn collapsed_variants_share_one_message() {
        // The Display string is the external signal; it must not leak which
        // internal case produced it.
        assert_eq!(
            Error::InvalidCredentials.to_string(),
            "invalid credentials"
        );
        assert_eq!(
            Error::InvalidOrExpiredToken.to_string(),
            "invalid or expired token"
        );
    }

    #[test]
    fn opaque_classification() {
        assert!(Error::InvalidCredentials.is_opaque());
        assert!(Error::InvalidOrExpiredToken.is_opaque());
        assert!(!Error::Conflict.is_opaque());
        assert!(!Error::AlreadyVerified.is_opaque());
    }

    #[test]
    fn store_failure_keeps_source() {
        let err = Error::StoreUnavailable(anyhow::anyhow!("connection refused"));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection refused"));
    }
}
