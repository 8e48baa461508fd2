//! Out-of-band delivery of one-time tokens.
//!
//! The engine depends on the [`Notifier`] trait, never on a concrete mail
//! client, so deployments plug in SMTP, an HTTP mail API, or a broker, and
//! tests substitute a recording fake. Delivery is best-effort: the engine
//! commits the account transition first and only logs a failed send.

use serde::Serialize;
use tracing::info;

/// What the delivered token lets its holder do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Verification,
    PasswordReset,
}

/// One outbound message. `token` is the only place the plaintext secret
/// exists outside the user's hands; it is embedded in `target_url` for the
/// link the mail presents.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub to_email: String,
    pub username: String,
    pub purpose: TokenPurpose,
    pub token: String,
    pub target_url: String,
}

/// Delivery abstraction the engine depends on.
pub trait Notifier: Send + Sync {
    /// Deliver a message or return an error for the engine to log.
    fn send(&self, message: &Notification) -> anyhow::Result<()>;
}

/// Local-dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, message: &Notification) -> anyhow::Result<()> {
        let payload = serde_json::to_string(message)?;
        info!(
            to_email = %message.to_email,
            purpose = ?message.purpose,
            payload = %payload,
            "notification delivery stub"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_notifier_always_delivers() {
        let message = Notification {
            to_email: "a@x.com".to_string(),
            username: "alice".to_string(),
            purpose: TokenPurpose::Verification,
            token: "tok".to_string(),
            target_url: "https://sesamo.dev/verify-email/tok".to_string(),
        };
        assert!(LogNotifier.send(&message).is_ok());
    }

    #[test]
    fn purpose_serializes_snake_case() {
        let value = serde_json::to_value(TokenPurpose::PasswordReset).expect("serialize");
        assert_eq!(value, "password_reset");
    }
}
