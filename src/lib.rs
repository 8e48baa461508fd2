//! # Sesamo (Account & Credential Lifecycle Core)
//!
//! `sesamo` is the credential engine behind a user-account service:
//! registration, email verification, login/logout, access/refresh token
//! rotation, password change, and password recovery. Transport glue (HTTP
//! routing, request validation, cookies, CORS) and mail rendering live
//! outside this crate; callers hand the engine validated input and deliver
//! the tokens it returns.
//!
//! ## Secrets
//!
//! No plaintext secret is ever persisted. Passwords are stored as Argon2id
//! PHC strings; verification, reset, and refresh tokens are stored as
//! SHA-256 digests. One-time tokens exist in plaintext only inside the
//! [`notify::Notification`] that carries them to the user.
//!
//! ## Sessions
//!
//! Access tokens are short-lived signed JWTs checked statelessly. Refresh
//! tokens are long-lived JWTs whose digest the account record keeps:
//! logout, password change, and reset revoke server-side by clearing that
//! digest, and every successful refresh rotates it. Policy: one session per
//! account, and a later login strands the earlier refresh token.
//!
//! ## Enumeration resistance
//!
//! Unknown-account and wrong-password login failures are the same error;
//! missing and expired tokens are the same error; password recovery for an
//! unknown email reports success and simply does nothing.
//!
//! ## Concurrency
//!
//! Operations may run concurrently against one account. Every transition
//! executes its final check inside [`store::AccountStore::update_atomically`],
//! so a raced one-time token is consumed exactly once and the loser gets a
//! typed error.

pub mod account;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod password;
pub mod secret;
pub mod store;
pub mod token;

pub use account::{Account, NewAccount, PendingToken, PublicUser};
pub use config::AuthConfig;
pub use engine::{
    AuthEngine, ChangePasswordRequest, LoginOutcome, LoginRequest, RegisterRequest, TokenPair,
};
pub use error::Error;
pub use notify::{LogNotifier, Notification, Notifier, TokenPurpose};
pub use password::PasswordHasher;
pub use store::{AccountStore, MemoryStore, Mutation, PgAccountStore};
pub use token::{TokenIssuer, TokenKind};
