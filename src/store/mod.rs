//! Durable account storage.
//!
//! The engine consumes the [`AccountStore`] trait and nothing else; which
//! engine backs it is the deployment's choice. [`MemoryStore`] serves tests
//! and embedded use, [`PgAccountStore`] is the Postgres implementation.
//!
//! [`AccountStore::update_atomically`] is the unit of race-safety for the
//! whole crate: the mutation closure runs while the store holds exclusivity
//! over the account, and a closure returning `Err` aborts the write. Engine
//! mutations re-validate the state they depend on inside the closure, which
//! turns concurrent lost updates into typed failures.

use async_trait::async_trait;
use uuid::Uuid;

use crate::account::{Account, NewAccount};
use crate::error::Error;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgAccountStore;

/// A read-modify-write step applied under the store's exclusivity.
pub type Mutation = Box<dyn FnOnce(&mut Account) -> Result<(), Error> + Send>;

/// Contract every backing store fulfils.
///
/// Lookups match normalized values exactly; token lookups match the stored
/// digest, never plaintext. `create` fails [`Error::Conflict`] when the
/// email or username is taken; `update_atomically` fails
/// [`Error::NotFound`] for an unknown id and otherwise returns the account
/// as committed.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, Error>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, Error>;

    /// Locate the account holding this verification-token digest.
    async fn find_by_verification_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, Error>;

    /// Locate the account holding this reset-token digest.
    async fn find_by_reset_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, Error>;

    async fn create(&self, account: NewAccount) -> Result<Account, Error>;

    async fn update_atomically(&self, id: Uuid, mutation: Mutation) -> Result<Account, Error>;
}
