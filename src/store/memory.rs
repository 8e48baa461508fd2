//! In-memory account store.
//!
//! Backs the test suite and embedded deployments. One map lock scopes every
//! operation, so `update_atomically` really is atomic with respect to all
//! other reads and writes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::account::{Account, NewAccount};
use crate::error::Error;

use super::{AccountStore, Mutation};

#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts; test convenience.
    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.lock().await.is_empty()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, Error> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|account| account.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, Error> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn find_by_verification_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, Error> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|account| {
                account
                    .verification
                    .as_ref()
                    .is_some_and(|pending| pending.matches(token_hash))
            })
            .cloned())
    }

    async fn find_by_reset_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, Error> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|account| {
                account
                    .reset
                    .as_ref()
                    .is_some_and(|pending| pending.matches(token_hash))
            })
            .cloned())
    }

    async fn create(&self, account: NewAccount) -> Result<Account, Error> {
        let mut accounts = self.accounts.lock().await;
        let taken = accounts
            .values()
            .any(|existing| existing.email == account.email || existing.username == account.username);
        if taken {
            return Err(Error::Conflict);
        }

        let now = Utc::now();
        let record = Account {
            id: Uuid::new_v4(),
            username: account.username,
            email: account.email,
            full_name: account.full_name,
            password_hash: account.password_hash,
            email_verified: false,
            verification: account.verification,
            reset: None,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_atomically(&self, id: Uuid, mutation: Mutation) -> Result<Account, Error> {
        let mut accounts = self.accounts.lock().await;
        let slot = accounts.get_mut(&id).ok_or(Error::NotFound)?;

        // Mutate a copy so a rejected mutation leaves the record untouched.
        let mut updated = slot.clone();
        mutation(&mut updated)?;
        updated.updated_at = Utc::now();
        *slot = updated.clone();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret;

    fn new_account(username: &str, email: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            email: email.to_string(),
            full_name: None,
            password_hash: "$argon2id$stub".to_string(),
            verification: None,
        }
    }

    #[tokio::test]
    async fn create_then_find_by_each_key() {
        let store = MemoryStore::new();
        let created = store
            .create(new_account("alice", "a@x.com"))
            .await
            .expect("create");
        assert!(!created.email_verified);

        let by_email = store.find_by_email("a@x.com").await.expect("find");
        let by_username = store.find_by_username("alice").await.expect("find");
        let by_id = store.find_by_id(created.id).await.expect("find");
        assert_eq!(by_email.map(|a| a.id), Some(created.id));
        assert_eq!(by_username.map(|a| a.id), Some(created.id));
        assert_eq!(by_id.map(|a| a.id), Some(created.id));
    }

    #[tokio::test]
    async fn duplicate_email_or_username_conflicts() {
        let store = MemoryStore::new();
        store
            .create(new_account("alice", "a@x.com"))
            .await
            .expect("create");

        let email_taken = store.create(new_account("bob", "a@x.com")).await;
        assert!(matches!(email_taken, Err(Error::Conflict)));
        let username_taken = store.create(new_account("alice", "b@x.com")).await;
        assert!(matches!(username_taken, Err(Error::Conflict)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .update_atomically(Uuid::new_v4(), Box::new(|_| Ok(())))
            .await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn rejected_mutation_leaves_record_untouched() {
        let store = MemoryStore::new();
        let created = store
            .create(new_account("alice", "a@x.com"))
            .await
            .expect("create");

        let result = store
            .update_atomically(
                created.id,
                Box::new(|account| {
                    account.email_verified = true;
                    Err(Error::InvalidOrExpiredToken)
                }),
            )
            .await;
        assert!(matches!(result, Err(Error::InvalidOrExpiredToken)));

        let stored = store
            .find_by_id(created.id)
            .await
            .expect("find")
            .expect("present");
        assert!(!stored.email_verified);
        assert_eq!(stored.updated_at, created.updated_at);
    }

    #[tokio::test]
    async fn applied_mutation_commits_and_bumps_updated_at() {
        let store = MemoryStore::new();
        let created = store
            .create(new_account("alice", "a@x.com"))
            .await
            .expect("create");

        let hash = secret::hash_token("refresh");
        let updated = store
            .update_atomically(
                created.id,
                Box::new(move |account| {
                    account.refresh_token_hash = Some(hash);
                    Ok(())
                }),
            )
            .await
            .expect("update");
        assert!(updated.refresh_token_hash.is_some());
        assert!(updated.updated_at >= created.updated_at);

        let stored = store
            .find_by_id(created.id)
            .await
            .expect("find")
            .expect("present");
        assert!(stored.refresh_token_hash.is_some());
    }

    #[tokio::test]
    async fn token_hash_lookup_matches_digest_only() {
        let store = MemoryStore::new();
        let hash = secret::hash_token("tok");
        let mut account = new_account("alice", "a@x.com");
        account.verification = Some(crate::account::PendingToken {
            token_hash: hash.clone(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        });
        store.create(account).await.expect("create");

        let found = store
            .find_by_verification_token_hash(&hash)
            .await
            .expect("find");
        assert!(found.is_some());
        let missing = store
            .find_by_verification_token_hash(&secret::hash_token("other"))
            .await
            .expect("find");
        assert!(missing.is_none());
        let not_a_reset = store.find_by_reset_token_hash(&hash).await.expect("find");
        assert!(not_a_reset.is_none());
    }
}
