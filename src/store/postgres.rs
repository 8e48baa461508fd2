//! Postgres-backed account store.
//!
//! Expects the following table:
//!
//! ```sql
//! CREATE TABLE accounts (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     username TEXT NOT NULL UNIQUE,
//!     email TEXT NOT NULL UNIQUE,
//!     full_name TEXT,
//!     password_hash TEXT NOT NULL,
//!     email_verified BOOLEAN NOT NULL DEFAULT FALSE,
//!     verification_token_hash BYTEA,
//!     verification_expires_at TIMESTAMPTZ,
//!     reset_token_hash BYTEA,
//!     reset_expires_at TIMESTAMPTZ,
//!     refresh_token_hash BYTEA,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     CHECK ((verification_token_hash IS NULL) = (verification_expires_at IS NULL)),
//!     CHECK ((reset_token_hash IS NULL) = (reset_expires_at IS NULL))
//! );
//! ```
//!
//! `update_atomically` takes a row lock (`SELECT ... FOR UPDATE`) for the
//! duration of the mutation, so concurrent read-modify-write cycles against
//! one account serialize instead of losing updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::account::{Account, NewAccount, PendingToken};
use crate::error::Error;

use super::{AccountStore, Mutation};

const ACCOUNT_COLUMNS: &str = "\
    id, username, email, full_name, password_hash, email_verified, \
    verification_token_hash, verification_expires_at, \
    reset_token_hash, reset_expires_at, \
    refresh_token_hash, created_at, updated_at";

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_column(&self, column: &str, value: &str) -> Result<Option<Account>, Error> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = $1 LIMIT 1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| store_failure("failed to look up account", err))?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_token_hash(
        &self,
        column: &str,
        token_hash: &[u8],
    ) -> Result<Option<Account>, Error> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = $1 LIMIT 1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| store_failure("failed to look up account by token", err))?;
        row.as_ref().map(account_from_row).transpose()
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        self.find_by_column("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, Error> {
        self.find_by_column("username", username).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, Error> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| store_failure("failed to look up account by id", err))?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_verification_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, Error> {
        self.find_by_token_hash("verification_token_hash", token_hash)
            .await
    }

    async fn find_by_reset_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, Error> {
        self.find_by_token_hash("reset_token_hash", token_hash).await
    }

    async fn create(&self, account: NewAccount) -> Result<Account, Error> {
        let query = format!(
            "\
            INSERT INTO accounts \
                (username, email, full_name, password_hash, \
                 verification_token_hash, verification_expires_at) \
            VALUES ($1, $2, $3, $4, $5, $6) \
            RETURNING {ACCOUNT_COLUMNS}"
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = %query
        );
        let (token_hash, expires_at) = match &account.verification {
            Some(pending) => (Some(pending.token_hash.clone()), Some(pending.expires_at)),
            None => (None, None),
        };
        let row = sqlx::query(&query)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.full_name)
            .bind(&account.password_hash)
            .bind(token_hash)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    Error::Conflict
                } else {
                    store_failure("failed to create account", err)
                }
            })?;
        account_from_row(&row)
    }

    async fn update_atomically(&self, id: Uuid, mutation: Mutation) -> Result<Account, Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| store_failure("failed to begin account update", err))?;

        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .map_err(|err| store_failure("failed to lock account row", err))?;
        let Some(row) = row else {
            let _ = tx.rollback().await;
            return Err(Error::NotFound);
        };

        let mut account = account_from_row(&row)?;
        if let Err(err) = mutation(&mut account) {
            let _ = tx.rollback().await;
            return Err(err);
        }
        account.updated_at = Utc::now();

        let query = "\
            UPDATE accounts \
            SET password_hash = $2, \
                email_verified = $3, \
                verification_token_hash = $4, \
                verification_expires_at = $5, \
                reset_token_hash = $6, \
                reset_expires_at = $7, \
                refresh_token_hash = $8, \
                updated_at = $9 \
            WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let (verification_hash, verification_expires) = pending_columns(&account.verification);
        let (reset_hash, reset_expires) = pending_columns(&account.reset);
        sqlx::query(query)
            .bind(account.id)
            .bind(&account.password_hash)
            .bind(account.email_verified)
            .bind(verification_hash)
            .bind(verification_expires)
            .bind(reset_hash)
            .bind(reset_expires)
            .bind(&account.refresh_token_hash)
            .bind(account.updated_at)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .map_err(|err| store_failure("failed to write account update", err))?;

        tx.commit()
            .await
            .map_err(|err| store_failure("failed to commit account update", err))?;
        Ok(account)
    }
}

fn store_failure(context: &'static str, err: sqlx::Error) -> Error {
    Error::StoreUnavailable(anyhow::Error::new(err).context(context))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn pending_columns(pending: &Option<PendingToken>) -> (Option<Vec<u8>>, Option<DateTime<Utc>>) {
    match pending {
        Some(pending) => (Some(pending.token_hash.clone()), Some(pending.expires_at)),
        None => (None, None),
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, Error> {
    let verification = pending_from_columns(
        row.get("verification_token_hash"),
        row.get("verification_expires_at"),
    );
    let reset = pending_from_columns(row.get("reset_token_hash"), row.get("reset_expires_at"));
    Ok(Account {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        password_hash: row.get("password_hash"),
        email_verified: row.get("email_verified"),
        verification,
        reset,
        refresh_token_hash: row.get("refresh_token_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn pending_from_columns(
    token_hash: Option<Vec<u8>>,
    expires_at: Option<DateTime<Utc>>,
) -> Option<PendingToken> {
    match (token_hash, expires_at) {
        (Some(token_hash), Some(expires_at)) => Some(PendingToken {
            token_hash,
            expires_at,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn pending_columns_require_both_halves() {
        assert!(pending_from_columns(None, None).is_none());
        assert!(pending_from_columns(Some(vec![1]), None).is_none());
        assert!(pending_from_columns(None, Some(Utc::now())).is_none());
        let pending = pending_from_columns(Some(vec![1]), Some(Utc::now()));
        assert!(pending.is_some());
    }

    #[test]
    fn store_failure_is_tagged_unavailable() {
        let err = store_failure("failed to look up account", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }
}
