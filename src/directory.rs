//! Narrow read-only contract with the account-management system: resolving
//! a depositor's linked payout account.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::db::models::LinkedBankAccount;
use crate::db::queries;
use crate::error::AppError;

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// The user's linked bank account, or `NotFound` if none exists yet.
    /// The underlying record may appear later, so callers treat this as
    /// retryable.
    async fn linked_bank_account(&self, user_id: &str) -> Result<LinkedBankAccount, AppError>;
}

#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn linked_bank_account(&self, user_id: &str) -> Result<LinkedBankAccount, AppError> {
        queries::get_linked_bank_account(&self.pool, user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no linked bank account for user {}", user_id))
            })
    }
}

/// Fixed map of users to accounts, for tests.
#[derive(Default)]
pub struct MemoryDirectory {
    accounts: Mutex<HashMap<String, LinkedBankAccount>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self, account: LinkedBankAccount) {
        self.accounts
            .lock()
            .unwrap()
            .insert(account.user_id.clone(), account);
    }
}

#[async_trait]
impl AccountDirectory for MemoryDirectory {
    async fn linked_bank_account(&self, user_id: &str) -> Result<LinkedBankAccount, AppError> {
        self.accounts
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("no linked bank account for user {}", user_id))
            })
    }
}
