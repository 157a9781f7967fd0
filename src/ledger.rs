//! Settlement ledger: the only write path for crypto-fund and fiat ledger
//! records. Every multi-row write happens in one short atomic transaction;
//! no external call is ever made while one is open.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::db::models::{CryptoFundTransaction, LedgerTransaction};
use crate::db::queries;
use crate::domain::{AdditionalDetail, LedgerStatus};
use crate::error::AppError;
use crate::queue::{memory::MemoryJobQueue, pg as pg_queue, Job, JobQueue, RetryPolicy};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn crypto_fund_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<CryptoFundTransaction>, AppError>;

    async fn ledger_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>, AppError>;

    /// Records a deposit that cannot cover its own fees: FAILED crypto leg
    /// plus a `failed` ledger entry, atomically.
    async fn commit_insufficient(
        &self,
        crypto: &CryptoFundTransaction,
        entry: &LedgerTransaction,
    ) -> Result<(), AppError>;

    /// Commits a settlement: SETTLED crypto leg, `pending` ledger entry and
    /// the transfer job, all-or-nothing. The job insert shares the commit so
    /// an enqueue failure rolls everything back.
    async fn commit_settlement(
        &self,
        crypto: &CryptoFundTransaction,
        entry: &LedgerTransaction,
        job: Job,
        policy: RetryPolicy,
    ) -> Result<Uuid, AppError>;

    /// Fiat leg landed; `pending -> completed` with the provider receipt.
    async fn complete_transfer(&self, reference: &str, provider_txn_id: &str)
        -> Result<(), AppError>;

    /// Fiat leg rejected by the provider; `pending -> failed` with the
    /// provider message attached. The crypto leg stays SETTLED.
    async fn fail_transfer(&self, reference: &str, provider_message: &str)
        -> Result<(), AppError>;
}

// --- Postgres implementation ---

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn finalize(
        &self,
        reference: &str,
        status: LedgerStatus,
        detail: AdditionalDetail,
    ) -> Result<(), AppError> {
        let touched =
            queries::finalize_ledger_status(&self.pool, reference, status.as_str(), Some(&detail))
                .await?;

        if touched == 0 {
            match queries::get_ledger_by_reference(&self.pool, reference).await? {
                // Redelivered job racing an already-final entry; nothing to do.
                Some(entry) => {
                    tracing::debug!(
                        reference,
                        status = %entry.status,
                        "ledger entry already terminal, skipping update"
                    );
                }
                None => {
                    return Err(AppError::NotFound(format!(
                        "no ledger entry for reference {}",
                        reference
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn crypto_fund_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<CryptoFundTransaction>, AppError> {
        Ok(queries::get_crypto_fund_by_reference(&self.pool, reference).await?)
    }

    async fn ledger_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>, AppError> {
        Ok(queries::get_ledger_by_reference(&self.pool, reference).await?)
    }

    async fn commit_insufficient(
        &self,
        crypto: &CryptoFundTransaction,
        entry: &LedgerTransaction,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        queries::insert_crypto_fund(&mut tx, crypto).await?;
        queries::insert_ledger(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_settlement(
        &self,
        crypto: &CryptoFundTransaction,
        entry: &LedgerTransaction,
        job: Job,
        policy: RetryPolicy,
    ) -> Result<Uuid, AppError> {
        let mut tx = self.pool.begin().await?;
        queries::insert_crypto_fund(&mut tx, crypto).await?;
        queries::insert_ledger(&mut tx, entry).await?;
        let job_id = pg_queue::insert_job(&mut tx, &job, &policy).await?;
        tx.commit().await?;
        Ok(job_id)
    }

    async fn complete_transfer(
        &self,
        reference: &str,
        provider_txn_id: &str,
    ) -> Result<(), AppError> {
        self.finalize(
            reference,
            LedgerStatus::Completed,
            AdditionalDetail::provider_message(format!("transfer receipt {}", provider_txn_id)),
        )
        .await
    }

    async fn fail_transfer(
        &self,
        reference: &str,
        provider_message: &str,
    ) -> Result<(), AppError> {
        self.finalize(
            reference,
            LedgerStatus::Failed,
            AdditionalDetail::provider_message(provider_message),
        )
        .await
    }
}

// --- In-memory implementation (tests, local development) ---

#[derive(Default)]
pub struct MemoryLedger {
    crypto: Mutex<Vec<CryptoFundTransaction>>,
    entries: Mutex<Vec<LedgerTransaction>>,
    queue: Option<Arc<MemoryJobQueue>>,
}

impl MemoryLedger {
    /// `queue` receives the transfer job at commit time, mirroring the
    /// transactional outbox of the Postgres store.
    pub fn new(queue: Arc<MemoryJobQueue>) -> Self {
        Self {
            crypto: Mutex::new(Vec::new()),
            entries: Mutex::new(Vec::new()),
            queue: Some(queue),
        }
    }

    pub fn crypto_count(&self) -> usize {
        self.crypto.lock().unwrap().len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn set_status(
        &self,
        reference: &str,
        status: LedgerStatus,
        detail: AdditionalDetail,
    ) -> Result<(), AppError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.reference == reference)
            .ok_or_else(|| {
                AppError::NotFound(format!("no ledger entry for reference {}", reference))
            })?;

        let current: LedgerStatus = entry.status.parse().unwrap_or(LedgerStatus::Failed);
        if !current.is_terminal() && current.can_transition_to(status) {
            entry.status = status.as_str().to_string();
            entry.additional_details.0.push(detail);
            entry.updated_at = chrono::Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn crypto_fund_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<CryptoFundTransaction>, AppError> {
        Ok(self
            .crypto
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.reference == reference)
            .cloned())
    }

    async fn ledger_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>, AppError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.reference == reference)
            .cloned())
    }

    async fn commit_insufficient(
        &self,
        crypto: &CryptoFundTransaction,
        entry: &LedgerTransaction,
    ) -> Result<(), AppError> {
        let mut crypto_rows = self.crypto.lock().unwrap();
        let mut entries = self.entries.lock().unwrap();
        crypto_rows.push(crypto.clone());
        entries.push(entry.clone());
        Ok(())
    }

    async fn commit_settlement(
        &self,
        crypto: &CryptoFundTransaction,
        entry: &LedgerTransaction,
        job: Job,
        policy: RetryPolicy,
    ) -> Result<Uuid, AppError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| AppError::Queue("memory ledger has no queue attached".to_string()))?;

        let job_id = queue.enqueue(job, policy).await?;
        let mut crypto_rows = self.crypto.lock().unwrap();
        let mut entries = self.entries.lock().unwrap();
        crypto_rows.push(crypto.clone());
        entries.push(entry.clone());
        Ok(job_id)
    }

    async fn complete_transfer(
        &self,
        reference: &str,
        provider_txn_id: &str,
    ) -> Result<(), AppError> {
        self.set_status(
            reference,
            LedgerStatus::Completed,
            AdditionalDetail::provider_message(format!("transfer receipt {}", provider_txn_id)),
        )
    }

    async fn fail_transfer(
        &self,
        reference: &str,
        provider_message: &str,
    ) -> Result<(), AppError> {
        self.set_status(
            reference,
            LedgerStatus::Failed,
            AdditionalDetail::provider_message(provider_message),
        )
    }
}
