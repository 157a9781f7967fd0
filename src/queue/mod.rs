//! Durable at-least-once work queue contract, with a table-backed
//! implementation and an in-memory one for tests.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{DepositEvent, TransferInstruction};
use crate::error::AppError;

pub use memory::MemoryJobQueue;
pub use pg::PgJobQueue;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        AppError::Queue(e.to_string())
    }
}

/// Payload variants, discriminated by the `request` tag on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum JobRequest {
    DepositConfirmed(DepositEvent),
    BankTransfer(TransferInstruction),
}

impl JobRequest {
    pub fn topic(&self) -> &'static str {
        match self {
            JobRequest::DepositConfirmed(_) => "deposit.confirmed",
            JobRequest::BankTransfer(_) => "bank.transfer",
        }
    }
}

/// The envelope handed to the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub request: JobRequest,
    /// Optional correlation handle (deposit reference, user email).
    pub correlation: Option<String>,
}

impl Job {
    pub fn new(request: JobRequest, correlation: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            correlation,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Backoff {
    Exponential { base_secs: u64 },
}

/// Retry behaviour of one job. Jobs exhausting `max_attempts` are retained
/// for manual inspection, never discarded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_secs: u64) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base_secs },
        }
    }

    /// Delay before redelivering after the given (1-based) failed attempt.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Exponential { base_secs } => {
                let exp = attempt.saturating_sub(1).min(16);
                Duration::from_secs(base_secs.saturating_mul(1 << exp))
            }
        }
    }
}

/// One delivery of a job to a worker.
#[derive(Debug, Clone)]
pub struct DeliveredJob {
    pub job: Job,
    pub attempt: u32,
    pub max_attempts: u32,
}

/// At-least-once durable queue. Each job goes to one concurrent worker per
/// attempt; a worker that neither acks nor nacks within the liveness window
/// is considered stalled and the job is redelivered.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Durably enqueues a job; returns its id.
    async fn enqueue(&self, job: Job, policy: RetryPolicy) -> Result<Uuid, QueueError>;

    /// Claims the next due job, if any.
    async fn claim(&self) -> Result<Option<DeliveredJob>, QueueError>;

    /// Marks a delivery as successfully handled.
    async fn ack(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Marks a delivery as failed. Schedules a backoff redelivery, or
    /// retains the job as exhausted once attempts run out.
    async fn nack(&self, job_id: Uuid, error: &str) -> Result<(), QueueError>;

    /// Retains a job as exhausted immediately, bypassing remaining
    /// attempts. Used for errors a retry cannot fix.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<(), QueueError>;
}
