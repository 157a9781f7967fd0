//! Worker pool loop: claims jobs from the durable queue and dispatches on
//! the envelope's request tag. Multiple dispatchers run concurrently; the
//! queue's SKIP LOCKED claim keeps them off each other's jobs.

use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::error::AppError;
use crate::queue::{JobQueue, JobRequest};
use crate::services::orchestrator::SettlementOrchestrator;
use crate::services::transfer_worker::TransferWorker;

const POLL_INTERVAL_SECS: u64 = 5;

pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    orchestrator: Arc<SettlementOrchestrator>,
    transfer_worker: Arc<TransferWorker>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        orchestrator: Arc<SettlementOrchestrator>,
        transfer_worker: Arc<TransferWorker>,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            transfer_worker,
        }
    }

    pub async fn run(&self) {
        tracing::info!("settlement worker started");

        loop {
            match self.tick().await {
                Ok(true) => {} // drained a job; poll again immediately
                Ok(false) => sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await,
                Err(e) => {
                    tracing::error!(error = %e, "worker tick failed");
                    sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
                }
            }
        }
    }

    /// Claims and handles at most one job. Returns whether one was claimed.
    pub async fn tick(&self) -> Result<bool, AppError> {
        let Some(delivery) = self.queue.claim().await? else {
            return Ok(false);
        };

        let job_id = delivery.job.id;
        let result = match &delivery.job.request {
            JobRequest::DepositConfirmed(event) => {
                self.orchestrator.settle(event).await.map(|_| ())
            }
            JobRequest::BankTransfer(instruction) => {
                self.transfer_worker.process_transfer(instruction).await
            }
        };

        match result {
            Ok(()) => self.queue.ack(job_id).await?,
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    %job_id,
                    attempt = delivery.attempt,
                    max_attempts = delivery.max_attempts,
                    error = %e,
                    "job failed, scheduling redelivery"
                );
                self.queue.nack(job_id, &e.to_string()).await?;
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "job failed fatally, retaining for inspection");
                self.queue.fail(job_id, &e.to_string()).await?;
            }
        }

        Ok(true)
    }
}
