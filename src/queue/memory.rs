//! In-memory queue satisfying the durable-queue contract minus durability.
//! Used by the saga tests and for local development without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use super::{DeliveredJob, Job, JobQueue, QueueError, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryJobStatus {
    Queued,
    Running,
    Completed,
    Exhausted,
}

const DEFAULT_LIVENESS_SECS: i64 = 300;

#[derive(Debug, Clone)]
struct MemoryJob {
    job: Job,
    policy: RetryPolicy,
    status: MemoryJobStatus,
    attempts: u32,
    run_at: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

pub struct MemoryJobQueue {
    jobs: Mutex<Vec<MemoryJob>>,
    liveness: ChronoDuration,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::with_liveness(DEFAULT_LIVENESS_SECS)
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_liveness(liveness_secs: i64) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            liveness: ChronoDuration::seconds(liveness_secs),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of jobs on a topic, regardless of status.
    pub fn count_topic(&self, topic: &str) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.job.request.topic() == topic)
            .count()
    }

    pub fn exhausted_ids(&self) -> Vec<Uuid> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == MemoryJobStatus::Exhausted)
            .map(|j| j.job.id)
            .collect()
    }

    pub fn last_error(&self, job_id: Uuid) -> Option<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.job.id == job_id)
            .and_then(|j| j.last_error.clone())
    }

    /// Next scheduled delivery time, for asserting backoff behaviour.
    pub fn run_at(&self, job_id: Uuid) -> Option<DateTime<Utc>> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.job.id == job_id)
            .map(|j| j.run_at)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job, policy: RetryPolicy) -> Result<Uuid, QueueError> {
        let id = job.id;
        self.jobs.lock().unwrap().push(MemoryJob {
            job,
            policy,
            status: MemoryJobStatus::Queued,
            attempts: 0,
            run_at: Utc::now(),
            locked_until: None,
            last_error: None,
        });
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<DeliveredJob>, QueueError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        let due = jobs
            .iter_mut()
            .filter(|j| match j.status {
                MemoryJobStatus::Queued => j.run_at <= now,
                // A worker that went away without acking: the lapsed lock
                // makes the job claimable again.
                MemoryJobStatus::Running => j.locked_until.map_or(false, |t| t < now),
                _ => false,
            })
            .min_by_key(|j| j.run_at);

        Ok(due.map(|j| {
            j.status = MemoryJobStatus::Running;
            j.attempts += 1;
            j.locked_until = Some(now + self.liveness);
            DeliveredJob {
                job: j.job.clone(),
                attempt: j.attempts,
                max_attempts: j.policy.max_attempts,
            }
        }))
    }

    async fn ack(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.job.id == job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        job.status = MemoryJobStatus::Completed;
        job.locked_until = None;
        Ok(())
    }

    async fn nack(&self, job_id: Uuid, error: &str) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.job.id == job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;

        job.last_error = Some(error.to_string());
        job.locked_until = None;
        if job.attempts >= job.policy.max_attempts {
            job.status = MemoryJobStatus::Exhausted;
        } else {
            let delay = job.policy.delay_after_attempt(job.attempts);
            job.run_at = Utc::now()
                + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(0));
            job.status = MemoryJobStatus::Queued;
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.job.id == job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        job.last_error = Some(error.to_string());
        job.status = MemoryJobStatus::Exhausted;
        job.locked_until = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deposit::{DepositUser, DepositWallet};
    use crate::domain::DepositEvent;
    use crate::queue::JobRequest;
    use bigdecimal::BigDecimal;

    fn job() -> Job {
        Job::new(
            JobRequest::DepositConfirmed(DepositEvent {
                id: "dep-1".to_string(),
                reference: "REF-1".to_string(),
                currency: "BTC".to_string(),
                amount: BigDecimal::from(1),
                status: "done".to_string(),
                wallet: DepositWallet {
                    deposit_address: "bc1q".to_string(),
                    source_address: None,
                },
                user: DepositUser {
                    id: "user-1".to_string(),
                },
            }),
            Some("REF-1".to_string()),
        )
    }

    #[tokio::test]
    async fn test_expired_claim_is_redelivered() {
        let queue = MemoryJobQueue::with_liveness(0);
        let id = queue
            .enqueue(job(), RetryPolicy::exponential(3, 30))
            .await
            .unwrap();

        let first = queue.claim().await.unwrap().unwrap();
        assert_eq!(first.attempt, 1);

        // Never acked; with a zero liveness window the lock has already
        // lapsed, so the job comes back as a fresh delivery.
        let second = queue.claim().await.unwrap().unwrap();
        assert_eq!(second.job.id, id);
        assert_eq!(second.attempt, 2);
    }

    #[tokio::test]
    async fn test_running_job_is_not_redelivered_within_liveness_window() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(job(), RetryPolicy::exponential(3, 30))
            .await
            .unwrap();

        queue.claim().await.unwrap().unwrap();
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nack_pushes_run_at_into_the_future() {
        let queue = MemoryJobQueue::new();
        let id = queue
            .enqueue(job(), RetryPolicy::exponential(3, 30))
            .await
            .unwrap();

        let before = Utc::now();
        queue.claim().await.unwrap().unwrap();
        queue.nack(id, "transient").await.unwrap();

        let run_at = queue.run_at(id).unwrap();
        assert!(run_at >= before + ChronoDuration::seconds(30));
        // Not due yet, so the next claim comes up empty.
        assert!(queue.claim().await.unwrap().is_none());
    }
}
