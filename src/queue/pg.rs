//! Table-backed durable queue. Claims use `FOR UPDATE SKIP LOCKED` so
//! multiple workers never block on each other's rows; a `locked_until`
//! liveness window redelivers jobs whose worker went away.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use super::{DeliveredJob, Job, JobQueue, JobRequest, QueueError, RetryPolicy};

const DEFAULT_LIVENESS_SECS: i64 = 300;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct JobRow {
    pub id: Uuid,
    pub topic: String,
    pub request: Json<JobRequest>,
    pub correlation: Option<String>,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_base_secs: i64,
    pub run_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    liveness_secs: i64,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            liveness_secs: DEFAULT_LIVENESS_SECS,
        }
    }

    pub fn with_liveness(pool: PgPool, liveness_secs: i64) -> Self {
        Self {
            pool,
            liveness_secs,
        }
    }
}

/// Inserts a job row on an open transaction. The settlement commit uses
/// this to make the ledger write and the enqueue one atomic unit.
pub async fn insert_job(
    executor: &mut SqlxTransaction<'_, Postgres>,
    job: &Job,
    policy: &RetryPolicy,
) -> Result<Uuid, QueueError> {
    let base_secs = match policy.backoff {
        super::Backoff::Exponential { base_secs } => base_secs as i64,
    };

    sqlx::query(
        r#"
        INSERT INTO jobs (
            id, topic, request, correlation, status, attempts, max_attempts,
            backoff_base_secs, run_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, 'queued', 0, $5, $6, NOW(), NOW(), NOW())
        "#,
    )
    .bind(job.id)
    .bind(job.request.topic())
    .bind(Json(&job.request))
    .bind(&job.correlation)
    .bind(policy.max_attempts as i32)
    .bind(base_secs)
    .execute(&mut **executor)
    .await?;

    Ok(job.id)
}

pub async fn list_exhausted(pool: &PgPool, limit: i64) -> Result<Vec<JobRow>, QueueError> {
    let rows = sqlx::query_as::<_, JobRow>(
        "SELECT * FROM jobs WHERE status = 'exhausted' ORDER BY updated_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Puts an exhausted job back on the queue with a fresh attempt budget.
pub async fn requeue_exhausted(pool: &PgPool, job_id: Uuid) -> Result<(), QueueError> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'queued', attempts = 0, last_error = NULL,
            run_at = NOW(), locked_until = NULL, updated_at = NOW()
        WHERE id = $1 AND status = 'exhausted'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(QueueError::JobNotFound(job_id));
    }
    Ok(())
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: Job, policy: RetryPolicy) -> Result<Uuid, QueueError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_job(&mut tx, &job, &policy).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn claim(&self) -> Result<Option<DeliveredJob>, QueueError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'running',
                attempts = attempts + 1,
                locked_until = NOW() + make_interval(secs => $1),
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM jobs
                WHERE (status = 'queued' AND run_at <= NOW())
                   OR (status = 'running' AND locked_until < NOW())
                ORDER BY run_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(self.liveness_secs as f64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DeliveredJob {
            job: Job {
                id: r.id,
                request: r.request.0,
                correlation: r.correlation,
            },
            attempt: r.attempts as u32,
            max_attempts: r.max_attempts as u32,
        }))
    }

    async fn ack(&self, job_id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'completed', locked_until = NULL, updated_at = NOW()
             WHERE id = $1 AND status = 'running'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }

    async fn nack(&self, job_id: Uuid, error: &str) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(QueueError::JobNotFound(job_id))?;

        if row.attempts >= row.max_attempts {
            // Exhausted jobs are retained for manual inspection.
            sqlx::query(
                "UPDATE jobs SET status = 'exhausted', last_error = $2,
                 locked_until = NULL, updated_at = NOW() WHERE id = $1",
            )
            .bind(job_id)
            .bind(error)
            .execute(&mut *tx)
            .await?;
        } else {
            let policy =
                RetryPolicy::exponential(row.max_attempts as u32, row.backoff_base_secs as u64);
            let delay = policy.delay_after_attempt(row.attempts as u32);
            let run_at = Utc::now()
                + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(0));

            sqlx::query(
                "UPDATE jobs SET status = 'queued', last_error = $2, run_at = $3,
                 locked_until = NULL, updated_at = NOW() WHERE id = $1",
            )
            .bind(job_id)
            .bind(error)
            .bind(run_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'exhausted', last_error = $2,
             locked_until = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }
}
