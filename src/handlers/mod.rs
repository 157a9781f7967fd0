use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::domain::DepositEvent;
use crate::error::AppError;
use crate::queue::{pg as pg_queue, Job, JobQueue, JobRequest, RetryPolicy};
use crate::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Webhook ingress for deposit-confirmed events. Enqueues the event and
/// returns immediately; the saga runs on the worker pool. Non-triggering
/// statuses are still accepted and no-op inside the orchestrator.
pub async fn deposit_callback(
    State(state): State<AppState>,
    Json(event): Json<DepositEvent>,
) -> Result<impl IntoResponse, AppError> {
    if event.reference.is_empty() {
        return Err(AppError::BadRequest("deposit reference is empty".to_string()));
    }

    let reference = event.reference.clone();
    let job = Job::new(
        JobRequest::DepositConfirmed(event),
        Some(reference.clone()),
    );
    let policy = RetryPolicy::exponential(
        state.config.transfer_max_attempts,
        state.config.transfer_backoff_base_secs,
    );

    let job_id = state.queue.enqueue(job, policy).await.map_err(AppError::from)?;
    tracing::info!(reference, %job_id, "deposit event accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job_id, "reference": reference })),
    ))
}

/// Jobs that ran out of attempts, retained for manual inspection.
pub async fn list_exhausted_jobs(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let jobs = pg_queue::list_exhausted(&state.db, 100)
        .await
        .map_err(AppError::from)?;

    Ok(Json(json!({
        "count": jobs.len(),
        "jobs": jobs,
    })))
}
