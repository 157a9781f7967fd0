pub mod clients;
pub mod config;
pub mod db;
pub mod directory;
pub mod domain;
pub mod error;
pub mod fees;
pub mod handlers;
pub mod ledger;
pub mod queue;
pub mod services;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

use crate::config::Config;
use crate::queue::JobQueue;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub queue: Arc<dyn JobQueue>,
    pub config: Arc<Config>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/events/deposit", post(handlers::deposit_callback))
        .route("/jobs/exhausted", get(handlers::list_exhausted_jobs))
        .with_state(state)
}
