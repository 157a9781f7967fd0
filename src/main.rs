mod cli;

use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settlement_core::clients::{BankClient, ExchangeClient};
use settlement_core::config::Config;
use settlement_core::directory::PgAccountDirectory;
use settlement_core::ledger::PgLedgerStore;
use settlement_core::queue::{pg as pg_queue, JobQueue, PgJobQueue};
use settlement_core::services::{Dispatcher, SettlementOrchestrator, TransferWorker, WebhookNotifier};
use settlement_core::{create_app, db, AppState};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = db::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let config = Arc::new(config);

    match args.command {
        Command::Serve => {
            let dispatcher = build_dispatcher(&pool, &config);
            spawn_workers(dispatcher, config.worker_count);

            let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(pool.clone()));
            let state = AppState {
                db: pool.clone(),
                queue,
                config: config.clone(),
            };
            let app = create_app(state);

            let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
            tracing::info!("listening on {}", addr);
            axum::Server::bind(&addr)
                .serve(app.into_make_service())
                .await?;
        }
        Command::Worker => {
            let dispatcher = build_dispatcher(&pool, &config);
            spawn_workers(dispatcher.clone(), config.worker_count.saturating_sub(1));
            dispatcher.run().await;
        }
        Command::Requeue { job_id } => {
            pg_queue::requeue_exhausted(&pool, job_id).await?;
            tracing::info!(%job_id, "job requeued");
        }
    }

    Ok(())
}

fn build_dispatcher(pool: &sqlx::PgPool, config: &Arc<Config>) -> Arc<Dispatcher> {
    let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(pool.clone()));
    let ledger = Arc::new(PgLedgerStore::new(pool.clone()));
    let directory = Arc::new(PgAccountDirectory::new(pool.clone()));
    let exchange = Arc::new(ExchangeClient::new(config.exchange_api_url.clone()));
    let bank = Arc::new(BankClient::new(config.bank_api_url.clone()));
    let notifier = Arc::new(WebhookNotifier::new(config.notification_url.clone()));

    let orchestrator = Arc::new(SettlementOrchestrator::new(
        ledger.clone(),
        exchange,
        bank.clone(),
        directory,
        notifier.clone(),
        config.clone(),
    ));
    let transfer_worker = Arc::new(TransferWorker::new(ledger, bank, notifier));

    Arc::new(Dispatcher::new(queue, orchestrator, transfer_worker))
}

fn spawn_workers(dispatcher: Arc<Dispatcher>, count: usize) {
    for _ in 0..count {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.run().await;
        });
    }
}
