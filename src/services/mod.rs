pub mod dispatcher;
pub mod notify;
pub mod orchestrator;
pub mod transfer_worker;

pub use dispatcher::Dispatcher;
pub use notify::{Notifier, SettlementNotice, WebhookNotifier};
pub use orchestrator::{SettleOutcome, SettlementOrchestrator};
pub use transfer_worker::TransferWorker;
