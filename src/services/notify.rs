//! Fire-and-forget settlement notifications. Delivery failure is logged
//! and never affects the saga.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SettlementNotice {
    SettlementDispatched { reference: String },
    SettlementFailed { reference: String, reason: String },
    TransferCompleted { reference: String },
    TransferFailed { reference: String, reason: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: SettlementNotice);
}

/// Posts notices to the notification service's webhook, when one is
/// configured. Without a URL it only logs.
pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notice: SettlementNotice) {
        let Some(url) = self.url.clone() else {
            tracing::debug!(?notice, "notification dispatch skipped, no URL configured");
            return;
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&notice).send().await {
                tracing::warn!(error = %e, "notification delivery failed");
            }
        });
    }
}
