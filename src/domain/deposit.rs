//! Inbound deposit-confirmed event, as delivered by the webhook ingress.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub id: String,
    /// Unique per deposit; the idempotency key for the whole saga.
    pub reference: String,
    pub currency: String,
    pub amount: BigDecimal,
    pub status: String,
    pub wallet: DepositWallet,
    pub user: DepositUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositWallet {
    #[serde(rename = "depositAddress")]
    pub deposit_address: String,
    #[serde(rename = "sourceAddress", default)]
    pub source_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositUser {
    pub id: String,
}

impl DepositEvent {
    /// Only confirmed deposits enter the settlement saga; every other
    /// provider status is a no-op, not an error.
    pub fn triggers_settlement(&self) -> bool {
        matches!(self.status.as_str(), "done" | "accepted")
    }
}
