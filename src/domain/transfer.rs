//! Counterparty descriptors and the dispatched transfer instruction.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// One economic counterparty of a ledger entry (`meta.paid_from` /
/// `meta.paid_to`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub code: Option<String>,
    pub number: Option<String>,
    pub name: Option<String>,
}

impl Counterparty {
    /// The crypto leg: funds arriving at a platform deposit wallet.
    pub fn crypto_wallet(user_id: &str, currency: &str, address: &str) -> Self {
        Self {
            id: user_id.to_string(),
            kind: "crypto_wallet".to_string(),
            code: Some(currency.to_string()),
            number: Some(address.to_string()),
            name: None,
        }
    }

    /// The fiat leg: the depositor's linked bank account.
    pub fn bank_account(user_id: &str, bank_code: &str, account_number: &str, name: &str) -> Self {
        Self {
            id: user_id.to_string(),
            kind: "bank_account".to_string(),
            code: Some(bank_code.to_string()),
            number: Some(account_number.to_string()),
            name: Some(name.to_string()),
        }
    }
}

/// Typed free-form note attached to a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub note: String,
}

impl AdditionalDetail {
    pub fn failure_reason(note: impl Into<String>) -> Self {
        Self {
            kind: "failure_reason".to_string(),
            note: note.into(),
        }
    }

    pub fn provider_message(note: impl Into<String>) -> Self {
        Self {
            kind: "provider_message".to_string(),
            note: note.into(),
        }
    }
}

/// Everything the bank transfer worker needs, frozen at orchestration time
/// so a redelivered job replays the exact same request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferInstruction {
    /// Same reference as the ledger rows; the banking provider dedupes on it.
    pub reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub sender_account: String,
    pub sender_name: String,
    pub receiver_account: String,
    pub receiver_bank_code: String,
    pub receiver_name: String,
    pub narration: String,
    /// One-way hash of (sender account, receiver account); required by the
    /// banking provider and reproducible across retries.
    pub signature: String,
}
