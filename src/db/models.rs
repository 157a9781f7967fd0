use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::{BigDecimal, Json};
use uuid::Uuid;

use crate::domain::{AdditionalDetail, Counterparty, DepositEvent, LedgerStatus, SettlementStatus};

/// One inbound crypto deposit. Mutated only by the orchestrator; terminal
/// once SETTLED or FAILED.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CryptoFundTransaction {
    pub id: Uuid,
    /// Depositor's user id.
    pub sender_id: String,
    pub source_address: Option<String>,
    /// Platform-owned wallet the deposit landed on.
    pub deposit_address: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub reference: String,
    pub settlement_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CryptoFundTransaction {
    pub fn from_event(event: &DepositEvent, status: SettlementStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender_id: event.user.id.clone(),
            source_address: event.wallet.source_address.clone(),
            deposit_address: event.wallet.deposit_address.clone(),
            amount: event.amount.clone(),
            currency: event.currency.clone(),
            reference: event.reference.clone(),
            settlement_status: status.as_str().to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// The fiat-side ledger record, keyed by the same reference as the crypto
/// leg. Immutable after completed/cancelled/failed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub reference: String,
    /// Net fiat value to transfer.
    pub amount: BigDecimal,
    pub tx_type: String,
    pub status: String,
    pub service: String,
    pub paid_from: Json<Counterparty>,
    pub paid_to: Option<Json<Counterparty>>,
    pub additional_details: Json<Vec<AdditionalDetail>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    fn new(
        reference: &str,
        amount: BigDecimal,
        status: LedgerStatus,
        paid_from: Counterparty,
        paid_to: Option<Counterparty>,
        additional_details: Vec<AdditionalDetail>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference: reference.to_string(),
            amount,
            tx_type: "funding".to_string(),
            status: status.as_str().to_string(),
            service: "crypto".to_string(),
            paid_from: Json(paid_from),
            paid_to: paid_to.map(Json),
            additional_details: Json(additional_details),
            created_at: now,
            updated_at: now,
        }
    }

    /// Entry awaiting its bank transfer.
    pub fn pending(
        reference: &str,
        amount: BigDecimal,
        paid_from: Counterparty,
        paid_to: Counterparty,
    ) -> Self {
        Self::new(
            reference,
            amount,
            LedgerStatus::Pending,
            paid_from,
            Some(paid_to),
            Vec::new(),
        )
    }

    /// Entry created directly as failed, e.g. a deposit that cannot cover
    /// its own fees. The recipient leg was never resolved.
    pub fn failed(
        reference: &str,
        amount: BigDecimal,
        paid_from: Counterparty,
        reason: &str,
    ) -> Self {
        Self::new(
            reference,
            amount,
            LedgerStatus::Failed,
            paid_from,
            None,
            vec![AdditionalDetail::failure_reason(reason)],
        )
    }
}

/// The depositor's payout account, owned by the account-management system.
/// Read-only here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LinkedBankAccount {
    pub user_id: String,
    pub account_number: String,
    pub bank_code: String,
    pub account_name: String,
}
