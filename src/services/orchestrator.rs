//! Deposit settlement saga. One deposit-confirmed event in, one settled
//! (or failed) pair of ledger records out.
//!
//! All external calls run outside any open database transaction; the
//! ledger writes plus the transfer-job enqueue form one short atomic
//! commit at the end. A crash mid-saga therefore leaves either no trace
//! or a fully committed record, and the queue redelivers the original
//! event into the idempotency guard.

use bigdecimal::BigDecimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::clients::bank::{transfer_signature, BankApi};
use crate::clients::exchange::ExchangeApi;
use crate::config::Config;
use crate::db::models::{CryptoFundTransaction, LedgerTransaction};
use crate::directory::AccountDirectory;
use crate::domain::{Counterparty, DepositEvent, SettlementStatus, TransferInstruction};
use crate::error::AppError;
use crate::fees;
use crate::ledger::LedgerStore;
use crate::queue::{Job, JobRequest, RetryPolicy};
use crate::services::notify::{Notifier, SettlementNotice};

const INSUFFICIENT_REASON: &str = "deposit insufficient to cover fees";
const TRANSFER_TYPE: &str = "inter";

#[derive(Debug, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Ledger committed and transfer job enqueued.
    Dispatched { job_id: Uuid },
    /// Deposit could not cover its fees; recorded as failed. Expected path.
    InsufficientDeposit,
    /// A record for this reference already exists; no side effects.
    Duplicate,
    /// Event status does not trigger settlement; no side effects.
    Ignored,
}

pub struct SettlementOrchestrator {
    ledger: Arc<dyn LedgerStore>,
    exchange: Arc<dyn ExchangeApi>,
    bank: Arc<dyn BankApi>,
    directory: Arc<dyn AccountDirectory>,
    notifier: Arc<dyn Notifier>,
    config: Arc<Config>,
}

impl SettlementOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        exchange: Arc<dyn ExchangeApi>,
        bank: Arc<dyn BankApi>,
        directory: Arc<dyn AccountDirectory>,
        notifier: Arc<dyn Notifier>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            ledger,
            exchange,
            bank,
            directory,
            notifier,
            config,
        }
    }

    /// Runs the settlement saga for one deposit event. Idempotent on the
    /// deposit reference; errors are surfaced to the caller so the queue's
    /// backoff policy redelivers the event.
    pub async fn settle(&self, event: &DepositEvent) -> Result<SettleOutcome, AppError> {
        let reference = event.reference.as_str();

        if !event.triggers_settlement() {
            tracing::debug!(reference, status = %event.status, "deposit status does not trigger settlement");
            return Ok(SettleOutcome::Ignored);
        }

        // Idempotency guard: any existing record for this reference, in-flight
        // or terminal, means a previous attempt already got this far.
        if self.ledger.crypto_fund_by_reference(reference).await?.is_some()
            || self.ledger.ledger_by_reference(reference).await?.is_some()
        {
            tracing::info!(reference, "settlement already recorded, skipping");
            return Ok(SettleOutcome::Duplicate);
        }

        let schedule = self.exchange.withdrawal_fee_schedule(&event.currency).await?;
        let platform_fee = self.config.platform_fee(&event.currency)?;
        let quote_fees = fees::compute_fees(
            &schedule,
            &platform_fee,
            &self.config.margin_rate(),
            &event.amount,
        )?;

        let paid_from = Counterparty::crypto_wallet(
            &event.user.id,
            &event.currency,
            &event.wallet.deposit_address,
        );

        if quote_fees.is_insufficient() {
            tracing::warn!(
                reference,
                amount = %event.amount,
                total_fees = %quote_fees.total_fees,
                "{INSUFFICIENT_REASON}"
            );
            let crypto = CryptoFundTransaction::from_event(event, SettlementStatus::Failed);
            let entry = LedgerTransaction::failed(
                reference,
                BigDecimal::from(0),
                paid_from,
                INSUFFICIENT_REASON,
            );
            self.ledger.commit_insufficient(&crypto, &entry).await?;
            self.notifier
                .notify(SettlementNotice::SettlementFailed {
                    reference: reference.to_string(),
                    reason: INSUFFICIENT_REASON.to_string(),
                })
                .await;
            return Ok(SettleOutcome::InsufficientDeposit);
        }

        let quote = self
            .exchange
            .swap_quote(
                &event.currency,
                &self.config.settlement_currency,
                &quote_fees.net_amount,
            )
            .await?;
        if quote.quoted_price <= BigDecimal::from(0) {
            return Err(AppError::ExternalService(format!(
                "exchange returned zero quote for {}/{}",
                event.currency, self.config.settlement_currency
            )));
        }

        let account = self.directory.linked_bank_account(&event.user.id).await?;
        let verified = self
            .bank
            .verify_bank_details(&account.account_number, &account.bank_code, TRANSFER_TYPE)
            .await?;

        let signature = transfer_signature(
            &self.config.platform_account_number,
            &verified.account.number,
        );
        // with_scale truncates toward zero: fractional sub-units of the
        // payout currency are never paid out.
        let fiat_amount = (&quote_fees.net_amount * &quote.quoted_price).with_scale(2);

        let paid_to = Counterparty::bank_account(
            &event.user.id,
            &account.bank_code,
            &verified.account.number,
            &verified.name,
        );

        let crypto = CryptoFundTransaction::from_event(event, SettlementStatus::Settled);
        let entry =
            LedgerTransaction::pending(reference, fiat_amount.clone(), paid_from, paid_to);

        let instruction = TransferInstruction {
            reference: reference.to_string(),
            amount: fiat_amount,
            currency: self.config.settlement_currency.clone(),
            sender_account: self.config.platform_account_number.clone(),
            sender_name: self.config.platform_account_name.clone(),
            receiver_account: verified.account.number.clone(),
            receiver_bank_code: account.bank_code.clone(),
            receiver_name: verified.name.clone(),
            narration: format!("crypto settlement {}", reference),
            signature,
        };
        let job = Job::new(
            JobRequest::BankTransfer(instruction),
            Some(reference.to_string()),
        );
        let policy = RetryPolicy::exponential(
            self.config.transfer_max_attempts,
            self.config.transfer_backoff_base_secs,
        );

        // Single atomic commit: SETTLED crypto leg, pending ledger entry and
        // the durable transfer job. Enqueue failure rolls back everything.
        let job_id = self
            .ledger
            .commit_settlement(&crypto, &entry, job, policy)
            .await?;

        tracing::info!(
            reference,
            %job_id,
            net = %quote_fees.net_amount,
            "settlement committed, transfer dispatched"
        );
        self.notifier
            .notify(SettlementNotice::SettlementDispatched {
                reference: reference.to_string(),
            })
            .await;

        Ok(SettleOutcome::Dispatched { job_id })
    }
}
