//! Consumes transfer jobs and drives the fiat leg to a terminal status.

use std::sync::Arc;

use crate::clients::bank::{BankApi, BankError, TransferRequest};
use crate::domain::TransferInstruction;
use crate::error::AppError;
use crate::ledger::LedgerStore;
use crate::services::notify::{Notifier, SettlementNotice};

pub struct TransferWorker {
    ledger: Arc<dyn LedgerStore>,
    bank: Arc<dyn BankApi>,
    notifier: Arc<dyn Notifier>,
}

impl TransferWorker {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        bank: Arc<dyn BankApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledger,
            bank,
            notifier,
        }
    }

    /// Executes one bank transfer. A provider rejection finalizes the
    /// ledger entry as failed and acks the job; the crypto leg stays
    /// SETTLED (reconciled manually, never reverted here). Transport
    /// errors propagate so the queue retries; the instruction is frozen
    /// and the provider dedupes on the reference, so a repeat is safe.
    pub async fn process_transfer(
        &self,
        instruction: &TransferInstruction,
    ) -> Result<(), AppError> {
        let reference = instruction.reference.as_str();
        let request = TransferRequest::from(instruction);

        match self.bank.transfer_funds(&request).await {
            Ok(receipt) => {
                self.ledger
                    .complete_transfer(reference, &receipt.txn_id)
                    .await?;
                tracing::info!(reference, txn_id = %receipt.txn_id, "bank transfer completed");
                self.notifier
                    .notify(SettlementNotice::TransferCompleted {
                        reference: reference.to_string(),
                    })
                    .await;
                Ok(())
            }
            Err(BankError::Provider { code, message }) => {
                let reason = format!("{}: {}", code, message);
                self.ledger.fail_transfer(reference, &reason).await?;
                tracing::warn!(reference, %reason, "bank transfer rejected by provider");
                self.notifier
                    .notify(SettlementNotice::TransferFailed {
                        reference: reference.to_string(),
                        reason,
                    })
                    .await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(reference, error = %e, "bank transfer attempt failed, leaving job for retry");
                Err(e.into())
            }
        }
    }
}
