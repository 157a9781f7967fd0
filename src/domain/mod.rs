pub mod deposit;
pub mod status;
pub mod transfer;

pub use deposit::DepositEvent;
pub use status::{LedgerStatus, SettlementStatus};
pub use transfer::{AdditionalDetail, Counterparty, TransferInstruction};
