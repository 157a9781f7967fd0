pub mod bank;
pub mod exchange;

pub use bank::{BankApi, BankClient, BankError};
pub use exchange::{ExchangeApi, ExchangeClient, ExchangeError};
