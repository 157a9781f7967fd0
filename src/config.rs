use anyhow::Result;
use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub exchange_api_url: String,
    pub bank_api_url: String,
    pub notification_url: Option<String>,
    /// Platform-owned bank account the fiat transfer is drawn from.
    pub platform_account_number: String,
    pub platform_account_name: String,
    /// Fiat currency every settlement pays out in.
    pub settlement_currency: String,
    /// Fixed platform fee per crypto currency. A currency missing from this
    /// table is a configuration error, never a runtime fallback.
    pub platform_fees: HashMap<String, BigDecimal>,
    /// Margin charged on top of network + platform fees, as a percentage.
    pub margin_rate_percent: BigDecimal,
    pub worker_count: usize,
    pub transfer_max_attempts: u32,
    pub transfer_backoff_base_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            exchange_api_url: env::var("EXCHANGE_API_URL")?,
            bank_api_url: env::var("BANK_API_URL")?,
            notification_url: env::var("NOTIFICATION_URL").ok(),
            platform_account_number: env::var("PLATFORM_ACCOUNT_NUMBER")?,
            platform_account_name: env::var("PLATFORM_ACCOUNT_NAME")?,
            settlement_currency: env::var("SETTLEMENT_CURRENCY")
                .unwrap_or_else(|_| "NGN".to_string()),
            platform_fees: parse_platform_fees(&env::var("PLATFORM_FEES")?)?,
            margin_rate_percent: BigDecimal::from_str(
                &env::var("MARGIN_RATE_PERCENT").unwrap_or_else(|_| "10".to_string()),
            )?,
            worker_count: env::var("WORKER_COUNT")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
            transfer_max_attempts: env::var("TRANSFER_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            transfer_backoff_base_secs: env::var("TRANSFER_BACKOFF_BASE_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        })
    }

    /// Fixed platform fee for a currency. Absence is a hard error.
    pub fn platform_fee(&self, currency: &str) -> Result<BigDecimal, AppError> {
        self.platform_fees.get(currency).cloned().ok_or_else(|| {
            AppError::Configuration(format!("no platform fee configured for {}", currency))
        })
    }

    /// Margin rate as a fraction (10 -> 0.10).
    pub fn margin_rate(&self) -> BigDecimal {
        self.margin_rate_percent.clone() / BigDecimal::from(100)
    }
}

/// Parses `PLATFORM_FEES`, e.g. `BTC=0.00005,ETH=0.0015,USDT=1`.
fn parse_platform_fees(raw: &str) -> Result<HashMap<String, BigDecimal>> {
    let mut fees = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (currency, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("PLATFORM_FEES entry '{}' is not CODE=value", entry))?;
        fees.insert(
            currency.trim().to_uppercase(),
            BigDecimal::from_str(value.trim())?,
        );
    }

    if fees.is_empty() {
        anyhow::bail!("PLATFORM_FEES must be a comma-separated list of CODE=value pairs");
    }

    Ok(fees)
}
