//! Thin adapter over the crypto exchange's fee/quote/withdrawal API.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::AppError;
use crate::fees::FeeSchedule;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Exchange API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response from exchange: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

impl From<ExchangeError> for AppError {
    fn from(e: ExchangeError) -> Self {
        AppError::ExternalService(e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeScheduleResponse {
    pub fee: FeeSchedule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapQuote {
    #[serde(rename = "quotedPrice")]
    pub quoted_price: BigDecimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalResult {
    pub id: String,
    pub status: String,
}

#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn withdrawal_fee_schedule(&self, currency: &str)
        -> Result<FeeSchedule, ExchangeError>;

    async fn swap_quote(
        &self,
        from_currency: &str,
        to_currency: &str,
        from_amount: &BigDecimal,
    ) -> Result<SwapQuote, ExchangeError>;

    async fn create_withdrawal(
        &self,
        currency: &str,
        amount: &BigDecimal,
        reference: &str,
    ) -> Result<WithdrawalResult, ExchangeError>;
}

/// HTTP client for the exchange API.
#[derive(Clone)]
pub struct ExchangeClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl ExchangeClient {
    pub fn new(base_url: String) -> Self {
        Self::with_circuit_breaker(base_url, 3, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        ExchangeClient {
            client,
            base_url,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned + 'static>(
        &self,
        url: String,
    ) -> Result<T, ExchangeError> {
        let client = self.client.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).send().await?;
                let status = response.status();

                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    return Err(ExchangeError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }

                Ok(response.json::<T>().await?)
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(ExchangeError::CircuitBreakerOpen(
                "exchange API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl ExchangeApi for ExchangeClient {
    async fn withdrawal_fee_schedule(
        &self,
        currency: &str,
    ) -> Result<FeeSchedule, ExchangeError> {
        let url = format!(
            "{}/fees/withdrawal/{}",
            self.base_url.trim_end_matches('/'),
            currency
        );
        let response: FeeScheduleResponse = self.get_json(url).await?;
        Ok(response.fee)
    }

    async fn swap_quote(
        &self,
        from_currency: &str,
        to_currency: &str,
        from_amount: &BigDecimal,
    ) -> Result<SwapQuote, ExchangeError> {
        let url = format!(
            "{}/swap/quote?from={}&to={}&amount={}",
            self.base_url.trim_end_matches('/'),
            from_currency,
            to_currency,
            from_amount
        );
        self.get_json(url).await
    }

    async fn create_withdrawal(
        &self,
        currency: &str,
        amount: &BigDecimal,
        reference: &str,
    ) -> Result<WithdrawalResult, ExchangeError> {
        let url = format!("{}/withdrawals", self.base_url.trim_end_matches('/'));
        let client = self.client.clone();
        let body = serde_json::json!({
            "currency": currency,
            "amount": amount,
            "reference": reference,
        });

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.post(&url).json(&body).send().await?;
                let status = response.status();

                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    return Err(ExchangeError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }

                Ok(response.json::<WithdrawalResult>().await?)
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(ExchangeError::CircuitBreakerOpen(
                "exchange API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_exchange_client_creation() {
        let client = ExchangeClient::new("https://exchange.example.com".to_string());
        assert_eq!(client.base_url, "https://exchange.example.com");
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_flat_fee_schedule() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/fees/withdrawal/BTC")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"fee": "0.00005"}"#)
            .create_async()
            .await;

        let client = ExchangeClient::new(server.url());
        let schedule = client.withdrawal_fee_schedule("BTC").await.unwrap();
        assert!(matches!(schedule, FeeSchedule::Flat(v) if v == BigDecimal::from_str("0.00005").unwrap()));
    }

    #[tokio::test]
    async fn test_tiered_fee_schedule() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/fees/withdrawal/ETH")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"fee": [
                    {"min": "0", "max": "1", "value": "0.001"},
                    {"min": "1", "max": "50", "value": "0.002"}
                ]}"#,
            )
            .create_async()
            .await;

        let client = ExchangeClient::new(server.url());
        let schedule = client.withdrawal_fee_schedule("ETH").await.unwrap();
        assert!(matches!(schedule, FeeSchedule::Ranges(r) if r.len() == 2));
    }

    #[tokio::test]
    async fn test_swap_quote() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/swap/quote\?.*".to_string()),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"quotedPrice": "151230000.55"}"#)
            .create_async()
            .await;

        let client = ExchangeClient::new(server.url());
        let quote = client
            .swap_quote("BTC", "NGN", &BigDecimal::from(1))
            .await
            .unwrap();
        assert_eq!(
            quote.quoted_price,
            BigDecimal::from_str("151230000.55").unwrap()
        );
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/fees/withdrawal/BTC")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let client = ExchangeClient::new(server.url());
        let result = client.withdrawal_fee_schedule("BTC").await;
        assert!(matches!(
            result,
            Err(ExchangeError::Api { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/fees/withdrawal/BTC")
            .with_status(500)
            .expect_at_least(3)
            .create_async()
            .await;

        let client = ExchangeClient::with_circuit_breaker(server.url(), 3, 60);
        for _ in 0..3 {
            let _ = client.withdrawal_fee_schedule("BTC").await;
        }

        let result = client.withdrawal_fee_schedule("BTC").await;
        assert!(matches!(result, Err(ExchangeError::CircuitBreakerOpen(_))));
    }
}
