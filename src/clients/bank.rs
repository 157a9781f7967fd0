//! Thin adapter over the banking provider's balance/verify/transfer API.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::TransferInstruction;
use crate::error::AppError;

#[derive(Error, Debug)]
pub enum BankError {
    /// Transport-level failure (connect, timeout). Safe to retry: the
    /// provider's transfer endpoint dedupes on the reference.
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// The provider processed the call and said no. Not retryable.
    #[error("Bank provider rejected request ({code}): {message}")]
    Provider { code: String, message: String },
    #[error("Invalid response from bank provider: {0}")]
    InvalidResponse(String),
}

impl From<BankError> for AppError {
    fn from(e: BankError) -> Self {
        AppError::ExternalService(e.to_string())
    }
}

/// Deterministic one-way signature over the two account numbers, required
/// by the banking provider. Reproducible so retried jobs resend the exact
/// same request.
pub fn transfer_signature(sender_account: &str, receiver_account: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sender_account.as_bytes());
    hasher.update(receiver_account.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: BigDecimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedAccount {
    pub name: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub account: VerifiedAccountRef,
    pub bank: String,
    #[serde(default)]
    pub bvn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedAccountRef {
    pub number: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    pub reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(rename = "senderAccount")]
    pub sender_account: String,
    #[serde(rename = "senderName")]
    pub sender_name: String,
    #[serde(rename = "receiverAccount")]
    pub receiver_account: String,
    #[serde(rename = "receiverBankCode")]
    pub receiver_bank_code: String,
    #[serde(rename = "receiverName")]
    pub receiver_name: String,
    pub narration: String,
    pub signature: String,
}

impl From<&TransferInstruction> for TransferRequest {
    fn from(instruction: &TransferInstruction) -> Self {
        Self {
            reference: instruction.reference.clone(),
            amount: instruction.amount.clone(),
            currency: instruction.currency.clone(),
            sender_account: instruction.sender_account.clone(),
            sender_name: instruction.sender_name.clone(),
            receiver_account: instruction.receiver_account.clone(),
            receiver_bank_code: instruction.receiver_bank_code.clone(),
            receiver_name: instruction.receiver_name.clone(),
            narration: instruction.narration.clone(),
            signature: instruction.signature.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferReceipt {
    #[serde(rename = "txnId")]
    pub txn_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ProviderError {
    code: Option<String>,
    message: Option<String>,
}

#[async_trait]
pub trait BankApi: Send + Sync {
    async fn account_balance(&self, account_no: &str) -> Result<BigDecimal, BankError>;

    async fn verify_bank_details(
        &self,
        account_no: &str,
        bank_code: &str,
        transfer_type: &str,
    ) -> Result<VerifiedAccount, BankError>;

    async fn transfer_funds(&self, request: &TransferRequest)
        -> Result<TransferReceipt, BankError>;
}

/// HTTP client for the banking provider.
#[derive(Clone)]
pub struct BankClient {
    client: Client,
    base_url: String,
}

impl BankClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        BankClient { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn provider_rejection(response: reqwest::Response) -> BankError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<ProviderError> = serde_json::from_str(&body).ok();
        match parsed {
            Some(e) => BankError::Provider {
                code: e.code.unwrap_or_else(|| status.to_string()),
                message: e.message.unwrap_or(body),
            },
            None => BankError::Provider {
                code: status.to_string(),
                message: body,
            },
        }
    }
}

#[async_trait]
impl BankApi for BankClient {
    async fn account_balance(&self, account_no: &str) -> Result<BigDecimal, BankError> {
        let url = self.url(&format!("/accounts/{}/balance", account_no));
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::provider_rejection(response).await);
        }

        let body: BalanceResponse = response.json().await?;
        Ok(body.balance)
    }

    async fn verify_bank_details(
        &self,
        account_no: &str,
        bank_code: &str,
        transfer_type: &str,
    ) -> Result<VerifiedAccount, BankError> {
        let url = self.url(&format!(
            "/accounts/verify?accountNo={}&bankCode={}&transferType={}",
            account_no, bank_code, transfer_type
        ));
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::provider_rejection(response).await);
        }

        let verified: VerifiedAccount = response.json().await?;
        if verified.name.is_empty() {
            return Err(BankError::InvalidResponse(format!(
                "empty verification result for account {}",
                account_no
            )));
        }
        Ok(verified)
    }

    async fn transfer_funds(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, BankError> {
        let url = self.url("/transfers");
        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(Self::provider_rejection(response).await);
        }

        Ok(response.json::<TransferReceipt>().await?)
    }
}
