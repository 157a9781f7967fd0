use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};

use crate::db::models::{CryptoFundTransaction, LedgerTransaction, LinkedBankAccount};
use crate::domain::AdditionalDetail;
use sqlx::types::Json;

// --- CryptoFundTransaction queries ---

pub async fn get_crypto_fund_by_reference(
    pool: &PgPool,
    reference: &str,
) -> Result<Option<CryptoFundTransaction>> {
    sqlx::query_as::<_, CryptoFundTransaction>(
        "SELECT * FROM crypto_fund_transactions WHERE reference = $1",
    )
    .bind(reference)
    .fetch_optional(pool)
    .await
}

pub async fn insert_crypto_fund(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &CryptoFundTransaction,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO crypto_fund_transactions (
            id, sender_id, source_address, deposit_address, amount, currency,
            reference, settlement_status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(tx.id)
    .bind(&tx.sender_id)
    .bind(&tx.source_address)
    .bind(&tx.deposit_address)
    .bind(&tx.amount)
    .bind(&tx.currency)
    .bind(&tx.reference)
    .bind(&tx.settlement_status)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .execute(&mut **executor)
    .await?;

    Ok(())
}

// --- LedgerTransaction queries ---

pub async fn get_ledger_by_reference(
    pool: &PgPool,
    reference: &str,
) -> Result<Option<LedgerTransaction>> {
    sqlx::query_as::<_, LedgerTransaction>(
        "SELECT * FROM ledger_transactions WHERE reference = $1",
    )
    .bind(reference)
    .fetch_optional(pool)
    .await
}

pub async fn insert_ledger(
    executor: &mut SqlxTransaction<'_, Postgres>,
    entry: &LedgerTransaction,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_transactions (
            id, reference, amount, tx_type, status, service,
            paid_from, paid_to, additional_details, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.reference)
    .bind(&entry.amount)
    .bind(&entry.tx_type)
    .bind(&entry.status)
    .bind(&entry.service)
    .bind(&entry.paid_from)
    .bind(&entry.paid_to)
    .bind(&entry.additional_details)
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(&mut **executor)
    .await?;

    Ok(())
}

/// Moves a ledger entry to a terminal status, appending a typed note.
/// Guarded so a terminal entry is never rewritten; returns the number of
/// rows touched (0 when the entry was already terminal or absent).
pub async fn finalize_ledger_status(
    pool: &PgPool,
    reference: &str,
    status: &str,
    detail: Option<&AdditionalDetail>,
) -> Result<u64> {
    let details = detail.map(|d| Json(vec![d.clone()]));
    let result = sqlx::query(
        r#"
        UPDATE ledger_transactions
        SET status = $2,
            additional_details = additional_details || COALESCE($3, '[]'::jsonb),
            updated_at = NOW()
        WHERE reference = $1
          AND status IN ('initiated', 'pending', 'processing')
        "#,
    )
    .bind(reference)
    .bind(status)
    .bind(details)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// --- Linked bank account (account management is external; read-only) ---

pub async fn get_linked_bank_account(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<LinkedBankAccount>> {
    sqlx::query_as::<_, LinkedBankAccount>(
        "SELECT user_id, account_number, bank_code, account_name
         FROM linked_bank_accounts WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}
