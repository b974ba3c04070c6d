use chrono::{DateTime, Utc};
use log::debug;
use qpg_common::Money;
use sqlx::SqliteConnection;

use super::first_row;
use crate::{
    db_types::{Merchant, NewMerchant},
    traits::PaymentGatewayError,
};

pub async fn insert_merchant(
    merchant: NewMerchant,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Merchant, sqlx::Error> {
    let merchants: Vec<Merchant> = sqlx::query_as(
        r#"
        INSERT INTO merchants (name, secret_key, bill_credential, payment_code_url, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *;
        "#,
    )
    .bind(merchant.name)
    .bind(merchant.secret_key)
    .bind(merchant.bill_credential)
    .bind(merchant.payment_code_url)
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await?;
    let merchant = first_row(merchants)?;
    debug!("🗃️ Merchant #{} ({}) created", merchant.id, merchant.name);
    Ok(merchant)
}

pub async fn fetch_merchant(id: i64, conn: &mut SqliteConnection) -> Result<Option<Merchant>, sqlx::Error> {
    let merchant = sqlx::query_as("SELECT * FROM merchants WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(merchant)
}

pub async fn set_active(
    id: i64,
    active: bool,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Merchant, PaymentGatewayError> {
    let merchants: Vec<Merchant> =
        sqlx::query_as("UPDATE merchants SET active = $1, updated_at = $2 WHERE id = $3 RETURNING *")
            .bind(active)
            .bind(now)
            .bind(id)
            .fetch_all(conn)
            .await?;
    merchants.into_iter().next().ok_or(PaymentGatewayError::MerchantNotFound(id))
}

pub async fn update_bill_credential(
    id: i64,
    credential: Option<String>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Merchant, PaymentGatewayError> {
    let merchants: Vec<Merchant> =
        sqlx::query_as("UPDATE merchants SET bill_credential = $1, updated_at = $2 WHERE id = $3 RETURNING *")
            .bind(credential)
            .bind(now)
            .bind(id)
            .fetch_all(conn)
            .await?;
    merchants.into_iter().next().ok_or(PaymentGatewayError::MerchantNotFound(id))
}

/// Adds a confirmed receipt to the merchant's running total.
pub async fn add_to_balance(
    id: i64,
    amount: Money,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    let result = sqlx::query("UPDATE merchants SET balance = balance + $1, updated_at = $2 WHERE id = $3")
        .bind(amount)
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(PaymentGatewayError::MerchantNotFound(id));
    }
    Ok(())
}

/// Merchants with a bill-source credential and at least one pending order. The merchant's `active` flag is not
/// considered: orders that were accepted before a merchant was disabled can still be paid.
pub async fn fetch_pollable_merchants(conn: &mut SqliteConnection) -> Result<Vec<Merchant>, sqlx::Error> {
    let merchants = sqlx::query_as(
        r#"
        SELECT * FROM merchants m
        WHERE m.bill_credential IS NOT NULL AND m.bill_credential <> ''
          AND EXISTS (SELECT 1 FROM orders o WHERE o.merchant_id = m.id AND o.status = 'Pending')
        ORDER BY m.id
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(merchants)
}
