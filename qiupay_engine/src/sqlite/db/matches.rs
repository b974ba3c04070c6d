use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::{first_row, is_unique_violation_on};
use crate::{
    db_types::MatchEvent,
    traits::{BillRecord, PaymentGatewayError},
};

/// Records that `bill` paid the order. A bill can only ever pay one order of a merchant.
pub async fn insert_match_event(
    order_id: i64,
    merchant_id: i64,
    bill: &BillRecord,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<MatchEvent, PaymentGatewayError> {
    let key = bill.key();
    let result: Result<Vec<MatchEvent>, sqlx::Error> = sqlx::query_as(
        r#"
        INSERT INTO match_events (order_id, merchant_id, bill_key, amount, counterparty, observed_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(merchant_id)
    .bind(&key)
    .bind(bill.amount)
    .bind(&bill.counterparty)
    .bind(bill.observed_at)
    .bind(now)
    .fetch_all(conn)
    .await;
    match result.and_then(first_row) {
        Ok(event) => Ok(event),
        Err(e) if is_unique_violation_on(&e, "bill_key") => Err(PaymentGatewayError::BillAlreadyConsumed(key)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_match_event(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<MatchEvent>, sqlx::Error> {
    let event =
        sqlx::query_as("SELECT * FROM match_events WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(event)
}

pub async fn fetch_consumed_bill_keys(
    merchant_id: i64,
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<String>, sqlx::Error> {
    let keys: Vec<(String,)> =
        sqlx::query_as("SELECT bill_key FROM match_events WHERE merchant_id = $1 AND observed_at >= $2")
            .bind(merchant_id)
            .bind(since)
            .fetch_all(conn)
            .await?;
    Ok(keys.into_iter().map(|(k,)| k).collect())
}
