use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use qpg_common::Money;
use sqlx::SqliteConnection;

use super::{first_row, is_unique_violation_on};
use crate::{
    db_types::{NewOrder, NotifyStatus, Order, OrderCounts, OrderStatusType, TradeNo},
    traits::PaymentGatewayError,
};

/// Inserts a new pending order using the given connection.
///
/// The storage constraints are the last line of defence for the allocator, so the different UNIQUE violations are
/// translated into distinct errors here:
/// * `(merchant_id, out_trade_no)` becomes `DuplicateOrder`,
/// * `trade_no` becomes `TradeNoCollision`,
/// * the partial index over pending `(merchant_id, amount)` becomes `AmountTaken`.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentGatewayError> {
    let result: Result<Vec<Order>, sqlx::Error> = sqlx::query_as(
        r#"
            INSERT INTO orders (
                trade_no,
                out_trade_no,
                merchant_id,
                pay_type,
                name,
                requested_amount,
                amount,
                notify_url,
                return_url,
                param,
                client_ip,
                device,
                created_at,
                updated_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *;
        "#,
    )
    .bind(&order.trade_no)
    .bind(&order.out_trade_no)
    .bind(order.merchant_id)
    .bind(&order.pay_type)
    .bind(&order.name)
    .bind(order.requested_amount)
    .bind(order.amount)
    .bind(&order.notify_url)
    .bind(&order.return_url)
    .bind(&order.param)
    .bind(&order.client_ip)
    .bind(&order.device)
    .bind(order.created_at)
    .bind(order.created_at)
    .bind(order.expires_at)
    .fetch_all(conn)
    .await;
    match result.and_then(first_row) {
        Ok(inserted) => {
            debug!("🗃️ Order [{}] inserted with id {} for {}", inserted.trade_no, inserted.id, inserted.amount);
            Ok(inserted)
        },
        Err(e) if is_unique_violation_on(&e, "out_trade_no") => Err(PaymentGatewayError::DuplicateOrder {
            merchant_id: order.merchant_id,
            out_trade_no: order.out_trade_no,
        }),
        Err(e) if is_unique_violation_on(&e, "trade_no") => Err(PaymentGatewayError::TradeNoCollision(order.trade_no)),
        Err(e) if is_unique_violation_on(&e, "amount") => Err(PaymentGatewayError::AmountTaken(order.amount)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_trade_no(
    trade_no: &TradeNo,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE trade_no = $1").bind(trade_no.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_out_trade_no(
    merchant_id: i64,
    out_trade_no: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE merchant_id = $1 AND out_trade_no = $2")
        .bind(merchant_id)
        .bind(out_trade_no)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Resulting orders are ordered by `created_at` in ascending order
pub async fn fetch_pending_orders(merchant_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE merchant_id = $1 AND status = 'Pending' ORDER BY created_at ASC, id ASC",
    )
    .bind(merchant_id)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn fetch_pending_amounts(
    merchant_id: i64,
    from: Money,
    to: Money,
    conn: &mut SqliteConnection,
) -> Result<Vec<Money>, sqlx::Error> {
    let amounts: Vec<(Money,)> = sqlx::query_as(
        r#"
        SELECT amount FROM orders
        WHERE merchant_id = $1 AND status = 'Pending' AND amount BETWEEN $2 AND $3
        ORDER BY amount
        "#,
    )
    .bind(merchant_id)
    .bind(from)
    .bind(to)
    .fetch_all(conn)
    .await?;
    Ok(amounts.into_iter().map(|(a,)| a).collect())
}

/// Counts all of the merchant's orders, and those created on the day starting at `today` and on the day before.
pub async fn count_orders(
    merchant_id: i64,
    today: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<OrderCounts, sqlx::Error> {
    let yesterday = today - Duration::days(1);
    let (total, on_day, on_day_before): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN created_at >= $1 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN created_at >= $2 AND created_at < $3 THEN 1 ELSE 0 END), 0)
        FROM orders WHERE merchant_id = $4
        "#,
    )
    .bind(today)
    .bind(yesterday)
    .bind(today)
    .bind(merchant_id)
    .fetch_one(conn)
    .await?;
    Ok(OrderCounts { total, today: on_day, yesterday: on_day_before })
}

pub async fn fetch_closed_orders_with_amount(
    merchant_id: i64,
    amount: Money,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE merchant_id = $1 AND amount = $2 AND status = $3 ORDER BY created_at ASC",
    )
    .bind(merchant_id)
    .bind(amount)
    .bind(status.to_string())
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn fetch_order_status(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderStatusType>, sqlx::Error> {
    let status: Option<(String,)> =
        sqlx::query_as("SELECT status FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(status.map(|(s,)| OrderStatusType::from(s)))
}

/// The pending → paid transition. Returns `None` if the order is no longer pending.
///
/// Starting a notification sequence is part of the same update.
pub async fn mark_paid(
    id: i64,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let orders: Vec<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET
            status = 'Paid',
            paid_at = $1,
            updated_at = $2,
            notify_status = 'Pending',
            notify_attempts = 0
        WHERE id = $3 AND status = 'Pending'
        RETURNING *;
        "#,
    )
    .bind(paid_at)
    .bind(paid_at)
    .bind(id)
    .fetch_all(conn)
    .await?;
    let order = orders.into_iter().next();
    trace!("🗃️ Pending → Paid for order {id}: {}", if order.is_some() { "committed" } else { "no-op" });
    Ok(order)
}

/// The pending → timeout / canceled transition. Returns `None` if the order is no longer pending.
pub async fn mark_closed(
    id: i64,
    status: OrderStatusType,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let orders: Vec<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET status = $1, closed_at = $2, updated_at = $3
        WHERE id = $4 AND status = 'Pending'
        RETURNING *;
        "#,
    )
    .bind(status.to_string())
    .bind(now)
    .bind(now)
    .bind(id)
    .fetch_all(conn)
    .await?;
    let order = orders.into_iter().next();
    trace!("🗃️ Pending → {status} for order {id}: {}", if order.is_some() { "committed" } else { "no-op" });
    Ok(order)
}

/// Moves every pending order that expired before `now` to `Timeout`, returning the moved orders.
pub async fn expire_orders(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"
        UPDATE orders SET status = 'Timeout', closed_at = $1, updated_at = $2
        WHERE status = 'Pending' AND expires_at < $3
        RETURNING *;
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn update_notify_status(
    id: i64,
    status: NotifyStatus,
    attempts: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET notify_status = $1, notify_attempts = $2, updated_at = $3 WHERE id = $4")
        .bind(status.to_string())
        .bind(attempts)
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
