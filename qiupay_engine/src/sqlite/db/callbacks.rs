use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use super::first_row;
use crate::{
    db_types::{CallbackAttempt, CallbackJob, CallbackJobState, NewCallbackAttempt},
    traits::CallbackJobUpdate,
};

/// Queues the first attempt of a delivery sequence for the order.
///
/// The first call creates the job at generation 1. Later calls start a new generation: the attempt counter is reset,
/// and any attempt still in flight for the old generation can no longer touch the job.
pub async fn upsert_job(
    order_id: i64,
    due_at: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CallbackJob, sqlx::Error> {
    let jobs: Vec<CallbackJob> = sqlx::query_as(
        r#"
        INSERT INTO callback_jobs (order_id, generation, attempts_made, state, next_attempt_at, created_at, updated_at)
        VALUES ($1, 1, 0, 'Queued', $2, $3, $4)
        ON CONFLICT (order_id) DO UPDATE SET
            generation = callback_jobs.generation + 1,
            attempts_made = 0,
            state = 'Queued',
            next_attempt_at = excluded.next_attempt_at,
            updated_at = excluded.updated_at
        RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(due_at)
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await?;
    let job = first_row(jobs)?;
    trace!("🗃️ Callback job for order {order_id} queued at generation {}", job.generation);
    Ok(job)
}

pub async fn fetch_job(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<CallbackJob>, sqlx::Error> {
    let job =
        sqlx::query_as("SELECT * FROM callback_jobs WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(job)
}

pub async fn fetch_due_jobs(
    now: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<CallbackJob>, sqlx::Error> {
    let jobs = sqlx::query_as(
        r#"
        SELECT * FROM callback_jobs
        WHERE state = 'Queued' AND next_attempt_at <= $1
        ORDER BY next_attempt_at ASC, id ASC
        LIMIT $2
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(jobs)
}

pub async fn claim_job(
    job: &CallbackJob,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CallbackJob>, sqlx::Error> {
    let claimed: Vec<CallbackJob> = sqlx::query_as(
        r#"
        UPDATE callback_jobs SET state = 'InFlight', updated_at = $1
        WHERE id = $2 AND generation = $3 AND state = 'Queued'
        RETURNING *;
        "#,
    )
    .bind(now)
    .bind(job.id)
    .bind(job.generation)
    .fetch_all(conn)
    .await?;
    Ok(claimed.into_iter().next())
}

/// Appends an attempt to the order's callback log. `seq` continues the order's log across generations.
pub async fn insert_attempt(
    attempt: NewCallbackAttempt,
    conn: &mut SqliteConnection,
) -> Result<CallbackAttempt, sqlx::Error> {
    let rows: Vec<CallbackAttempt> = sqlx::query_as(
        r#"
        INSERT INTO callback_attempts
            (order_id, seq, generation, attempt, url, http_status, response_body, success, created_at)
        SELECT $1, COALESCE(MAX(seq), 0) + 1, $2, $3, $4, $5, $6, $7, $8
        FROM callback_attempts WHERE order_id = $9
        RETURNING *;
        "#,
    )
    .bind(attempt.order_id)
    .bind(attempt.generation)
    .bind(attempt.attempt)
    .bind(attempt.url)
    .bind(attempt.http_status)
    .bind(attempt.response_body)
    .bind(attempt.success)
    .bind(attempt.created_at)
    .bind(attempt.order_id)
    .fetch_all(conn)
    .await?;
    first_row(rows)
}

/// Applies the outcome of an attempt to the job, if the job is still in flight at the same generation. Returns `None`
/// if the job has been superseded.
pub async fn advance_job(
    job: &CallbackJob,
    update: CallbackJobUpdate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<CallbackJob>, sqlx::Error> {
    let (state, next_attempt_at) = match update {
        CallbackJobUpdate::Delivered => (CallbackJobState::Delivered, None),
        CallbackJobUpdate::Failed => (CallbackJobState::Failed, None),
        CallbackJobUpdate::RetryAt(at) => (CallbackJobState::Queued, Some(at)),
    };
    let advanced: Vec<CallbackJob> = sqlx::query_as(
        r#"
        UPDATE callback_jobs SET
            attempts_made = attempts_made + 1,
            state = $1,
            next_attempt_at = COALESCE($2, next_attempt_at),
            updated_at = $3
        WHERE id = $4 AND generation = $5 AND state = 'InFlight'
        RETURNING *;
        "#,
    )
    .bind(state.to_string())
    .bind(next_attempt_at)
    .bind(now)
    .bind(job.id)
    .bind(job.generation)
    .fetch_all(conn)
    .await?;
    Ok(advanced.into_iter().next())
}

pub async fn requeue_in_flight(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE callback_jobs SET state = 'Queued', updated_at = $1 WHERE state = 'InFlight'")
        .bind(now)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_attempts(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CallbackAttempt>, sqlx::Error> {
    let attempts = sqlx::query_as("SELECT * FROM callback_attempts WHERE order_id = $1 ORDER BY seq ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(attempts)
}
