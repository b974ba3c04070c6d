//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or open an atomic transaction when
//! several statements must commit together, and call through to the functions without any other changes.
//!
//! Timestamps are always bound from Rust rather than taken from SQLite's clock, so every stored time has the same
//! textual format and string comparison orders them correctly.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod callbacks;
pub mod matches;
pub mod merchants;
pub mod orders;

const SQLITE_DB_URL: &str = "sqlite://data/qiupay.db";

pub fn db_url() -> String {
    let result = env::var("QPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ QPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// Takes the row produced by a single-row write with a `RETURNING` clause.
///
/// Such writes are always run with `fetch_all`. An autocommit statement that is only stepped to its first row is not
/// committed until the connection is used again, so `fetch_one` and `fetch_optional` must not be used for them.
pub(crate) fn first_row<T>(rows: Vec<T>) -> Result<T, SqlxError> {
    rows.into_iter().next().ok_or(SqlxError::RowNotFound)
}

/// True if `e` is a UNIQUE constraint violation whose message mentions `column`.
pub(crate) fn is_unique_violation_on(e: &SqlxError, column: &str) -> bool {
    match e {
        SqlxError::Database(db) => db.is_unique_violation() && db.message().contains(column),
        _ => false,
    }
}
