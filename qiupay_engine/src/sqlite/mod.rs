//! SQLite backend for the payment confirmation engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
