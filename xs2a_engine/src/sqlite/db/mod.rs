//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, written as plain functions that accept a `&mut SqliteConnection`. Callers take a
//! connection from the pool, or open a transaction and pass `&mut *tx`, without any other change to the call.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod authorisations;

const SQLITE_DB_URL: &str = "sqlite://data/xs2a_store.db";

pub fn db_url() -> String {
    let result = env::var("XS2A_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ XS2A_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
