//! SQLite backend for the escrow trade engine.
//!
//! Each table gets its own module of free functions that operate on a `&mut SqliteConnection`. None of those functions
//! are atomic on their own; [`SqliteDatabase`] strings them together inside transactions where atomicity matters.
mod conversations;
mod db;
mod errors;
mod messages;
mod sellers;
mod trades;

use std::{env, str::FromStr, time::Duration};

pub use db::SqliteDatabase;
pub use errors::SqliteDatabaseError;
use log::*;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

const SQLITE_DB_URL: &str = "sqlite://data/escrow_trades.db";

pub fn db_url() -> String {
    let result = env::var("ETG_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ ETG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqliteDatabaseError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true).busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
