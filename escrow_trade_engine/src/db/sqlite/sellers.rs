use chrono::Utc;
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{Address, Seller},
};

pub async fn fetch_seller(address: &Address, conn: &mut SqliteConnection) -> Result<Option<Seller>, SqliteDatabaseError> {
    let seller = sqlx::query_as::<_, Seller>("SELECT address, registered_at FROM sellers WHERE address = $1")
        .bind(address)
        .fetch_optional(conn)
        .await?;
    Ok(seller)
}

/// Registers the address as a seller if it isn't one already. Returns the stored record either way.
pub async fn idempotent_insert(address: &Address, conn: &mut SqliteConnection) -> Result<Seller, SqliteDatabaseError> {
    sqlx::query("INSERT INTO sellers (address, registered_at) VALUES ($1, $2) ON CONFLICT (address) DO NOTHING")
        .bind(address)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    fetch_seller(address, conn).await?.ok_or_else(|| SqliteDatabaseError::NotFound(address.to_string()))
}
