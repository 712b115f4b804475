use thiserror::Error;

use crate::db::traits::StorageError;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Could not run migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Duplicate record: {0}")]
    Duplicate(String),
    #[error("The trade is no longer in the expected status: {0}")]
    StaleUpdate(String),
}

impl From<SqliteDatabaseError> for StorageError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::NotFound(s) => StorageError::NotFound(s),
            SqliteDatabaseError::Duplicate(s) => StorageError::Duplicate(s),
            SqliteDatabaseError::StaleUpdate(s) => StorageError::StaleUpdate(s),
            SqliteDatabaseError::DriverError(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                StorageError::Duplicate(db.to_string())
            },
            e => StorageError::DatabaseError(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        SqliteDatabaseError::from(e).into()
    }
}
