use thiserror::Error;

use crate::TxId;

/// Errors that can occur when interacting with the transaction store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The transaction row does not exist.
    #[error("transaction not found: {0}")]
    TransactionNotFound(TxId),

    /// A stored value could not be interpreted (bad enum string, bad duration).
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The store configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
