//! Error types for wote

use thiserror::Error;

/// Main error type for wote operations
#[derive(Error, Debug)]
pub enum WoteError {
    /// Malformed private key or shared secret material
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Malformed or unrecognized event payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// Connectivity, subscription or publish failure from the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using WoteError
pub type WoteResult<T> = Result<T, WoteError>;
