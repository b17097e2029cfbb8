use dgov_token::OracleError;
use thiserror::Error;

/// Failures surfaced by a governance storage backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A write would overwrite an append-only record (an event sequence).
    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("record encoding error: {0}")]
    Serialization(String),

    /// Persisted state contradicts itself; the ledger refuses to open.
    #[error("governance store is corrupted: {0}")]
    Corruption(String),

    /// The token move staged into a batch was refused by the balance tables.
    #[error("staged escrow rejected: {0}")]
    Escrow(OracleError),
}
