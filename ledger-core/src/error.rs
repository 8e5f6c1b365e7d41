//! Error types for the ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// No wallet registered for a deposit address
    #[error("Unknown wallet address: {0}")]
    UnknownWallet(String),

    /// Wallet not found by ID or user
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Address already registered to a wallet
    #[error("Address already registered: {0}")]
    DuplicateAddress(String),

    /// User already has a primary wallet
    #[error("User {0} already has a primary wallet")]
    PrimaryWalletExists(i64),

    /// Projected balance below the requested amount
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Requested amount
        required: rust_decimal::Decimal,
        /// Projected balance at time of check
        available: rust_decimal::Decimal,
    },

    /// Invalid entry (non-positive amount, wrong owner, etc.)
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Illegal withdrawal state transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
