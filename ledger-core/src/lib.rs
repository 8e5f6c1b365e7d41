//! GiftRail Ledger Core
//!
//! Append-only balance ledger for TON deposits and withdrawals.
//!
//! # Architecture
//!
//! - **Event Sourcing**: Every balance change is an immutable ledger entry
//! - **Single Writer**: One logical writer task serializes the idempotency
//!   check-and-insert and the funds check-and-reserve
//! - **Projection**: Per-wallet balances are maintained in the same atomic
//!   batch as the entry append and are always recomputable from the log
//!
//! # Invariants
//!
//! - `Balance(wallet) == Σ entry.effective_amount()` at every observable instant
//! - `external_ref`, when present, is unique across all entries
//! - Withdrawals move `Pending → {Confirmed, Reversed}`, terminal states only
//! - Entries are never modified or deleted (the withdrawal state transition
//!   is the single exception, and it never touches the amount)

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod retry;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use retry::{RetryConfig, RetryPolicy};
pub use storage::Storage;
pub use types::{
    Balance, DepositEvent, EntryKind, EntryState, IngestOutcome, LedgerEntry, Wallet,
    WalletAddress, WithdrawalOutcome,
};
