//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// TON wallet address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Create new wallet address
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Addresses are compared case-sensitively; explorers return them verbatim
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of balance-affecting entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// External chain deposit credited to a wallet
    Deposit = 1,
    /// Outbound transfer debited from a wallet
    Withdrawal = 2,
    /// Manual operator correction
    Adjustment = 3,
}

/// Entry settlement state
///
/// Deposits and adjustments are born `Settled`. Withdrawals are born
/// `Pending` (funds reserved) and resolve to `Confirmed` or `Reversed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryState {
    /// Effective immediately (deposits, adjustments)
    Settled = 1,
    /// Funds reserved, external transfer in flight
    Pending = 2,
    /// External transfer succeeded (terminal)
    Confirmed = 3,
    /// External transfer failed or timed out, funds restored (terminal)
    Reversed = 4,
}

impl EntryState {
    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntryState::Settled | EntryState::Confirmed | EntryState::Reversed
        )
    }
}

/// Immutable record of a single balance-affecting event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub entry_id: Uuid,

    /// Telegram user the wallet belongs to
    pub user_id: i64,

    /// Wallet this entry applies to
    pub wallet_id: Uuid,

    /// Signed amount (exact decimal, negative for withdrawals)
    pub amount: Decimal,

    /// Entry kind
    pub kind: EntryKind,

    /// Settlement state
    pub state: EntryState,

    /// External transaction hash (idempotency key, unique when present)
    pub external_ref: Option<String>,

    /// Destination address (withdrawals only)
    pub destination: Option<WalletAddress>,

    /// Free-form note (adjustment reason, reversal cause)
    pub note: Option<String>,

    /// Deadline after which a pending entry is swept to `Reversed`
    pub expires_at: Option<DateTime<Utc>>,

    /// Entry creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last state transition timestamp
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Contribution of this entry to the projected balance
    ///
    /// A reversed withdrawal contributes zero: the reservation debit and
    /// its reversal cancel, keeping the projection recomputable from the
    /// log alone.
    pub fn effective_amount(&self) -> Decimal {
        if self.state == EntryState::Reversed {
            Decimal::ZERO
        } else {
            self.amount
        }
    }

    /// Apply a withdrawal resolution
    ///
    /// Only `Pending` withdrawal entries may transition; both outcomes
    /// are terminal. The amount is never touched.
    pub fn resolve(&mut self, outcome: &WithdrawalOutcome, now: DateTime<Utc>) -> crate::Result<()> {
        if self.kind != EntryKind::Withdrawal || self.state != EntryState::Pending {
            return Err(crate::Error::InvalidTransition(format!(
                "entry {} is {:?}/{:?}, expected pending withdrawal",
                self.entry_id, self.kind, self.state
            )));
        }

        match outcome {
            WithdrawalOutcome::Confirmed { external_ref } => {
                self.state = EntryState::Confirmed;
                self.external_ref = external_ref.clone();
            }
            WithdrawalOutcome::Reversed { reason } => {
                self.state = EntryState::Reversed;
                self.note = Some(reason.clone());
            }
        }

        self.expires_at = None;
        self.updated_at = now;
        Ok(())
    }
}

/// User wallet (ownership immutable after creation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique wallet ID
    pub wallet_id: Uuid,

    /// Owning Telegram user
    pub user_id: i64,

    /// TON address deposits arrive on
    pub address: WalletAddress,

    /// At most one primary wallet per user
    pub is_primary: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Projected balance for a wallet
///
/// Derived view: always recomputable as the signed sum of the wallet's
/// entries. Never the sole source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Owning user
    pub user_id: i64,

    /// Wallet
    pub wallet_id: Uuid,

    /// Current projected amount
    pub amount: Decimal,
}

/// External chain-confirmation event handed to the deposit ingestor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    /// Address the funds arrived on
    pub wallet_address: WalletAddress,

    /// Chain transaction hash (idempotency key)
    pub tx_hash: String,

    /// Deposited amount in TON
    pub amount: Decimal,

    /// Sender address, when the explorer reports one
    pub from_address: Option<WalletAddress>,
}

/// Result of ingesting a deposit event
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// New ledger entry appended, balance credited
    Credited(LedgerEntry),
    /// Entry with this tx hash already exists; no-op
    AlreadyProcessed(Uuid),
}

/// Terminal resolution of a pending withdrawal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WithdrawalOutcome {
    /// External transfer succeeded
    Confirmed {
        /// Reference returned by the transfer rail
        external_ref: Option<String>,
    },
    /// External transfer failed or timed out; reservation restored
    Reversed {
        /// Why the withdrawal was reversed
        reason: String,
    },
}
