//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task owns every balance-affecting write
//! - The duplicate-ref check-and-insert and the funds check-and-reserve
//!   run inside the actor, so they cannot interleave with another writer
//! - Async message passing with backpressure (bounded mailbox)
//!
//! Reads are also routed through the mailbox, which gives callers
//! read-your-writes ordering against anything they appended earlier.

use crate::types::{
    Balance, DepositEvent, EntryKind, EntryState, IngestOutcome, LedgerEntry, Wallet,
    WithdrawalOutcome,
};
use crate::{Error, Result, Storage};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Register a wallet
    RegisterWallet {
        /// Wallet to register
        wallet: Wallet,
        /// Reply channel
        response: oneshot::Sender<Result<Wallet>>,
    },

    /// Ingest an external deposit event (idempotent on tx hash)
    IngestDeposit {
        /// Chain confirmation event
        event: DepositEvent,
        /// Reply channel
        response: oneshot::Sender<Result<IngestOutcome>>,
    },

    /// Reserve funds for a withdrawal (pending entry)
    ReserveWithdrawal {
        /// Requesting user
        user_id: i64,
        /// Positive amount to withdraw
        amount: Decimal,
        /// Destination address
        destination: crate::types::WalletAddress,
        /// Reply channel
        response: oneshot::Sender<Result<LedgerEntry>>,
    },

    /// Resolve a pending withdrawal to a terminal state
    ResolveWithdrawal {
        /// Pending entry
        entry_id: Uuid,
        /// Confirmed or reversed
        outcome: WithdrawalOutcome,
        /// Reply channel
        response: oneshot::Sender<Result<LedgerEntry>>,
    },

    /// Append a settled manual adjustment
    PostAdjustment {
        /// Owning user (checked against the wallet)
        user_id: i64,
        /// Wallet to adjust
        wallet_id: Uuid,
        /// Signed correction amount
        amount: Decimal,
        /// Operator note
        note: String,
        /// Reply channel
        response: oneshot::Sender<Result<LedgerEntry>>,
    },

    /// Get projected balance
    GetBalance {
        /// Wallet
        wallet_id: Uuid,
        /// Reply channel
        response: oneshot::Sender<Result<Balance>>,
    },

    /// Get wallet by ID
    GetWallet {
        /// Wallet
        wallet_id: Uuid,
        /// Reply channel
        response: oneshot::Sender<Result<Wallet>>,
    },

    /// List wallets for a user
    GetWalletsForUser {
        /// User
        user_id: i64,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<Wallet>>>,
    },

    /// Get ledger entries for a wallet
    GetWalletEntries {
        /// Wallet
        wallet_id: Uuid,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<LedgerEntry>>>,
    },

    /// Reverse every pending withdrawal past its deadline
    ExpirePending {
        /// Sweep reference time
        now: chrono::DateTime<Utc>,
        /// Reply channel
        response: oneshot::Sender<Result<Vec<Uuid>>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// How long a withdrawal may stay pending
    pending_timeout: Duration,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        pending_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            mailbox,
            pending_timeout,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown => break,
                _ => self.handle_message(msg),
            }
        }
    }

    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::RegisterWallet { wallet, response } => {
                let _ = response.send(self.register_wallet(wallet));
            }

            LedgerMessage::IngestDeposit { event, response } => {
                let _ = response.send(self.ingest_deposit(event));
            }

            LedgerMessage::ReserveWithdrawal {
                user_id,
                amount,
                destination,
                response,
            } => {
                let _ = response.send(self.reserve_withdrawal(user_id, amount, destination));
            }

            LedgerMessage::ResolveWithdrawal {
                entry_id,
                outcome,
                response,
            } => {
                let _ = response.send(self.resolve_withdrawal(entry_id, &outcome));
            }

            LedgerMessage::PostAdjustment {
                user_id,
                wallet_id,
                amount,
                note,
                response,
            } => {
                let _ = response.send(self.post_adjustment(user_id, wallet_id, amount, note));
            }

            LedgerMessage::GetBalance { wallet_id, response } => {
                let _ = response.send(self.get_balance(wallet_id));
            }

            LedgerMessage::GetWallet { wallet_id, response } => {
                let _ = response.send(self.storage.get_wallet(wallet_id));
            }

            LedgerMessage::GetWalletsForUser { user_id, response } => {
                let _ = response.send(self.storage.wallets_for_user(user_id));
            }

            LedgerMessage::GetWalletEntries { wallet_id, response } => {
                let _ = response.send(self.storage.wallet_entries(wallet_id));
            }

            LedgerMessage::ExpirePending { now, response } => {
                let _ = response.send(self.expire_pending(now));
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    fn register_wallet(&self, wallet: Wallet) -> Result<Wallet> {
        if self.storage.wallet_id_by_address(&wallet.address)?.is_some() {
            return Err(Error::DuplicateAddress(wallet.address.to_string()));
        }

        if wallet.is_primary {
            let existing = self.storage.wallets_for_user(wallet.user_id)?;
            if existing.iter().any(|w| w.is_primary) {
                return Err(Error::PrimaryWalletExists(wallet.user_id));
            }
        }

        self.storage.put_wallet(&wallet)?;
        Ok(wallet)
    }

    fn ingest_deposit(&self, event: DepositEvent) -> Result<IngestOutcome> {
        // Idempotency: serialized with the insert below by the single writer
        if let Some(entry_id) = self.storage.entry_id_by_ref(&event.tx_hash)? {
            tracing::debug!(tx_hash = %event.tx_hash, "Duplicate deposit ignored");
            return Ok(IngestOutcome::AlreadyProcessed(entry_id));
        }

        let wallet_id = self
            .storage
            .wallet_id_by_address(&event.wallet_address)?
            .ok_or_else(|| Error::UnknownWallet(event.wallet_address.to_string()))?;
        let wallet = self.storage.get_wallet(wallet_id)?;

        let now = Utc::now();
        let entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            user_id: wallet.user_id,
            wallet_id,
            amount: event.amount,
            kind: EntryKind::Deposit,
            state: EntryState::Settled,
            external_ref: Some(event.tx_hash.clone()),
            destination: None,
            note: event.from_address.map(|a| format!("from {}", a)),
            expires_at: None,
            created_at: now,
            updated_at: now,
        };

        let balance = self.shifted_balance(&wallet, entry.amount)?;
        self.storage.append_entry_atomic(&entry, &balance)?;

        tracing::info!(
            tx_hash = %event.tx_hash,
            wallet_id = %wallet_id,
            amount = %event.amount,
            "Deposit credited"
        );

        Ok(IngestOutcome::Credited(entry))
    }

    fn reserve_withdrawal(
        &self,
        user_id: i64,
        amount: Decimal,
        destination: crate::types::WalletAddress,
    ) -> Result<LedgerEntry> {
        let wallets = self.storage.wallets_for_user(user_id)?;
        let wallet = wallets
            .into_iter()
            .find(|w| w.is_primary)
            .ok_or_else(|| Error::WalletNotFound(format!("no primary wallet for user {}", user_id)))?;

        let available = self
            .storage
            .get_balance(wallet.wallet_id)?
            .map(|b| b.amount)
            .unwrap_or(Decimal::ZERO);

        if available < amount {
            return Err(Error::InsufficientFunds {
                required: amount,
                available,
            });
        }

        let now = Utc::now();
        let entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            user_id,
            wallet_id: wallet.wallet_id,
            amount: -amount,
            kind: EntryKind::Withdrawal,
            state: EntryState::Pending,
            external_ref: None,
            destination: Some(destination),
            note: None,
            expires_at: Some(now + chrono::Duration::from_std(self.pending_timeout).unwrap_or_else(|_| chrono::Duration::seconds(300))),
            created_at: now,
            updated_at: now,
        };

        let balance = self.shifted_balance(&wallet, entry.amount)?;
        self.storage.append_entry_atomic(&entry, &balance)?;

        tracing::info!(
            entry_id = %entry.entry_id,
            user_id,
            amount = %amount,
            "Withdrawal reserved"
        );

        Ok(entry)
    }

    fn resolve_withdrawal(&self, entry_id: Uuid, outcome: &WithdrawalOutcome) -> Result<LedgerEntry> {
        let mut entry = self.storage.get_entry(entry_id)?;
        let old_deadline = entry.expires_at;

        // external_ref is unique across all entries; a confirmation ref that
        // collides with an existing one must not overwrite its index row
        if let WithdrawalOutcome::Confirmed {
            external_ref: Some(external_ref),
        } = outcome
        {
            if let Some(existing) = self.storage.entry_id_by_ref(external_ref)? {
                if existing != entry_id {
                    return Err(Error::InvalidEntry(format!(
                        "external ref {} already recorded by entry {}",
                        external_ref, existing
                    )));
                }
            }
        }

        entry.resolve(outcome, Utc::now())?;

        let wallet = self.storage.get_wallet(entry.wallet_id)?;
        let balance = match entry.state {
            // Reversal restores the reservation debit exactly
            EntryState::Reversed => self.shifted_balance(&wallet, -entry.amount)?,
            _ => self.shifted_balance(&wallet, Decimal::ZERO)?,
        };

        self.storage.resolve_entry_atomic(&entry, &balance, old_deadline)?;

        tracing::info!(
            entry_id = %entry.entry_id,
            state = ?entry.state,
            "Withdrawal resolved"
        );

        Ok(entry)
    }

    fn post_adjustment(
        &self,
        user_id: i64,
        wallet_id: Uuid,
        amount: Decimal,
        note: String,
    ) -> Result<LedgerEntry> {
        let wallet = self.storage.get_wallet(wallet_id)?;
        if wallet.user_id != user_id {
            return Err(Error::InvalidEntry(format!(
                "wallet {} does not belong to user {}",
                wallet_id, user_id
            )));
        }

        let now = Utc::now();
        let entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            user_id,
            wallet_id,
            amount,
            kind: EntryKind::Adjustment,
            state: EntryState::Settled,
            external_ref: None,
            destination: None,
            note: Some(note),
            expires_at: None,
            created_at: now,
            updated_at: now,
        };

        let balance = self.shifted_balance(&wallet, amount)?;
        self.storage.append_entry_atomic(&entry, &balance)?;

        Ok(entry)
    }

    fn get_balance(&self, wallet_id: Uuid) -> Result<Balance> {
        // Missing projection row only happens for unknown wallets
        match self.storage.get_balance(wallet_id)? {
            Some(balance) => Ok(balance),
            None => {
                let wallet = self.storage.get_wallet(wallet_id)?;
                Ok(Balance {
                    user_id: wallet.user_id,
                    wallet_id,
                    amount: Decimal::ZERO,
                })
            }
        }
    }

    fn expire_pending(&self, now: chrono::DateTime<Utc>) -> Result<Vec<Uuid>> {
        let due = self.storage.pending_due(now)?;
        let mut reversed = Vec::with_capacity(due.len());

        for entry_id in due {
            match self.resolve_withdrawal(
                entry_id,
                &WithdrawalOutcome::Reversed {
                    reason: "pending withdrawal expired".to_string(),
                },
            ) {
                Ok(_) => reversed.push(entry_id),
                // A concurrent resolution can win the race with the sweep
                Err(Error::InvalidTransition(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if !reversed.is_empty() {
            tracing::warn!(count = reversed.len(), "Expired stale pending withdrawals");
        }

        Ok(reversed)
    }

    fn shifted_balance(&self, wallet: &Wallet, delta: Decimal) -> Result<Balance> {
        let current = self
            .storage
            .get_balance(wallet.wallet_id)?
            .map(|b| b.amount)
            .unwrap_or(Decimal::ZERO);

        Ok(Balance {
            user_id: wallet.user_id,
            wallet_id: wallet.wallet_id,
            amount: current + delta,
        })
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl std::fmt::Debug for LedgerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerHandle").finish_non_exhaustive()
    }
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Register a wallet
    pub async fn register_wallet(&self, wallet: Wallet) -> Result<Wallet> {
        self.request(|response| LedgerMessage::RegisterWallet { wallet, response })
            .await
    }

    /// Ingest a deposit event
    pub async fn ingest_deposit(&self, event: DepositEvent) -> Result<IngestOutcome> {
        self.request(|response| LedgerMessage::IngestDeposit { event, response })
            .await
    }

    /// Reserve a withdrawal
    pub async fn reserve_withdrawal(
        &self,
        user_id: i64,
        amount: Decimal,
        destination: crate::types::WalletAddress,
    ) -> Result<LedgerEntry> {
        self.request(|response| LedgerMessage::ReserveWithdrawal {
            user_id,
            amount,
            destination,
            response,
        })
        .await
    }

    /// Resolve a pending withdrawal
    pub async fn resolve_withdrawal(
        &self,
        entry_id: Uuid,
        outcome: WithdrawalOutcome,
    ) -> Result<LedgerEntry> {
        self.request(|response| LedgerMessage::ResolveWithdrawal {
            entry_id,
            outcome,
            response,
        })
        .await
    }

    /// Post a manual adjustment
    pub async fn post_adjustment(
        &self,
        user_id: i64,
        wallet_id: Uuid,
        amount: Decimal,
        note: String,
    ) -> Result<LedgerEntry> {
        self.request(|response| LedgerMessage::PostAdjustment {
            user_id,
            wallet_id,
            amount,
            note,
            response,
        })
        .await
    }

    /// Get projected balance
    pub async fn get_balance(&self, wallet_id: Uuid) -> Result<Balance> {
        self.request(|response| LedgerMessage::GetBalance { wallet_id, response })
            .await
    }

    /// Get wallet by ID
    pub async fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet> {
        self.request(|response| LedgerMessage::GetWallet { wallet_id, response })
            .await
    }

    /// List wallets for a user
    pub async fn wallets_for_user(&self, user_id: i64) -> Result<Vec<Wallet>> {
        self.request(|response| LedgerMessage::GetWalletsForUser { user_id, response })
            .await
    }

    /// Get ledger entries for a wallet
    pub async fn wallet_entries(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.request(|response| LedgerMessage::GetWalletEntries { wallet_id, response })
            .await
    }

    /// Reverse pending withdrawals past their deadline
    pub async fn expire_pending(&self, now: chrono::DateTime<Utc>) -> Result<Vec<Uuid>> {
        self.request(|response| LedgerMessage::ExpirePending { now, response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    mailbox_capacity: usize,
    pending_timeout: Duration,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx, pending_timeout);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
