//! Main ledger orchestration layer
//!
//! This module ties together storage, the single-writer actor and metrics
//! into a high-level API for balance-affecting operations.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     // let outcome = ledger.ingest_deposit(event).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    types::{
        Balance, DepositEvent, IngestOutcome, LedgerEntry, Wallet, WalletAddress,
        WithdrawalOutcome,
    },
    Config, Error, Result, Storage,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Main ledger interface
pub struct Ledger {
    /// Actor handle for serialized operations
    handle: LedgerHandle,

    /// Direct storage access (audit reads)
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);

        let handle = spawn_ledger_actor(
            storage.clone(),
            config.mailbox_capacity,
            config.pending_timeout(),
        );

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    /// Metrics collector (for the gateway's /metrics endpoint)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Register a new wallet for a user
    ///
    /// Rejects a duplicate address and a second primary wallet.
    pub async fn register_wallet(
        &self,
        user_id: i64,
        address: WalletAddress,
        is_primary: bool,
    ) -> Result<Wallet> {
        if address.is_empty() {
            return Err(Error::InvalidEntry("wallet address is empty".to_string()));
        }

        let wallet = Wallet {
            wallet_id: Uuid::new_v4(),
            user_id,
            address,
            is_primary,
            created_at: Utc::now(),
        };

        self.handle.register_wallet(wallet).await
    }

    /// Ingest an external deposit event, exactly once per tx hash
    ///
    /// A duplicate hash is a no-op reported as `AlreadyProcessed`.
    pub async fn ingest_deposit(&self, event: DepositEvent) -> Result<IngestOutcome> {
        if event.tx_hash.is_empty() {
            return Err(Error::InvalidEntry("tx_hash is empty".to_string()));
        }
        if event.amount <= Decimal::ZERO {
            return Err(Error::InvalidEntry("deposit amount must be positive".to_string()));
        }

        let timer = self.metrics.append_duration.start_timer();
        let outcome = self.handle.ingest_deposit(event).await?;
        timer.observe_duration();

        match &outcome {
            IngestOutcome::Credited(_) => self.metrics.deposits_total.inc(),
            IngestOutcome::AlreadyProcessed(_) => self.metrics.duplicate_deposits_total.inc(),
        }

        Ok(outcome)
    }

    /// Reserve funds for a withdrawal
    ///
    /// The balance check and the pending debit run as one serialized step,
    /// so two concurrent requests cannot both pass on the same funds.
    pub async fn reserve_withdrawal(
        &self,
        user_id: i64,
        amount: Decimal,
        destination: WalletAddress,
    ) -> Result<LedgerEntry> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidEntry(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        if destination.is_empty() {
            return Err(Error::InvalidEntry("destination address is empty".to_string()));
        }

        let timer = self.metrics.append_duration.start_timer();
        let entry = self
            .handle
            .reserve_withdrawal(user_id, amount, destination)
            .await?;
        timer.observe_duration();

        self.metrics.withdrawals_reserved_total.inc();
        Ok(entry)
    }

    /// Resolve a pending withdrawal to a terminal state
    pub async fn resolve_withdrawal(
        &self,
        entry_id: Uuid,
        outcome: WithdrawalOutcome,
    ) -> Result<LedgerEntry> {
        let entry = self.handle.resolve_withdrawal(entry_id, outcome).await?;

        match entry.state {
            crate::types::EntryState::Confirmed => self.metrics.withdrawals_confirmed_total.inc(),
            crate::types::EntryState::Reversed => self.metrics.withdrawals_reversed_total.inc(),
            _ => {}
        }

        Ok(entry)
    }

    /// Post a settled manual adjustment
    pub async fn post_adjustment(
        &self,
        user_id: i64,
        wallet_id: Uuid,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Result<LedgerEntry> {
        if amount == Decimal::ZERO {
            return Err(Error::InvalidEntry("adjustment amount must be non-zero".to_string()));
        }

        self.handle
            .post_adjustment(user_id, wallet_id, amount, note.into())
            .await
    }

    /// Get projected balance, consistent with the ledger sum at read time
    pub async fn get_balance(&self, wallet_id: Uuid) -> Result<Balance> {
        self.metrics.balance_reads_total.inc();
        self.handle.get_balance(wallet_id).await
    }

    /// Get wallet by ID
    pub async fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet> {
        self.handle.get_wallet(wallet_id).await
    }

    /// List wallets for a user
    pub async fn wallets_for_user(&self, user_id: i64) -> Result<Vec<Wallet>> {
        self.handle.wallets_for_user(user_id).await
    }

    /// Ledger entries for a wallet, append order
    pub async fn wallet_entries(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>> {
        self.handle.wallet_entries(wallet_id).await
    }

    /// Reconciliation sweep: reverse every pending withdrawal past its deadline
    pub async fn expire_stale_pending(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let reversed = self.handle.expire_pending(now).await?;

        if !reversed.is_empty() {
            self.metrics
                .sweep_reversals_total
                .inc_by(reversed.len() as u64);
            self.metrics
                .withdrawals_reversed_total
                .inc_by(reversed.len() as u64);
        }

        Ok(reversed)
    }

    /// Recompute a wallet balance from its entries (audit path)
    pub fn rebuild_balance(&self, wallet_id: Uuid) -> Result<Decimal> {
        self.storage.recompute_balance(wallet_id)
    }

    /// Check the projection invariant for a wallet
    ///
    /// `Balance(wallet) == Σ entry.effective_amount()` must hold at every
    /// observable instant; call after quiescing writes for an exact check.
    pub async fn verify_projection(&self, wallet_id: Uuid) -> Result<bool> {
        let projected = self.get_balance(wallet_id).await?.amount;
        let recomputed = self.rebuild_balance(wallet_id)?;
        Ok(projected == recomputed)
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<crate::storage::StorageStats> {
        self.storage.get_stats()
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryState;

    async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        (Ledger::open(config).await.unwrap(), temp_dir)
    }

    fn deposit(address: &str, tx_hash: &str, amount: Decimal) -> DepositEvent {
        DepositEvent {
            wallet_address: WalletAddress::new(address),
            tx_hash: tx_hash.to_string(),
            amount,
            from_address: Some(WalletAddress::new("EQsender")),
        }
    }

    #[tokio::test]
    async fn test_deposit_idempotency() {
        let (ledger, _temp) = create_test_ledger().await;
        let wallet = ledger
            .register_wallet(1, WalletAddress::new("EQw"), true)
            .await
            .unwrap();

        let ten = Decimal::from(10);
        let first = ledger.ingest_deposit(deposit("EQw", "abc", ten)).await.unwrap();
        assert!(matches!(first, IngestOutcome::Credited(_)));

        let second = ledger.ingest_deposit(deposit("EQw", "abc", ten)).await.unwrap();
        assert!(matches!(second, IngestOutcome::AlreadyProcessed(_)));

        let balance = ledger.get_balance(wallet.wallet_id).await.unwrap();
        assert_eq!(balance.amount, ten);

        let entries = ledger.wallet_entries(wallet.wallet_id).await.unwrap();
        assert_eq!(entries.len(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_withdrawal_insufficient_funds() {
        let (ledger, _temp) = create_test_ledger().await;
        let wallet = ledger
            .register_wallet(1, WalletAddress::new("EQw"), true)
            .await
            .unwrap();

        ledger
            .ingest_deposit(deposit("EQw", "abc", Decimal::from(5)))
            .await
            .unwrap();

        let result = ledger
            .reserve_withdrawal(1, Decimal::from(6), WalletAddress::new("EQdest"))
            .await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        // Failed request leaves no entry behind
        let entries = ledger.wallet_entries(wallet.wallet_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            ledger.get_balance(wallet.wallet_id).await.unwrap().amount,
            Decimal::from(5)
        );

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_withdrawal_confirm_then_insufficient() {
        let (ledger, _temp) = create_test_ledger().await;
        let wallet = ledger
            .register_wallet(1, WalletAddress::new("EQw"), true)
            .await
            .unwrap();

        ledger
            .ingest_deposit(deposit("EQw", "abc", Decimal::from(5)))
            .await
            .unwrap();

        let entry = ledger
            .reserve_withdrawal(1, Decimal::from(5), WalletAddress::new("EQdest"))
            .await
            .unwrap();
        assert_eq!(entry.state, EntryState::Pending);

        let confirmed = ledger
            .resolve_withdrawal(
                entry.entry_id,
                WithdrawalOutcome::Confirmed {
                    external_ref: Some("transfer-9".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(confirmed.state, EntryState::Confirmed);
        assert_eq!(
            ledger.get_balance(wallet.wallet_id).await.unwrap().amount,
            Decimal::ZERO
        );

        let result = ledger
            .reserve_withdrawal(1, Decimal::ONE, WalletAddress::new("EQdest"))
            .await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert_eq!(
            ledger.get_balance(wallet.wallet_id).await.unwrap().amount,
            Decimal::ZERO
        );

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reversal_restores_balance_exactly() {
        let (ledger, _temp) = create_test_ledger().await;
        let wallet = ledger
            .register_wallet(1, WalletAddress::new("EQw"), true)
            .await
            .unwrap();

        ledger
            .ingest_deposit(deposit("EQw", "abc", Decimal::from(10)))
            .await
            .unwrap();

        let entry = ledger
            .reserve_withdrawal(1, Decimal::from(7), WalletAddress::new("EQdest"))
            .await
            .unwrap();
        assert_eq!(
            ledger.get_balance(wallet.wallet_id).await.unwrap().amount,
            Decimal::from(3)
        );

        ledger
            .resolve_withdrawal(
                entry.entry_id,
                WithdrawalOutcome::Reversed {
                    reason: "transfer timed out".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            ledger.get_balance(wallet.wallet_id).await.unwrap().amount,
            Decimal::from(10)
        );
        assert!(ledger.verify_projection(wallet.wallet_id).await.unwrap());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_expire_stale_pending() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.pending_timeout_secs = 0; // Everything is stale immediately
        let ledger = Ledger::open(config).await.unwrap();

        let wallet = ledger
            .register_wallet(1, WalletAddress::new("EQw"), true)
            .await
            .unwrap();
        ledger
            .ingest_deposit(deposit("EQw", "abc", Decimal::from(10)))
            .await
            .unwrap();

        let entry = ledger
            .reserve_withdrawal(1, Decimal::from(4), WalletAddress::new("EQdest"))
            .await
            .unwrap();

        let reversed = ledger
            .expire_stale_pending(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(reversed, vec![entry.entry_id]);

        assert_eq!(
            ledger.get_balance(wallet.wallet_id).await.unwrap().amount,
            Decimal::from(10)
        );

        // Sweep is idempotent
        let again = ledger
            .expire_stale_pending(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert!(again.is_empty());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_confirmation_ref_collision_rejected() {
        let (ledger, _temp) = create_test_ledger().await;
        let wallet = ledger
            .register_wallet(1, WalletAddress::new("EQw"), true)
            .await
            .unwrap();

        ledger
            .ingest_deposit(deposit("EQw", "abc", Decimal::from(10)))
            .await
            .unwrap();

        let entry = ledger
            .reserve_withdrawal(1, Decimal::from(4), WalletAddress::new("EQdest"))
            .await
            .unwrap();

        // The deposit already owns ref "abc"; confirming with it must fail
        // and leave the withdrawal pending
        let collision = ledger
            .resolve_withdrawal(
                entry.entry_id,
                WithdrawalOutcome::Confirmed {
                    external_ref: Some("abc".to_string()),
                },
            )
            .await;
        assert!(matches!(collision, Err(Error::InvalidEntry(_))));

        let entries = ledger.wallet_entries(wallet.wallet_id).await.unwrap();
        let pending = entries
            .iter()
            .find(|e| e.entry_id == entry.entry_id)
            .unwrap();
        assert_eq!(pending.state, EntryState::Pending);

        // A fresh reference goes through
        let confirmed = ledger
            .resolve_withdrawal(
                entry.entry_id,
                WithdrawalOutcome::Confirmed {
                    external_ref: Some("transfer-1".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(confirmed.state, EntryState::Confirmed);
        assert!(ledger.verify_projection(wallet.wallet_id).await.unwrap());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_adjustment_requires_owner() {
        let (ledger, _temp) = create_test_ledger().await;
        let wallet = ledger
            .register_wallet(1, WalletAddress::new("EQw"), true)
            .await
            .unwrap();

        let result = ledger
            .post_adjustment(2, wallet.wallet_id, Decimal::ONE, "oops")
            .await;
        assert!(matches!(result, Err(Error::InvalidEntry(_))));

        ledger
            .post_adjustment(1, wallet.wallet_id, Decimal::from(3), "goodwill credit")
            .await
            .unwrap();
        assert_eq!(
            ledger.get_balance(wallet.wallet_id).await.unwrap().amount,
            Decimal::from(3)
        );

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_invalid_inputs() {
        let (ledger, _temp) = create_test_ledger().await;

        let bad_amount = ledger
            .ingest_deposit(deposit("EQw", "abc", Decimal::ZERO))
            .await;
        assert!(matches!(bad_amount, Err(Error::InvalidEntry(_))));

        let bad_hash = ledger
            .ingest_deposit(DepositEvent {
                wallet_address: WalletAddress::new("EQw"),
                tx_hash: String::new(),
                amount: Decimal::ONE,
                from_address: None,
            })
            .await;
        assert!(matches!(bad_hash, Err(Error::InvalidEntry(_))));

        let bad_withdrawal = ledger
            .reserve_withdrawal(1, Decimal::from(-1), WalletAddress::new("EQdest"))
            .await;
        assert!(matches!(bad_withdrawal, Err(Error::InvalidEntry(_))));

        ledger.shutdown().await.unwrap();
    }
}
