//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `entries` - Append-only ledger entries (key: entry_id)
//! - `wallets` - Registered wallets (key: wallet_id)
//! - `balances` - Projected balances (key: wallet_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! # Indices
//!
//! - `ref|<tx_hash>` -> entry_id: external-ref uniqueness (idempotency key)
//! - `we|<wallet_id><entry_id>` -> (): per-wallet entry scan (UUIDv7 keys
//!   keep the scan in append order)
//! - `addr|<address>` -> wallet_id: deposit address resolution
//! - `uw|<user_id_be><wallet_id>` -> (): wallet listing per user
//! - `pend|<deadline_be><entry_id>` -> (): stale-pending sweep, ordered by
//!   deadline

use crate::{
    error::{Error, Result},
    types::{Balance, LedgerEntry, Wallet, WalletAddress},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch, DB,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ENTRIES: &str = "entries";
const CF_WALLETS: &str = "wallets";
const CF_BALANCES: &str = "balances";
const CF_INDICES: &str = "indices";

const IDX_REF: &[u8] = b"ref|";
const IDX_WALLET_ENTRY: &[u8] = b"we|";
const IDX_ADDRESS: &[u8] = b"addr|";
const IDX_USER_WALLET: &[u8] = b"uw|";
const IDX_PENDING: &[u8] = b"pend|";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy entry log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_entries()),
            ColumnFamilyDescriptor::new(CF_WALLETS, Self::cf_options_wallets()),
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_balances()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_entries() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_wallets() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_balances() -> Options {
        let mut opts = Options::default();
        // Balances are read on every request, favour speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Wallet operations

    /// Register wallet with address and user indices (atomic)
    pub fn put_wallet(&self, wallet: &Wallet) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_wallets = self.cf_handle(CF_WALLETS)?;
        batch.put_cf(cf_wallets, wallet.wallet_id.as_bytes(), bincode::serialize(wallet)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::index_key_address(&wallet.address),
            wallet.wallet_id.as_bytes(),
        );
        batch.put_cf(
            cf_indices,
            Self::index_key_user_wallet(wallet.user_id, wallet.wallet_id),
            [],
        );

        // Zero projection row so reads never miss
        let cf_balances = self.cf_handle(CF_BALANCES)?;
        let balance = Balance {
            user_id: wallet.user_id,
            wallet_id: wallet.wallet_id,
            amount: Decimal::ZERO,
        };
        batch.put_cf(cf_balances, wallet.wallet_id.as_bytes(), bincode::serialize(&balance)?);

        self.db.write(batch)?;

        tracing::debug!(
            wallet_id = %wallet.wallet_id,
            user_id = wallet.user_id,
            "Wallet registered"
        );

        Ok(())
    }

    /// Get wallet by ID
    pub fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet> {
        let cf = self.cf_handle(CF_WALLETS)?;
        let value = self
            .db
            .get_cf(cf, wallet_id.as_bytes())?
            .ok_or_else(|| Error::WalletNotFound(wallet_id.to_string()))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Resolve deposit address to wallet ID
    pub fn wallet_id_by_address(&self, address: &WalletAddress) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf, Self::index_key_address(address))? {
            Some(bytes) => {
                let raw: [u8; 16] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt address index".to_string()))?;
                Ok(Some(Uuid::from_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// List wallets for a user
    pub fn wallets_for_user(&self, user_id: i64) -> Result<Vec<Wallet>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut prefix = IDX_USER_WALLET.to_vec();
        prefix.extend_from_slice(&user_id.to_be_bytes());

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, rocksdb::Direction::Forward));

        let mut wallets = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let offset = prefix.len();
            if key.len() >= offset + 16 {
                let raw: [u8; 16] = key[offset..offset + 16].try_into().unwrap();
                wallets.push(self.get_wallet(Uuid::from_bytes(raw))?);
            }
        }

        Ok(wallets)
    }

    // Entry operations

    /// Look up entry by external reference (idempotency check)
    pub fn entry_id_by_ref(&self, external_ref: &str) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf, Self::index_key_ref(external_ref))? {
            Some(bytes) => {
                let raw: [u8; 16] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt ref index".to_string()))?;
                Ok(Some(Uuid::from_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Get entry by ID
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let value = self
            .db
            .get_cf(cf, entry_id.as_bytes())?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Append entry with projection update and indices (atomic)
    ///
    /// The entry, the new balance, the wallet-entry index, the external-ref
    /// index and the pending-deadline index all land in one WriteBatch, so
    /// the projection can never drift from the log.
    pub fn append_entry_atomic(&self, entry: &LedgerEntry, balance: &Balance) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        batch.put_cf(cf_entries, entry.entry_id.as_bytes(), bincode::serialize(entry)?);

        let cf_balances = self.cf_handle(CF_BALANCES)?;
        batch.put_cf(
            cf_balances,
            balance.wallet_id.as_bytes(),
            bincode::serialize(balance)?,
        );

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::index_key_wallet_entry(entry.wallet_id, entry.entry_id),
            [],
        );

        if let Some(ref external_ref) = entry.external_ref {
            batch.put_cf(
                cf_indices,
                Self::index_key_ref(external_ref),
                entry.entry_id.as_bytes(),
            );
        }

        if let Some(expires_at) = entry.expires_at {
            batch.put_cf(
                cf_indices,
                Self::index_key_pending(expires_at, entry.entry_id),
                [],
            );
        }

        self.db.write(batch)?;

        tracing::debug!(
            entry_id = %entry.entry_id,
            wallet_id = %entry.wallet_id,
            amount = %entry.amount,
            "Entry appended"
        );

        Ok(())
    }

    /// Persist a withdrawal resolution (atomic)
    ///
    /// Rewrites the entry and the projection, drops the pending-deadline
    /// index and records the external reference a confirmation carried.
    pub fn resolve_entry_atomic(
        &self,
        entry: &LedgerEntry,
        balance: &Balance,
        old_deadline: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        batch.put_cf(cf_entries, entry.entry_id.as_bytes(), bincode::serialize(entry)?);

        let cf_balances = self.cf_handle(CF_BALANCES)?;
        batch.put_cf(
            cf_balances,
            balance.wallet_id.as_bytes(),
            bincode::serialize(balance)?,
        );

        let cf_indices = self.cf_handle(CF_INDICES)?;

        if let Some(deadline) = old_deadline {
            batch.delete_cf(cf_indices, Self::index_key_pending(deadline, entry.entry_id));
        }

        if let Some(ref external_ref) = entry.external_ref {
            batch.put_cf(
                cf_indices,
                Self::index_key_ref(external_ref),
                entry.entry_id.as_bytes(),
            );
        }

        self.db.write(batch)?;

        Ok(())
    }

    /// Get entries for a wallet (append order)
    pub fn wallet_entries(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut prefix = IDX_WALLET_ENTRY.to_vec();
        prefix.extend_from_slice(wallet_id.as_bytes());

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, rocksdb::Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let offset = prefix.len();
            if key.len() >= offset + 16 {
                let raw: [u8; 16] = key[offset..offset + 16].try_into().unwrap();
                entries.push(self.get_entry(Uuid::from_bytes(raw))?);
            }
        }

        Ok(entries)
    }

    // Balance projection

    /// Get projected balance
    pub fn get_balance(&self, wallet_id: Uuid) -> Result<Option<Balance>> {
        let cf = self.cf_handle(CF_BALANCES)?;
        match self.db.get_cf(cf, wallet_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Recompute balance as the signed sum of the wallet's entries
    ///
    /// Audit path: the stored projection must always equal this.
    pub fn recompute_balance(&self, wallet_id: Uuid) -> Result<Decimal> {
        let entries = self.wallet_entries(wallet_id)?;
        Ok(entries.iter().map(|e| e.effective_amount()).sum())
    }

    // Pending sweep

    /// Pending withdrawal entry IDs whose deadline is at or before `now`
    ///
    /// The deadline index is big-endian ordered, so the scan stops at the
    /// first entry still in the future.
    pub fn pending_due(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let now_nanos = now.timestamp_nanos_opt().unwrap_or(i64::MAX);

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(IDX_PENDING, rocksdb::Direction::Forward));

        let mut due = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(IDX_PENDING) {
                break;
            }

            let offset = IDX_PENDING.len();
            if key.len() < offset + 8 + 16 {
                continue;
            }

            let deadline_nanos = i64::from_be_bytes(key[offset..offset + 8].try_into().unwrap());
            if deadline_nanos > now_nanos {
                break;
            }

            let raw: [u8; 16] = key[offset + 8..offset + 24].try_into().unwrap();
            due.push(Uuid::from_bytes(raw));
        }

        Ok(due)
    }

    // Index key helpers

    fn index_key_ref(external_ref: &str) -> Vec<u8> {
        let mut key = IDX_REF.to_vec();
        key.extend_from_slice(external_ref.as_bytes());
        key
    }

    fn index_key_wallet_entry(wallet_id: Uuid, entry_id: Uuid) -> Vec<u8> {
        let mut key = IDX_WALLET_ENTRY.to_vec();
        key.extend_from_slice(wallet_id.as_bytes());
        key.extend_from_slice(entry_id.as_bytes());
        key
    }

    fn index_key_address(address: &WalletAddress) -> Vec<u8> {
        let mut key = IDX_ADDRESS.to_vec();
        key.extend_from_slice(address.as_str().as_bytes());
        key
    }

    fn index_key_user_wallet(user_id: i64, wallet_id: Uuid) -> Vec<u8> {
        let mut key = IDX_USER_WALLET.to_vec();
        key.extend_from_slice(&user_id.to_be_bytes());
        key.extend_from_slice(wallet_id.as_bytes());
        key
    }

    fn index_key_pending(deadline: DateTime<Utc>, entry_id: Uuid) -> Vec<u8> {
        let mut key = IDX_PENDING.to_vec();
        key.extend_from_slice(&deadline.timestamp_nanos_opt().unwrap_or(0).to_be_bytes());
        key.extend_from_slice(entry_id.as_bytes());
        key
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let cf_wallets = self.cf_handle(CF_WALLETS)?;

        Ok(StorageStats {
            total_entries: self.approximate_count(cf_entries)?,
            total_wallets: self.approximate_count(cf_wallets)?,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate ledger entry count
    pub total_entries: u64,
    /// Approximate wallet count
    pub total_wallets: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryKind, EntryState};
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn test_wallet(user_id: i64, address: &str) -> Wallet {
        Wallet {
            wallet_id: Uuid::new_v4(),
            user_id,
            address: WalletAddress::new(address),
            is_primary: true,
            created_at: Utc::now(),
        }
    }

    fn deposit_entry(wallet: &Wallet, tx_hash: &str, amount: Decimal) -> LedgerEntry {
        LedgerEntry {
            entry_id: Uuid::now_v7(),
            user_id: wallet.user_id,
            wallet_id: wallet.wallet_id,
            amount,
            kind: EntryKind::Deposit,
            state: EntryState::Settled,
            external_ref: Some(tx_hash.to_string()),
            destination: None,
            note: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.db.cf_handle(CF_ENTRIES).is_some());
        assert!(storage.db.cf_handle(CF_BALANCES).is_some());
    }

    #[test]
    fn test_wallet_roundtrip_and_address_index() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let wallet = test_wallet(7, "EQwallet7");
        storage.put_wallet(&wallet).unwrap();

        let retrieved = storage.get_wallet(wallet.wallet_id).unwrap();
        assert_eq!(retrieved.user_id, 7);

        let resolved = storage
            .wallet_id_by_address(&WalletAddress::new("EQwallet7"))
            .unwrap();
        assert_eq!(resolved, Some(wallet.wallet_id));

        // Projection row exists from registration
        let balance = storage.get_balance(wallet.wallet_id).unwrap().unwrap();
        assert_eq!(balance.amount, Decimal::ZERO);
    }

    #[test]
    fn test_wallets_for_user() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let w1 = test_wallet(7, "EQa");
        let mut w2 = test_wallet(7, "EQb");
        w2.is_primary = false;
        let other = test_wallet(8, "EQc");
        storage.put_wallet(&w1).unwrap();
        storage.put_wallet(&w2).unwrap();
        storage.put_wallet(&other).unwrap();

        let wallets = storage.wallets_for_user(7).unwrap();
        assert_eq!(wallets.len(), 2);
        assert!(wallets.iter().all(|w| w.user_id == 7));
    }

    #[test]
    fn test_atomic_append_updates_ref_index_and_balance() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let wallet = test_wallet(7, "EQwallet7");
        storage.put_wallet(&wallet).unwrap();

        let entry = deposit_entry(&wallet, "txabc", Decimal::new(1000, 2));
        let balance = Balance {
            user_id: wallet.user_id,
            wallet_id: wallet.wallet_id,
            amount: Decimal::new(1000, 2),
        };

        storage.append_entry_atomic(&entry, &balance).unwrap();

        assert_eq!(storage.entry_id_by_ref("txabc").unwrap(), Some(entry.entry_id));
        assert_eq!(storage.entry_id_by_ref("txother").unwrap(), None);

        let stored = storage.get_balance(wallet.wallet_id).unwrap().unwrap();
        assert_eq!(stored.amount, Decimal::new(1000, 2));

        let entries = storage.wallet_entries(wallet.wallet_id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(storage.recompute_balance(wallet.wallet_id).unwrap(), stored.amount);
    }

    #[test]
    fn test_pending_due_scan() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let wallet = test_wallet(7, "EQwallet7");
        storage.put_wallet(&wallet).unwrap();

        let now = Utc::now();
        let mut overdue = deposit_entry(&wallet, "tx1", Decimal::new(-100, 2));
        overdue.external_ref = None;
        overdue.kind = EntryKind::Withdrawal;
        overdue.state = EntryState::Pending;
        overdue.expires_at = Some(now - chrono::Duration::seconds(10));

        let mut future = overdue.clone();
        future.entry_id = Uuid::now_v7();
        future.expires_at = Some(now + chrono::Duration::seconds(600));

        let balance = Balance {
            user_id: wallet.user_id,
            wallet_id: wallet.wallet_id,
            amount: Decimal::ZERO,
        };
        storage.append_entry_atomic(&overdue, &balance).unwrap();
        storage.append_entry_atomic(&future, &balance).unwrap();

        let due = storage.pending_due(now).unwrap();
        assert_eq!(due, vec![overdue.entry_id]);
    }

    #[test]
    fn test_resolve_clears_pending_index() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let wallet = test_wallet(7, "EQwallet7");
        storage.put_wallet(&wallet).unwrap();

        let now = Utc::now();
        let mut entry = deposit_entry(&wallet, "ignored", Decimal::new(-100, 2));
        entry.external_ref = None;
        entry.kind = EntryKind::Withdrawal;
        entry.state = EntryState::Pending;
        entry.expires_at = Some(now - chrono::Duration::seconds(1));

        let balance = Balance {
            user_id: wallet.user_id,
            wallet_id: wallet.wallet_id,
            amount: Decimal::new(-100, 2),
        };
        storage.append_entry_atomic(&entry, &balance).unwrap();
        assert_eq!(storage.pending_due(now).unwrap().len(), 1);

        let deadline = entry.expires_at;
        entry.state = EntryState::Confirmed;
        entry.expires_at = None;
        entry.external_ref = Some("transfer-1".to_string());
        storage.resolve_entry_atomic(&entry, &balance, deadline).unwrap();

        assert!(storage.pending_due(now).unwrap().is_empty());
        assert_eq!(
            storage.entry_id_by_ref("transfer-1").unwrap(),
            Some(entry.entry_id)
        );
    }
}
