use ledger_core::{EntryState, LedgerEntry, Wallet};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum message length the relay accepts
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Nano units per TON (explorer balances are nano-denominated)
pub const NANO_PER_TON: u64 = 1_000_000_000;

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct RegisterWalletRequest {
    #[validate(length(min = 1, max = 128))]
    pub address: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct DepositRequest {
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
    #[validate(length(min = 1, max = 128))]
    pub tx_hash: String,
    pub amount: Decimal,
    pub from_address: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct WithdrawRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 128))]
    pub destination: String,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct ChannelVerifyRequest {
    #[validate(length(min = 1, max = 128))]
    pub channel: String,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct SendMessageRequest {
    pub to: i64,
    #[validate(length(min = 1, max = 4096))]
    pub message: String,
}

/// Ledger entry as exposed over HTTP
#[derive(Debug, Serialize)]
pub struct EntryView {
    pub entry_id: Uuid,
    pub wallet_id: Uuid,
    pub amount: Decimal,
    pub kind: String,
    pub state: String,
    pub external_ref: Option<String>,
    pub destination: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&LedgerEntry> for EntryView {
    fn from(entry: &LedgerEntry) -> Self {
        let kind = match entry.kind {
            ledger_core::EntryKind::Deposit => "deposit",
            ledger_core::EntryKind::Withdrawal => "withdrawal",
            ledger_core::EntryKind::Adjustment => "adjustment",
        };
        let state = match entry.state {
            EntryState::Settled => "settled",
            EntryState::Pending => "pending",
            EntryState::Confirmed => "confirmed",
            EntryState::Reversed => "reversed",
        };

        Self {
            entry_id: entry.entry_id,
            wallet_id: entry.wallet_id,
            amount: entry.amount,
            kind: kind.to_string(),
            state: state.to_string(),
            external_ref: entry.external_ref.clone(),
            destination: entry.destination.as_ref().map(|a| a.to_string()),
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WalletView {
    pub wallet_id: Uuid,
    pub user_id: i64,
    pub address: String,
    pub is_primary: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Wallet> for WalletView {
    fn from(wallet: &Wallet) -> Self {
        Self {
            wallet_id: wallet.wallet_id,
            user_id: wallet.user_id,
            address: wallet.address.to_string(),
            is_primary: wallet.is_primary,
            created_at: wallet.created_at,
        }
    }
}

/// Ownership report from the channel-verification service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOwnership {
    pub owner_id: i64,
    pub owner_username: Option<String>,
    pub is_bot_admin: bool,
}

/// Relay delivery receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReceipt {
    pub sent: bool,
    pub message_id: Option<i64>,
}
