//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify the critical invariants:
//! - Projection consistency: Balance(wallet) == Σ entry.effective_amount()
//! - Idempotency: one entry and one balance change per tx hash
//! - Conservation: a reversal restores the pre-reservation balance exactly

use ledger_core::{
    Config, DepositEvent, Error, IngestOutcome, Ledger, WalletAddress, WithdrawalOutcome,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Strategy for generating valid deposit amounts (positive decimals)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_000_00u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// Strategy for generating tx hashes from a small alphabet so duplicates occur
fn tx_hash_strategy() -> impl Strategy<Value = String> {
    "[a-f]{3}"
}

async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();

    (Ledger::open(config).await.unwrap(), temp_dir)
}

fn deposit(tx_hash: &str, amount: Decimal) -> DepositEvent {
    DepositEvent {
        wallet_address: WalletAddress::new("EQwallet"),
        tx_hash: tx_hash.to_string(),
        amount,
        from_address: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: duplicate tx hashes never double-credit; the balance is
    /// the sum over first occurrences only, and the projection always
    /// matches the recomputed entry sum.
    #[test]
    fn prop_deposit_idempotency_and_projection(
        events in proptest::collection::vec((tx_hash_strategy(), amount_strategy()), 1..20)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger().await;
            let wallet = ledger
                .register_wallet(1, WalletAddress::new("EQwallet"), true)
                .await
                .unwrap();

            let mut seen = HashSet::new();
            let mut expected = Decimal::ZERO;

            for (tx_hash, amount) in &events {
                let outcome = ledger.ingest_deposit(deposit(tx_hash, *amount)).await.unwrap();

                if seen.insert(tx_hash.clone()) {
                    expected += *amount;
                    prop_assert!(matches!(outcome, IngestOutcome::Credited(_)));
                } else {
                    prop_assert!(matches!(outcome, IngestOutcome::AlreadyProcessed(_)));
                }

                // Invariant holds at every observable instant
                let balance = ledger.get_balance(wallet.wallet_id).await.unwrap();
                prop_assert_eq!(balance.amount, ledger.rebuild_balance(wallet.wallet_id).unwrap());
            }

            let balance = ledger.get_balance(wallet.wallet_id).await.unwrap();
            prop_assert_eq!(balance.amount, expected);

            let entries = ledger.wallet_entries(wallet.wallet_id).await.unwrap();
            prop_assert_eq!(entries.len(), seen.len());

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: a reversal restores the pre-reservation balance exactly,
    /// and a confirmation keeps the debit.
    #[test]
    fn prop_withdrawal_conservation(
        deposit_amount in amount_strategy(),
        withdraw_cents in 1u64..1_000_000_00u64,
        confirm in proptest::bool::ANY,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger().await;
            let wallet = ledger
                .register_wallet(1, WalletAddress::new("EQwallet"), true)
                .await
                .unwrap();

            ledger.ingest_deposit(deposit("abc", deposit_amount)).await.unwrap();
            let withdraw_amount = Decimal::new(withdraw_cents as i64, 2);

            let result = ledger
                .reserve_withdrawal(1, withdraw_amount, WalletAddress::new("EQdest"))
                .await;

            if withdraw_amount > deposit_amount {
                // Over-balance requests always fail and leave no entry
                let is_insufficient = matches!(result, Err(Error::InsufficientFunds { .. }));
                prop_assert!(is_insufficient);
                let entries = ledger.wallet_entries(wallet.wallet_id).await.unwrap();
                prop_assert_eq!(entries.len(), 1);
                let balance = ledger.get_balance(wallet.wallet_id).await.unwrap();
                prop_assert_eq!(balance.amount, deposit_amount);
            } else {
                let entry = result.unwrap();
                let reserved = ledger.get_balance(wallet.wallet_id).await.unwrap();
                prop_assert_eq!(reserved.amount, deposit_amount - withdraw_amount);

                let outcome = if confirm {
                    WithdrawalOutcome::Confirmed { external_ref: Some("ref".to_string()) }
                } else {
                    WithdrawalOutcome::Reversed { reason: "test".to_string() }
                };
                ledger.resolve_withdrawal(entry.entry_id, outcome).await.unwrap();

                let expected = if confirm {
                    deposit_amount - withdraw_amount
                } else {
                    deposit_amount
                };
                let balance = ledger.get_balance(wallet.wallet_id).await.unwrap();
                prop_assert_eq!(balance.amount, expected);
                prop_assert!(ledger.verify_projection(wallet.wallet_id).await.unwrap());
            }

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn scenario_deposit_ten_ton_twice() {
    let (ledger, _temp) = create_test_ledger().await;
    let wallet = ledger
        .register_wallet(1, WalletAddress::new("EQwallet"), true)
        .await
        .unwrap();

    let ten = Decimal::from(10);
    ledger.ingest_deposit(deposit("abc", ten)).await.unwrap();
    assert_eq!(ledger.get_balance(wallet.wallet_id).await.unwrap().amount, ten);

    ledger.ingest_deposit(deposit("abc", ten)).await.unwrap();
    assert_eq!(ledger.get_balance(wallet.wallet_id).await.unwrap().amount, ten);
    assert_eq!(ledger.wallet_entries(wallet.wallet_id).await.unwrap().len(), 1);

    ledger.shutdown().await.unwrap();
}

#[tokio::test]
async fn scenario_drain_balance_then_overdraw() {
    let (ledger, _temp) = create_test_ledger().await;
    let wallet = ledger
        .register_wallet(1, WalletAddress::new("EQwallet"), true)
        .await
        .unwrap();

    ledger.ingest_deposit(deposit("abc", Decimal::from(5))).await.unwrap();

    let entry = ledger
        .reserve_withdrawal(1, Decimal::from(5), WalletAddress::new("EQdest"))
        .await
        .unwrap();
    ledger
        .resolve_withdrawal(
            entry.entry_id,
            WithdrawalOutcome::Confirmed { external_ref: None },
        )
        .await
        .unwrap();
    assert_eq!(
        ledger.get_balance(wallet.wallet_id).await.unwrap().amount,
        Decimal::ZERO
    );

    let overdraw = ledger
        .reserve_withdrawal(1, Decimal::ONE, WalletAddress::new("EQdest"))
        .await;
    assert!(matches!(overdraw, Err(Error::InsufficientFunds { .. })));
    assert_eq!(
        ledger.get_balance(wallet.wallet_id).await.unwrap().amount,
        Decimal::ZERO
    );

    ledger.shutdown().await.unwrap();
}
