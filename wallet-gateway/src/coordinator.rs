//! Withdrawal coordinator
//!
//! Drives a withdrawal through its full lifecycle: reserve funds in the
//! ledger, hand the transfer to the external rail, then resolve the pending
//! entry to confirmed or reversed. Every path out of the transfer call lands
//! in exactly one terminal state, so reserved funds are never stranded; the
//! ledger's stale-pending sweep backstops a crash between reserve and
//! resolve.

use crate::clients::{TransferClient, TransferRequest};
use crate::errors::{GatewayError, Result};
use ledger_core::{Ledger, LedgerEntry, WalletAddress, WithdrawalOutcome};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct WithdrawalCoordinator {
    ledger: Arc<Ledger>,
    transfer: Arc<dyn TransferClient>,
    confirm_timeout: Duration,
}

impl WithdrawalCoordinator {
    pub fn new(
        ledger: Arc<Ledger>,
        transfer: Arc<dyn TransferClient>,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            transfer,
            confirm_timeout,
        }
    }

    /// Execute a withdrawal end to end
    ///
    /// Returns the confirmed ledger entry. On transfer failure or timeout
    /// the reservation is reversed before the error is returned, so the
    /// caller sees their balance restored.
    pub async fn withdraw(
        &self,
        user_id: i64,
        amount: Decimal,
        destination: WalletAddress,
    ) -> Result<LedgerEntry> {
        let reserved = self
            .ledger
            .reserve_withdrawal(user_id, amount, destination.clone())
            .await?;

        info!(
            entry_id = %reserved.entry_id,
            user_id,
            %amount,
            "Withdrawal reserved, initiating transfer"
        );

        let request = TransferRequest {
            entry_id: reserved.entry_id,
            destination: destination.to_string(),
            amount,
        };

        let transfer_result =
            tokio::time::timeout(self.confirm_timeout, self.transfer.initiate_transfer(&request))
                .await;

        match transfer_result {
            Ok(Ok(result)) => {
                let confirmed = self
                    .ledger
                    .resolve_withdrawal(
                        reserved.entry_id,
                        WithdrawalOutcome::Confirmed {
                            external_ref: Some(result.external_ref.clone()),
                        },
                    )
                    .await?;

                info!(
                    entry_id = %confirmed.entry_id,
                    external_ref = %result.external_ref,
                    "Withdrawal confirmed"
                );
                Ok(confirmed)
            }
            Ok(Err(e)) => {
                warn!(entry_id = %reserved.entry_id, error = %e, "Transfer failed, reversing");
                self.reverse(&reserved, format!("transfer failed: {}", e))
                    .await?;
                Err(GatewayError::Upstream(format!("transfer failed: {}", e)))
            }
            Err(_) => {
                warn!(entry_id = %reserved.entry_id, "Transfer timed out, reversing");
                self.reverse(&reserved, "transfer timed out".to_string())
                    .await?;
                Err(GatewayError::Upstream("transfer timed out".to_string()))
            }
        }
    }

    async fn reverse(&self, reserved: &LedgerEntry, reason: String) -> Result<()> {
        self.ledger
            .resolve_withdrawal(reserved.entry_id, WithdrawalOutcome::Reversed { reason })
            .await?;
        Ok(())
    }
}
