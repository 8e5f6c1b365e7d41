//! Background stale-pending sweep
//!
//! A withdrawal can be stranded in pending if the process dies between
//! reserving funds and resolving the transfer. This task periodically asks
//! the ledger to reverse every pending entry past its deadline.

use chrono::Utc;
use ledger_core::Ledger;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Spawn the sweep loop; runs until the process exits.
pub fn spawn_sweeper(ledger: Arc<Ledger>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match ledger.expire_stale_pending(Utc::now()).await {
                Ok(reversed) if !reversed.is_empty() => {
                    info!(count = reversed.len(), "Reversed stale pending withdrawals");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Stale-pending sweep failed");
                }
            }
        }
    })
}
