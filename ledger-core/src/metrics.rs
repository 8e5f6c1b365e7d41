//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_deposits_total` - Deposits credited
//! - `ledger_duplicate_deposits_total` - Deposit events dropped as duplicates
//! - `ledger_withdrawals_reserved_total` - Withdrawal reservations
//! - `ledger_withdrawals_confirmed_total` - Confirmed withdrawals
//! - `ledger_withdrawals_reversed_total` - Reversed withdrawals (failures, timeouts, sweep)
//! - `ledger_sweep_reversals_total` - Reversals performed by the reconciliation sweep
//! - `ledger_append_duration_seconds` - Histogram of append latencies
//! - `ledger_balance_reads_total` - Projected balance reads

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Deposits credited
    pub deposits_total: IntCounter,

    /// Duplicate deposit events ignored
    pub duplicate_deposits_total: IntCounter,

    /// Withdrawal reservations
    pub withdrawals_reserved_total: IntCounter,

    /// Confirmed withdrawals
    pub withdrawals_confirmed_total: IntCounter,

    /// Reversed withdrawals
    pub withdrawals_reversed_total: IntCounter,

    /// Reversals performed by the sweep
    pub sweep_reversals_total: IntCounter,

    /// Append duration histogram
    pub append_duration: Histogram,

    /// Balance reads
    pub balance_reads_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let deposits_total = IntCounter::with_opts(Opts::new(
            "ledger_deposits_total",
            "Deposits credited",
        ))?;
        registry.register(Box::new(deposits_total.clone()))?;

        let duplicate_deposits_total = IntCounter::with_opts(Opts::new(
            "ledger_duplicate_deposits_total",
            "Deposit events dropped as duplicates",
        ))?;
        registry.register(Box::new(duplicate_deposits_total.clone()))?;

        let withdrawals_reserved_total = IntCounter::with_opts(Opts::new(
            "ledger_withdrawals_reserved_total",
            "Withdrawal reservations",
        ))?;
        registry.register(Box::new(withdrawals_reserved_total.clone()))?;

        let withdrawals_confirmed_total = IntCounter::with_opts(Opts::new(
            "ledger_withdrawals_confirmed_total",
            "Confirmed withdrawals",
        ))?;
        registry.register(Box::new(withdrawals_confirmed_total.clone()))?;

        let withdrawals_reversed_total = IntCounter::with_opts(Opts::new(
            "ledger_withdrawals_reversed_total",
            "Reversed withdrawals",
        ))?;
        registry.register(Box::new(withdrawals_reversed_total.clone()))?;

        let sweep_reversals_total = IntCounter::with_opts(Opts::new(
            "ledger_sweep_reversals_total",
            "Reversals performed by the reconciliation sweep",
        ))?;
        registry.register(Box::new(sweep_reversals_total.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_append_duration_seconds",
                "Histogram of append latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        let balance_reads_total = IntCounter::with_opts(Opts::new(
            "ledger_balance_reads_total",
            "Projected balance reads",
        ))?;
        registry.register(Box::new(balance_reads_total.clone()))?;

        Ok(Self {
            deposits_total,
            duplicate_deposits_total,
            withdrawals_reserved_total,
            withdrawals_confirmed_total,
            withdrawals_reversed_total,
            sweep_reversals_total,
            append_duration,
            balance_reads_total,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
