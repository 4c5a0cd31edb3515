//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the ledger pipeline.
//!
//! # Metrics
//!
//! - `chain_txs_delivered_total` - Transactions executed successfully
//! - `chain_txs_failed_total` - Transactions that failed execution
//! - `chain_blocks_total` - Committed blocks
//! - `chain_inflation_runs_total` - Inflation applications

use prometheus::{IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Transactions executed successfully
    pub txs_delivered: IntCounter,

    /// Transactions that failed execution
    pub txs_failed: IntCounter,

    /// Committed blocks
    pub blocks_total: IntCounter,

    /// Inflation applications
    pub inflation_runs: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let txs_delivered = IntCounter::with_opts(Opts::new(
            "chain_txs_delivered_total",
            "Transactions executed successfully",
        ))?;
        registry.register(Box::new(txs_delivered.clone()))?;

        let txs_failed = IntCounter::with_opts(Opts::new(
            "chain_txs_failed_total",
            "Transactions that failed execution",
        ))?;
        registry.register(Box::new(txs_failed.clone()))?;

        let blocks_total = IntCounter::with_opts(Opts::new(
            "chain_blocks_total",
            "Committed blocks",
        ))?;
        registry.register(Box::new(blocks_total.clone()))?;

        let inflation_runs = IntCounter::with_opts(Opts::new(
            "chain_inflation_runs_total",
            "Inflation applications",
        ))?;
        registry.register(Box::new(inflation_runs.clone()))?;

        Ok(Self {
            txs_delivered,
            txs_failed,
            blocks_total,
            inflation_runs,
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
