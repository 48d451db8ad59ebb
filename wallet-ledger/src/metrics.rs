//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `wallet_ledger_wallets_created_total` - Total number of wallets created
//! - `wallet_ledger_transfers_total` - Total number of committed transfers
//! - `wallet_ledger_transfers_rejected_total` - Rejected transfers by reason
//! - `wallet_ledger_transfer_duration_seconds` - Histogram of transfer latencies

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total wallets created
    pub wallets_created: IntCounter,

    /// Total committed transfers
    pub transfers_total: IntCounter,

    /// Rejected transfers, labelled by reason
    pub transfers_rejected: IntCounterVec,

    /// Transfer duration histogram
    pub transfer_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("wallets_created", &self.wallets_created.get())
            .field("transfers_total", &self.transfers_total.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let wallets_created = IntCounter::new(
            "wallet_ledger_wallets_created_total",
            "Total number of wallets created",
        )?;
        registry.register(Box::new(wallets_created.clone()))?;

        let transfers_total = IntCounter::new(
            "wallet_ledger_transfers_total",
            "Total number of committed transfers",
        )?;
        registry.register(Box::new(transfers_total.clone()))?;

        let transfers_rejected = IntCounterVec::new(
            Opts::new(
                "wallet_ledger_transfers_rejected_total",
                "Total number of rejected transfers",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(transfers_rejected.clone()))?;

        let transfer_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_ledger_transfer_duration_seconds",
                "Histogram of transfer latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(transfer_duration.clone()))?;

        Ok(Self {
            wallets_created,
            transfers_total,
            transfers_rejected,
            transfer_duration,
            registry,
        })
    }

    /// Record wallet creation
    pub fn record_wallet_created(&self) {
        self.wallets_created.inc();
    }

    /// Record committed transfer
    pub fn record_transfer(&self, duration_seconds: f64) {
        self.transfers_total.inc();
        self.transfer_duration.observe(duration_seconds);
    }

    /// Record rejected transfer
    pub fn record_transfer_rejected(&self, reason: &str) {
        self.transfers_rejected.with_label_values(&[reason]).inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.wallets_created.get(), 0);
        assert_eq!(metrics.transfers_total.get(), 0);

        // Independent registries never collide
        let other = Metrics::new().unwrap();
        other.record_wallet_created();
        assert_eq!(metrics.wallets_created.get(), 0);
    }

    #[test]
    fn test_record_transfer() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transfer(0.002);
        metrics.record_transfer(0.004);
        assert_eq!(metrics.transfers_total.get(), 2);
        assert_eq!(metrics.transfer_duration.get_sample_count(), 2);
    }

    #[test]
    fn test_record_rejections_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transfer_rejected("insufficient_funds");
        metrics.record_transfer_rejected("insufficient_funds");
        metrics.record_transfer_rejected("same_wallet");

        assert_eq!(
            metrics
                .transfers_rejected
                .with_label_values(&["insufficient_funds"])
                .get(),
            2
        );
        assert_eq!(
            metrics.transfers_rejected.with_label_values(&["same_wallet"]).get(),
            1
        );
    }

    #[test]
    fn test_gather_text() {
        let metrics = Metrics::new().unwrap();
        metrics.record_wallet_created();
        let text = metrics.gather_text().unwrap();
        assert!(text.contains("wallet_ledger_wallets_created_total 1"));
    }
}
