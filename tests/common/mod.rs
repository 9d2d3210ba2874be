//! Shared fixtures for integration tests.

#![allow(dead_code)]

use signalstack::services::{Ledger, LedgerConfig, LedgerStore, MarketData, MemoryLedgerStore};
use signalstack::sources::{StaticPriceSource, StaticSignalSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const TOLERANCE: f64 = 1e-6;

pub struct Harness {
    pub ledger: Arc<Ledger>,
    pub prices: Arc<StaticPriceSource>,
    pub signals: Arc<StaticSignalSource>,
    pub store: Arc<dyn LedgerStore>,
}

pub fn ledger_config(universe: &[&str], snapshot_interval_secs: u64) -> LedgerConfig {
    LedgerConfig {
        universe: universe.iter().map(|s| s.to_string()).collect(),
        snapshot_interval_secs,
        ..LedgerConfig::default()
    }
}

/// BTC at 50,000 and ETH at 2,500 over a two-asset universe, neutral
/// signals, in-memory store.
pub fn harness() -> Harness {
    harness_with(
        ledger_config(&["BTC", "ETH"], 0),
        &[("BTC", 50_000.0), ("ETH", 2_500.0)],
        Arc::new(MemoryLedgerStore::new()),
    )
}

pub fn harness_with(
    config: LedgerConfig,
    prices: &[(&str, f64)],
    store: Arc<dyn LedgerStore>,
) -> Harness {
    let price_map: HashMap<String, f64> = prices.iter().map(|(s, p)| (s.to_string(), *p)).collect();
    let prices = Arc::new(StaticPriceSource::new(price_map));
    let signals = Arc::new(StaticSignalSource::new(HashMap::new()));
    let market = Arc::new(MarketData::new(
        prices.clone(),
        signals.clone(),
        Duration::from_millis(200),
    ));
    let ledger = Arc::new(Ledger::new(config, market, store.clone()));
    Harness {
        ledger,
        prices,
        signals,
        store,
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < TOLERANCE,
        "expected {}, got {}",
        expected,
        actual
    );
}
