//! Market Data
//!
//! Wraps the configured price and signal sources. Every fetch is bounded by
//! a timeout. On timeout or error, prices fall back to the last known good
//! value per symbol (marked stale) and signals fall back to neutral.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::sources::{PriceSource, SignalSource};
use crate::types::{PriceSnapshot, SignalSnapshot};

/// Price and signal access with timeout and fallback.
pub struct MarketData {
    prices: Arc<dyn PriceSource>,
    signals: Arc<dyn SignalSource>,
    timeout: Duration,
    last_good: DashMap<String, f64>,
}

impl MarketData {
    pub fn new(
        prices: Arc<dyn PriceSource>,
        signals: Arc<dyn SignalSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            prices,
            signals,
            timeout,
            last_good: DashMap::new(),
        }
    }

    /// Fetch prices for `symbols`.
    ///
    /// Never fails: symbols without a fresh or cached price are listed in
    /// the snapshot's `missing`.
    pub async fn prices(&self, symbols: &[String]) -> PriceSnapshot {
        let requested = normalize(symbols);
        let fetched_at = chrono::Utc::now().timestamp_millis();

        let fresh = match tokio::time::timeout(self.timeout, self.prices.get_prices(&requested)).await
        {
            Ok(Ok(prices)) => prices,
            Ok(Err(e)) => {
                warn!("Price source {} failed: {}", self.prices.name(), e);
                HashMap::new()
            }
            Err(_) => {
                warn!(
                    "Price source {} timed out after {:?}",
                    self.prices.name(),
                    self.timeout
                );
                HashMap::new()
            }
        };

        let mut merged: HashMap<String, f64> = HashMap::new();
        let mut stale = false;
        for symbol in &requested {
            match fresh.get(symbol) {
                Some(price) if price.is_finite() && *price > 0.0 => {
                    self.last_good.insert(symbol.clone(), *price);
                    merged.insert(symbol.clone(), *price);
                }
                _ => {
                    if let Some(cached) = self.last_good.get(symbol) {
                        warn!("Serving stale price for {}: {}", symbol, *cached);
                        merged.insert(symbol.clone(), *cached);
                        stale = true;
                    }
                }
            }
        }

        let snapshot = PriceSnapshot::new(merged, &requested, fetched_at, stale);
        debug!(
            "Price snapshot: {} priced, {} missing, stale={}",
            snapshot.prices.len(),
            snapshot.missing.len(),
            snapshot.stale
        );
        snapshot
    }

    /// Fetch signals for `symbols`; every symbol is present in the result.
    pub async fn signals(&self, symbols: &[String]) -> SignalSnapshot {
        let requested = normalize(symbols);
        let fetched_at = chrono::Utc::now().timestamp_millis();

        match tokio::time::timeout(self.timeout, self.signals.get_signals(&requested)).await {
            Ok(Ok(signals)) => SignalSnapshot::new(signals, &requested, fetched_at, false),
            Ok(Err(e)) => {
                warn!(
                    "Signal source {} failed, using neutral signals: {}",
                    self.signals.name(),
                    e
                );
                SignalSnapshot::new(HashMap::new(), &requested, fetched_at, true)
            }
            Err(_) => {
                warn!(
                    "Signal source {} timed out, using neutral signals",
                    self.signals.name()
                );
                SignalSnapshot::new(HashMap::new(), &requested, fetched_at, true)
            }
        }
    }

    /// Last known good price of a symbol.
    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_good.get(symbol).map(|p| *p)
    }
}

fn normalize(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let upper = symbol.trim().to_uppercase();
        if !upper.is_empty() && !out.contains(&upper) {
            out.push(upper);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{StaticPriceSource, StaticSignalSource};
    use crate::types::SignalMetrics;

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn market() -> (Arc<StaticPriceSource>, Arc<StaticSignalSource>, MarketData) {
        let prices = Arc::new(StaticPriceSource::default());
        let signals = Arc::new(StaticSignalSource::default());
        let market = MarketData::new(prices.clone(), signals.clone(), Duration::from_millis(50));
        (prices, signals, market)
    }

    #[tokio::test]
    async fn test_fresh_prices() {
        let (prices, _, market) = market();
        prices.set_price("BTC", 50_000.0);
        prices.set_price("ETH", 0.0);

        let snap = market.prices(&symbols(&["btc", "ETH"])).await;
        assert_eq!(snap.price("BTC"), Some(50_000.0));
        assert_eq!(snap.missing, vec!["ETH".to_string()]);
        assert!(!snap.stale);
    }

    #[tokio::test]
    async fn test_stale_fallback_on_error() {
        let (prices, _, market) = market();
        prices.set_price("BTC", 50_000.0);
        market.prices(&symbols(&["BTC"])).await;

        prices.set_failing(true);
        let snap = market.prices(&symbols(&["BTC", "ETH"])).await;
        assert_eq!(snap.price("BTC"), Some(50_000.0));
        assert!(snap.stale);
        assert_eq!(snap.missing, vec!["ETH".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_fallback_on_timeout() {
        let (prices, _, market) = market();
        prices.set_price("BTC", 42_000.0);
        market.prices(&symbols(&["BTC"])).await;

        prices.set_delay(Duration::from_millis(500));
        let snap = market.prices(&symbols(&["BTC"])).await;
        assert_eq!(snap.price("BTC"), Some(42_000.0));
        assert!(snap.stale);
    }

    #[tokio::test]
    async fn test_signals_degrade_to_neutral() {
        let (_, signals, market) = market();
        signals.set_signal(
            "BTC",
            SignalMetrics {
                total_score: 1.2,
                ..SignalMetrics::neutral()
            },
        );
        let snap = market.signals(&symbols(&["BTC", "ETH"])).await;
        assert!(!snap.degraded);
        assert_eq!(snap.get("BTC").total_score, 1.2);
        assert_eq!(snap.get("ETH"), SignalMetrics::neutral());

        signals.set_failing(true);
        let snap = market.signals(&symbols(&["BTC"])).await;
        assert!(snap.degraded);
        assert_eq!(snap.get("BTC"), SignalMetrics::neutral());
    }
}
