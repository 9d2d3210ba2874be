//! Static price and signal sources.
//!
//! In-process sources backed by a map the caller controls. Used for demos
//! (`PRICE_SOURCE=static`) and as test doubles. Both can be switched into a
//! failing or slow mode to exercise fallback paths.

use crate::error::AppError;
use crate::sources::{PriceSource, SignalSource};
use crate::types::SignalMetrics;
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Failure and latency switches shared by both static sources.
#[derive(Default)]
struct Faults {
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl Faults {
    async fn apply(&self, source: &str) -> Result<(), AppError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::ExternalApi(format!("{} source unavailable", source)));
        }
        Ok(())
    }
}

/// Price source serving a fixed, mutable price table.
#[derive(Default)]
pub struct StaticPriceSource {
    prices: DashMap<String, f64>,
    faults: Faults,
}

impl StaticPriceSource {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        let source = Self::default();
        for (symbol, price) in prices {
            source.set_price(&symbol, price);
        }
        source
    }

    /// Set or replace the price of a symbol.
    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_uppercase(), price);
    }

    pub fn remove_price(&self, symbol: &str) {
        self.prices.remove(&symbol.to_uppercase());
    }

    /// Make every fetch fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every fetch by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.faults.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl PriceSource for StaticPriceSource {
    fn name(&self) -> &str {
        "static"
    }

    fn get_prices<'a>(
        &'a self,
        symbols: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, f64>, AppError>> + Send + 'a>> {
        Box::pin(async move {
            self.faults.apply(self.name()).await?;
            Ok(symbols
                .iter()
                .filter_map(|s| self.prices.get(s).map(|p| (s.clone(), *p)))
                .collect())
        })
    }
}

/// Signal source serving a fixed, mutable signal table.
#[derive(Default)]
pub struct StaticSignalSource {
    signals: DashMap<String, SignalMetrics>,
    faults: Faults,
}

impl StaticSignalSource {
    pub fn new(signals: HashMap<String, SignalMetrics>) -> Self {
        let source = Self::default();
        for (symbol, metrics) in signals {
            source.set_signal(&symbol, metrics);
        }
        source
    }

    pub fn set_signal(&self, symbol: &str, metrics: SignalMetrics) {
        self.signals.insert(symbol.to_uppercase(), metrics);
    }

    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.faults.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl SignalSource for StaticSignalSource {
    fn name(&self) -> &str {
        "static"
    }

    fn get_signals<'a>(
        &'a self,
        symbols: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, SignalMetrics>, AppError>> + Send + 'a>>
    {
        Box::pin(async move {
            self.faults.apply(self.name()).await?;
            Ok(symbols
                .iter()
                .filter_map(|s| self.signals.get(s).map(|m| (s.clone(), *m)))
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_static_prices() {
        let source = StaticPriceSource::default();
        source.set_price("btc", 50_000.0);

        let prices = source.get_prices(&symbols(&["BTC", "ETH"])).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["BTC"], 50_000.0);

        source.set_failing(true);
        assert!(source.get_prices(&symbols(&["BTC"])).await.is_err());
    }

    #[tokio::test]
    async fn test_static_signals() {
        let source = StaticSignalSource::default();
        source.set_signal(
            "ETH",
            SignalMetrics {
                momentum: 0.8,
                ..SignalMetrics::neutral()
            },
        );
        let signals = source.get_signals(&symbols(&["ETH", "BTC"])).await.unwrap();
        assert_eq!(signals["ETH"].momentum, 0.8);
        assert!(!signals.contains_key("BTC"));
    }
}
