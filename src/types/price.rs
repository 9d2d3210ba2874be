use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::strategy::SignalMetrics;

/// Prices for a set of symbols captured at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    /// USD price per symbol. Only positive prices are kept.
    pub prices: BTreeMap<String, f64>,
    /// Requested symbols without a usable price.
    pub missing: Vec<String>,
    /// Unix milliseconds.
    pub fetched_at: i64,
    /// True when any price was served from the fallback cache.
    pub stale: bool,
}

impl PriceSnapshot {
    /// Build a snapshot, dropping non-positive and non-finite prices.
    pub fn new(raw: HashMap<String, f64>, requested: &[String], fetched_at: i64, stale: bool) -> Self {
        let prices: BTreeMap<String, f64> = raw
            .into_iter()
            .filter(|(_, p)| p.is_finite() && *p > 0.0)
            .map(|(s, p)| (s.to_uppercase(), p))
            .collect();
        let mut missing: Vec<String> = requested
            .iter()
            .map(|s| s.to_uppercase())
            .filter(|s| !prices.contains_key(s))
            .collect();
        missing.dedup();
        Self {
            prices,
            missing,
            fetched_at,
            stale,
        }
    }

    /// Usable price for a symbol.
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied().filter(|p| *p > 0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Signals for a set of symbols; every requested symbol is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSnapshot {
    pub signals: BTreeMap<String, SignalMetrics>,
    pub fetched_at: i64,
    /// True when the source failed and neutral signals were substituted.
    pub degraded: bool,
}

impl SignalSnapshot {
    /// Build a snapshot, clamping values and filling gaps with the neutral
    /// signal.
    pub fn new(
        raw: HashMap<String, SignalMetrics>,
        requested: &[String],
        fetched_at: i64,
        degraded: bool,
    ) -> Self {
        let mut signals: BTreeMap<String, SignalMetrics> = raw
            .into_iter()
            .map(|(s, m)| (s.to_uppercase(), m.clamped()))
            .collect();
        for symbol in requested {
            signals
                .entry(symbol.to_uppercase())
                .or_insert_with(SignalMetrics::neutral);
        }
        Self {
            signals,
            fetched_at,
            degraded,
        }
    }

    pub fn get(&self, symbol: &str) -> SignalMetrics {
        self.signals
            .get(symbol)
            .copied()
            .unwrap_or_else(SignalMetrics::neutral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_drops_unusable_prices() {
        let raw: HashMap<String, f64> = [
            ("btc".to_string(), 50_000.0),
            ("ETH".to_string(), 0.0),
            ("ADA".to_string(), -1.0),
        ]
        .into_iter()
        .collect();
        let requested = vec!["BTC".to_string(), "ETH".to_string(), "ADA".to_string(), "DOT".to_string()];
        let snap = PriceSnapshot::new(raw, &requested, 1, false);

        assert_eq!(snap.price("BTC"), Some(50_000.0));
        assert_eq!(snap.price("ETH"), None);
        assert_eq!(snap.missing, vec!["ETH", "ADA", "DOT"]);
    }

    #[test]
    fn test_signal_snapshot_fills_neutral() {
        let raw: HashMap<String, SignalMetrics> = [(
            "BTC".to_string(),
            SignalMetrics {
                total_score: 1.5,
                ..SignalMetrics::neutral()
            },
        )]
        .into_iter()
        .collect();
        let requested = vec!["BTC".to_string(), "ETH".to_string()];
        let snap = SignalSnapshot::new(raw, &requested, 0, false);

        assert_eq!(snap.get("BTC").total_score, 1.5);
        assert_eq!(snap.get("ETH"), SignalMetrics::neutral());
        assert_eq!(snap.get("SOL"), SignalMetrics::neutral());
    }
}
