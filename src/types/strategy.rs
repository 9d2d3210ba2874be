//! Strategy Types
//!
//! Allocation strategies, per-symbol signal metrics and target weights.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Target allocation keyed by symbol, in percentage points (sums to 100).
pub type TargetWeights = BTreeMap<String, f64>;

/// Current allocation keyed by symbol, in percentage points.
pub type Weights = BTreeMap<String, f64>;

// =============================================================================
// Strategy Kind
// =============================================================================

/// Allocation strategy run by a bot.
///
/// Declaration order is the catalog order; it breaks ties when the
/// recommendation selector scores two strategies equally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Equal weight across all symbols (Shannon's Demon).
    #[serde(rename = "shannon", alias = "equal_weight")]
    EqualWeight,
    /// Equal-weight target, rebalanced only past the drift threshold.
    #[serde(rename = "threshold")]
    Threshold,
    /// Signal-ranked tilt around equal weight.
    #[serde(rename = "mpt", alias = "mean_variance")]
    MeanVarianceOptimized,
    /// Inverse-volatility weighting.
    #[serde(rename = "risk_parity")]
    RiskParity,
    /// Equal weight tilted by momentum.
    #[serde(rename = "momentum")]
    Momentum,
    /// Composite of score, momentum and mean reversion blended by risk tier.
    #[serde(rename = "tactical")]
    Tactical,
}

impl StrategyKind {
    /// All strategies in catalog order.
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::EqualWeight,
        StrategyKind::Threshold,
        StrategyKind::MeanVarianceOptimized,
        StrategyKind::RiskParity,
        StrategyKind::Momentum,
        StrategyKind::Tactical,
    ];

    /// Stable key used in ids, URLs and persisted state.
    pub fn key(&self) -> &'static str {
        match self {
            StrategyKind::EqualWeight => "shannon",
            StrategyKind::Threshold => "threshold",
            StrategyKind::MeanVarianceOptimized => "mpt",
            StrategyKind::RiskParity => "risk_parity",
            StrategyKind::Momentum => "momentum",
            StrategyKind::Tactical => "tactical",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StrategyKind::EqualWeight => "Shannon's Demon",
            StrategyKind::Threshold => "Threshold Rebalancing",
            StrategyKind::MeanVarianceOptimized => "Modern Portfolio Theory",
            StrategyKind::RiskParity => "Risk Parity",
            StrategyKind::Momentum => "Momentum-Based",
            StrategyKind::Tactical => "Tactical Allocation",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StrategyKind::EqualWeight => {
                "Equal-weight rebalancing strategy that benefits from volatility harvesting"
            }
            StrategyKind::Threshold => {
                "Rebalance only when asset weights drift beyond threshold"
            }
            StrategyKind::MeanVarianceOptimized => {
                "Tilt toward assets with the strongest expected return signal"
            }
            StrategyKind::RiskParity => "Allocate based on equal risk contribution",
            StrategyKind::Momentum => "Allocate more to assets with positive momentum",
            StrategyKind::Tactical => "Dynamic allocation based on market signals",
        }
    }

    /// Basket a newly deployed bot of this strategy trades.
    pub fn default_symbols(&self) -> &'static [&'static str] {
        match self {
            StrategyKind::EqualWeight => &["BTC", "ETH"],
            StrategyKind::Threshold => &["BTC", "ETH", "ADA"],
            StrategyKind::MeanVarianceOptimized | StrategyKind::RiskParity => {
                &["BTC", "ETH", "ADA", "DOT", "USDC"]
            }
            StrategyKind::Momentum => &["BTC", "ETH", "DOT"],
            StrategyKind::Tactical => &["BTC", "ETH", "ADA", "DOT"],
        }
    }

    /// Look up a strategy by key or alias.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "shannon" | "equal_weight" => Some(StrategyKind::EqualWeight),
            "threshold" => Some(StrategyKind::Threshold),
            "mpt" | "mean_variance" => Some(StrategyKind::MeanVarianceOptimized),
            "risk_parity" => Some(StrategyKind::RiskParity),
            "momentum" => Some(StrategyKind::Momentum),
            "tactical" => Some(StrategyKind::Tactical),
            _ => None,
        }
    }

    pub fn info(&self) -> StrategyInfo {
        StrategyInfo {
            key: *self,
            name: self.display_name().to_string(),
            description: self.description().to_string(),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Catalog entry describing a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyInfo {
    pub key: StrategyKind,
    pub name: String,
    pub description: String,
}

// =============================================================================
// Signal Metrics
// =============================================================================

/// Bound for score-like signal components.
pub const SIGNAL_SCORE_BOUND: f64 = 2.0;

/// Per-symbol signal metrics produced by the signal source.
///
/// Score components are bounded to [-2, 2], confidence to [0, 1] and
/// volatility to [0, 2].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMetrics {
    pub total_score: f64,
    pub momentum: f64,
    pub mean_reversion: f64,
    pub volatility: f64,
    pub breakout: f64,
    pub confidence: f64,
}

impl SignalMetrics {
    /// Neutral signal substituted for symbols the signal source omits.
    pub fn neutral() -> Self {
        Self {
            total_score: 0.0,
            momentum: 0.0,
            mean_reversion: 0.0,
            volatility: 0.5,
            breakout: 0.0,
            confidence: 0.5,
        }
    }

    /// Clamp every component into its documented range. Non-finite
    /// components fall back to the neutral value.
    pub fn clamped(&self) -> Self {
        let neutral = Self::neutral();
        let bound = |v: f64, fallback: f64, lo: f64, hi: f64| {
            if v.is_finite() {
                v.clamp(lo, hi)
            } else {
                fallback
            }
        };
        let score = SIGNAL_SCORE_BOUND;
        Self {
            total_score: bound(self.total_score, neutral.total_score, -score, score),
            momentum: bound(self.momentum, neutral.momentum, -score, score),
            mean_reversion: bound(self.mean_reversion, neutral.mean_reversion, -score, score),
            volatility: bound(self.volatility, neutral.volatility, 0.0, 2.0),
            breakout: bound(self.breakout, neutral.breakout, -score, score),
            confidence: bound(self.confidence, neutral.confidence, 0.0, 1.0),
        }
    }
}

impl Default for SignalMetrics {
    fn default() -> Self {
        Self::neutral()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_key_roundtrip() {
        for kind in StrategyKind::ALL {
            assert_eq!(StrategyKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(StrategyKind::from_key("EQUAL_WEIGHT"), Some(StrategyKind::EqualWeight));
        assert_eq!(StrategyKind::from_key("unknown"), None);
    }

    #[test]
    fn test_strategy_serialization() {
        assert_eq!(serde_json::to_string(&StrategyKind::EqualWeight).unwrap(), "\"shannon\"");
        assert_eq!(serde_json::to_string(&StrategyKind::RiskParity).unwrap(), "\"risk_parity\"");
        let parsed: StrategyKind = serde_json::from_str("\"mean_variance\"").unwrap();
        assert_eq!(parsed, StrategyKind::MeanVarianceOptimized);
    }

    #[test]
    fn test_default_baskets() {
        assert_eq!(StrategyKind::EqualWeight.default_symbols(), &["BTC", "ETH"]);
        assert_eq!(StrategyKind::Momentum.default_symbols(), &["BTC", "ETH", "DOT"]);
        for kind in StrategyKind::ALL {
            assert!(kind.default_symbols().len() >= 2);
        }
    }

    #[test]
    fn test_signal_clamping() {
        let wild = SignalMetrics {
            total_score: 9.0,
            momentum: -7.0,
            mean_reversion: f64::NAN,
            volatility: 5.0,
            breakout: 0.3,
            confidence: 1.4,
        };
        let c = wild.clamped();
        assert_eq!(c.total_score, 2.0);
        assert_eq!(c.momentum, -2.0);
        assert_eq!(c.mean_reversion, 0.0);
        assert_eq!(c.volatility, 2.0);
        assert_eq!(c.breakout, 0.3);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_signal_metrics_camel_case() {
        let json = serde_json::to_value(SignalMetrics::neutral()).unwrap();
        assert!(json.get("totalScore").is_some());
        assert!(json.get("meanReversion").is_some());
    }
}
