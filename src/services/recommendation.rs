//! Recommendation Selector
//!
//! Runs candidate strategies, scores each one and recommends the best.
//! Internal failures never escape: `recommend` degrades to an `Error`
//! action that callers treat as a hold.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::services::drift::{analyze_drift, DEFAULT_DRIFT_THRESHOLD_PCT};
use crate::services::strategy::compute_target_weights;
use crate::types::{
    MarketCondition, RebalanceMetrics, Recommendation, RecommendationAction, SignalMetrics,
    StrategyKind, TargetWeights,
};

/// Default transaction cost as a fraction of traded notional.
pub const DEFAULT_COST_RATE: f64 = 0.001;

const DRIFT_WEIGHT: f64 = 0.4;
const RETURN_WEIGHT: f64 = 0.3;
const COST_WEIGHT: f64 = 0.3;

/// Why a recommendation could not be computed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecommendationError {
    #[error("No symbols to allocate")]
    NoSymbols,

    #[error("No signals available")]
    NoSignals,

    #[error("No candidate strategies")]
    NoCandidates,

    #[error("Strategy {0} produced no target weights")]
    EmptyTargets(StrategyKind),

    #[error("Strategy {0} produced a non-finite score")]
    InvalidScore(StrategyKind),
}

/// A scored candidate.
#[derive(Debug, Clone)]
struct Candidate {
    strategy: StrategyKind,
    target: TargetWeights,
    metrics: RebalanceMetrics,
}

/// Scores strategies against a current allocation.
#[derive(Debug, Clone)]
pub struct RecommendationSelector {
    drift_threshold_pct: f64,
    cost_rate: f64,
}

impl Default for RecommendationSelector {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_THRESHOLD_PCT, DEFAULT_COST_RATE)
    }
}

impl RecommendationSelector {
    pub fn new(drift_threshold_pct: f64, cost_rate: f64) -> Self {
        Self {
            drift_threshold_pct,
            cost_rate,
        }
    }

    pub fn drift_threshold_pct(&self) -> f64 {
        self.drift_threshold_pct
    }

    /// Recommend across the whole catalog, degrading to an `Error` action
    /// on failure.
    pub fn recommend(
        &self,
        current: &BTreeMap<String, f64>,
        symbols: &[String],
        signals: &BTreeMap<String, SignalMetrics>,
        risk_profile: u8,
        timestamp: i64,
    ) -> Recommendation {
        self.recommend_among(&StrategyKind::ALL, current, symbols, signals, risk_profile, timestamp)
    }

    /// Recommend among `candidates`, degrading to an `Error` action on
    /// failure.
    pub fn recommend_among(
        &self,
        candidates: &[StrategyKind],
        current: &BTreeMap<String, f64>,
        symbols: &[String],
        signals: &BTreeMap<String, SignalMetrics>,
        risk_profile: u8,
        timestamp: i64,
    ) -> Recommendation {
        match self.try_recommend(candidates, current, symbols, signals, risk_profile, timestamp) {
            Ok(rec) => rec,
            Err(e) => {
                warn!("Recommendation degraded to error: {}", e);
                Recommendation::error(&e.to_string(), timestamp)
            }
        }
    }

    /// Score every candidate and build the recommendation for the best.
    ///
    /// Ties keep the earliest candidate, so catalog order breaks them.
    pub fn try_recommend(
        &self,
        candidates: &[StrategyKind],
        current: &BTreeMap<String, f64>,
        symbols: &[String],
        signals: &BTreeMap<String, SignalMetrics>,
        risk_profile: u8,
        timestamp: i64,
    ) -> Result<Recommendation, RecommendationError> {
        if symbols.is_empty() {
            return Err(RecommendationError::NoSymbols);
        }
        if signals.is_empty() {
            return Err(RecommendationError::NoSignals);
        }

        let mut best: Option<Candidate> = None;
        for &strategy in candidates {
            let target = compute_target_weights(strategy, symbols, signals, risk_profile);
            if target.is_empty() {
                return Err(RecommendationError::EmptyTargets(strategy));
            }
            let metrics = self.score(current, &target, signals);
            if !metrics.optimization_score.is_finite() {
                return Err(RecommendationError::InvalidScore(strategy));
            }
            debug!(
                "Strategy {} scored {:.3}",
                strategy.key(),
                metrics.optimization_score
            );

            let better = match &best {
                Some(b) => metrics.optimization_score > b.metrics.optimization_score,
                None => true,
            };
            if better {
                best = Some(Candidate {
                    strategy,
                    target,
                    metrics,
                });
            }
        }

        let best = best.ok_or(RecommendationError::NoCandidates)?;
        let drift = analyze_drift(current, &best.target, self.drift_threshold_pct);

        let action = if drift.should_rebalance {
            RecommendationAction::Rebalance
        } else {
            RecommendationAction::Hold
        };

        let justification = justify(&best, drift.max_drift, drift.should_rebalance, current, signals);

        Ok(Recommendation {
            action,
            urgency: drift.urgency,
            strategy: best.strategy.info(),
            target_weights: best.target,
            justification,
            market_condition: market_condition(signals),
            metrics: best.metrics,
            max_drift: drift.max_drift,
            timestamp,
        })
    }

    /// Composite score of moving from `current` to `target`.
    ///
    /// Increases with drift reduction and signal-weighted return impact,
    /// decreases with estimated transaction cost.
    pub fn score(
        &self,
        current: &BTreeMap<String, f64>,
        target: &TargetWeights,
        signals: &BTreeMap<String, SignalMetrics>,
    ) -> RebalanceMetrics {
        let mut drift_reduction = 0.0;
        let mut return_impact = 0.0;

        let symbols: std::collections::BTreeSet<&String> =
            current.keys().chain(target.keys()).collect();
        for symbol in symbols {
            let c = current.get(symbol).copied().unwrap_or(0.0);
            let t = target.get(symbol).copied().unwrap_or(0.0);
            let change = t - c;
            drift_reduction += change.abs();

            let signal = signals
                .get(symbol)
                .copied()
                .unwrap_or_else(SignalMetrics::neutral);
            return_impact += change * signal.total_score * signal.confidence / 100.0;
        }

        let transaction_cost_pct = drift_reduction * self.cost_rate;
        let optimization_score = DRIFT_WEIGHT * drift_reduction
            + RETURN_WEIGHT * return_impact
            + 10.0 * COST_WEIGHT / (1.0 + transaction_cost_pct);

        RebalanceMetrics {
            drift_reduction,
            expected_return_impact: return_impact,
            transaction_cost_pct,
            optimization_score,
        }
    }
}

/// Volatile when any signal is strong in either direction.
pub fn market_condition(signals: &BTreeMap<String, SignalMetrics>) -> MarketCondition {
    if signals.values().any(|s| s.total_score.abs() > 1.0) {
        MarketCondition::Volatile
    } else {
        MarketCondition::Stable
    }
}

fn justify(
    best: &Candidate,
    max_drift: f64,
    should_rebalance: bool,
    current: &BTreeMap<String, f64>,
    signals: &BTreeMap<String, SignalMetrics>,
) -> Vec<String> {
    if !should_rebalance {
        return vec!["Portfolio currently within acceptable drift parameters".to_string()];
    }

    let mut lines = vec![format!(
        "Portfolio drift of {:.1}% exceeds threshold",
        max_drift
    )];

    match best.strategy {
        StrategyKind::Momentum => {
            let momentum_of = |symbol: &String| {
                signals.get(symbol).map(|s| s.momentum).unwrap_or(0.0)
            };
            let symbols: Vec<&String> = current.keys().chain(best.target.keys()).collect();
            let mut positive: Vec<&str> = Vec::new();
            let mut negative: Vec<&str> = Vec::new();
            for symbol in symbols {
                let m = momentum_of(symbol);
                if m > 0.5 && !positive.contains(&symbol.as_str()) {
                    positive.push(symbol);
                } else if m < -0.5 && !negative.contains(&symbol.as_str()) {
                    negative.push(symbol);
                }
            }
            if !positive.is_empty() {
                lines.push(format!("Positive momentum detected in {}", positive.join(", ")));
            }
            if !negative.is_empty() {
                lines.push(format!("Negative momentum detected in {}", negative.join(", ")));
            }
        }
        StrategyKind::RiskParity => lines.push("Risk distribution is sub-optimal".to_string()),
        StrategyKind::Tactical => {
            lines.push("Market signals suggest tactical repositioning".to_string())
        }
        _ => {}
    }

    lines.push(format!(
        "Expected optimization improvement: {:.2}/10",
        best.metrics.optimization_score
    ));
    lines
}
