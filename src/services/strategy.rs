//! Strategy Catalog
//!
//! Pure mapping from (symbols, signals, risk profile) to target weights for
//! every allocation strategy. No hidden state and no randomness: the same
//! inputs always produce the same weights.

use std::collections::{BTreeMap, HashSet};

use crate::types::{SignalMetrics, StrategyInfo, StrategyKind, TargetWeights};

/// Lower bound applied to tilted strategies before renormalization.
pub const MIN_WEIGHT: f64 = 5.0;
/// Upper bound applied to tilted strategies before renormalization.
pub const MAX_WEIGHT: f64 = 40.0;

/// Maximum tilt (percentage points) of the mean-variance strategy.
const MPT_TILT: f64 = 20.0;
/// Maximum tilt (percentage points) of the momentum strategy.
const MOMENTUM_TILT: f64 = 15.0;

/// All catalog entries in declaration order.
pub fn list_strategies() -> Vec<StrategyInfo> {
    StrategyKind::ALL.iter().map(|k| k.info()).collect()
}

/// Compute the target weights of `strategy` over `symbols`.
///
/// Returns empty weights when there are no symbols or no signals; the
/// caller treats that as "no recommendation possible". Symbols missing
/// from `signals` use the neutral signal.
pub fn compute_target_weights(
    strategy: StrategyKind,
    symbols: &[String],
    signals: &BTreeMap<String, SignalMetrics>,
    risk_profile: u8,
) -> TargetWeights {
    let symbols = dedup_symbols(symbols);
    if symbols.is_empty() || signals.is_empty() {
        return TargetWeights::new();
    }

    let risk_factor = f64::from(risk_profile.min(100)) / 100.0;
    let metrics: Vec<SignalMetrics> = symbols
        .iter()
        .map(|s| signals.get(s).map(|m| m.clamped()).unwrap_or_default())
        .collect();

    let raw = match strategy {
        StrategyKind::EqualWeight | StrategyKind::Threshold => equal_weights(symbols.len()),
        StrategyKind::MeanVarianceOptimized => mean_variance_weights(&metrics, risk_factor),
        StrategyKind::RiskParity => risk_parity_weights(&metrics),
        StrategyKind::Momentum => momentum_weights(&metrics, risk_factor),
        StrategyKind::Tactical => tactical_weights(&metrics, risk_factor),
    };

    normalize_weights(&symbols, &raw)
}

/// Scale raw weights so they sum to exactly 100.
///
/// Each weight is rounded to 0.01 and the rounding remainder is added to
/// the largest weight (first such symbol in `symbols` order). Negative or
/// non-finite inputs count as zero; an all-zero input becomes equal weight.
pub fn normalize_weights(symbols: &[String], raw: &[f64]) -> TargetWeights {
    if symbols.is_empty() || symbols.len() != raw.len() {
        return TargetWeights::new();
    }

    let mut values: Vec<f64> = raw
        .iter()
        .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
        .collect();
    let mut total: f64 = values.iter().sum();
    if total <= 0.0 {
        values = equal_weights(symbols.len());
        total = 100.0;
    }

    let mut scaled: Vec<f64> = values.iter().map(|w| round2(w / total * 100.0)).collect();

    let assigned: f64 = scaled.iter().sum();
    let remainder = 100.0 - assigned;
    let mut largest = 0;
    for (i, w) in scaled.iter().enumerate() {
        if *w > scaled[largest] {
            largest = i;
        }
    }
    scaled[largest] += remainder;

    symbols.iter().cloned().zip(scaled).collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn dedup_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .filter(|s| !s.is_empty() && seen.insert(s.as_str()))
        .cloned()
        .collect()
}

fn clamp_weight(weight: f64) -> f64 {
    weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
}

fn equal_weights(n: usize) -> Vec<f64> {
    vec![100.0 / n as f64; n]
}

/// Rank by total score and tilt around equal weight. Higher risk profiles
/// tilt harder toward the top-ranked symbols.
fn mean_variance_weights(metrics: &[SignalMetrics], risk_factor: f64) -> Vec<f64> {
    let n = metrics.len();
    let base = 100.0 / n as f64;

    // Stable sort keeps input order among equal scores.
    let mut ranked: Vec<usize> = (0..n).collect();
    ranked.sort_by(|a, b| {
        metrics[*b]
            .total_score
            .partial_cmp(&metrics[*a].total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut weights = vec![0.0; n];
    for (rank, idx) in ranked.into_iter().enumerate() {
        let rank_factor = (n - rank) as f64 / n as f64;
        let adjustment = (rank_factor - 0.5) * risk_factor * MPT_TILT;
        weights[idx] = clamp_weight(base + adjustment);
    }
    weights
}

/// Weight inversely to normalized volatility.
fn risk_parity_weights(metrics: &[SignalMetrics]) -> Vec<f64> {
    let inverse: Vec<f64> = metrics
        .iter()
        .map(|m| 1.0 / (m.volatility * 2.0).clamp(0.1, 2.0))
        .collect();
    let total: f64 = inverse.iter().sum();
    inverse
        .iter()
        .map(|inv| clamp_weight(inv / total * 100.0))
        .collect()
}

/// Tilt equal weight by momentum in [-1, 1].
fn momentum_weights(metrics: &[SignalMetrics], risk_factor: f64) -> Vec<f64> {
    let base = 100.0 / metrics.len() as f64;
    metrics
        .iter()
        .map(|m| {
            let momentum = m.momentum.clamp(-1.0, 1.0);
            clamp_weight(base + momentum * risk_factor * MOMENTUM_TILT)
        })
        .collect()
}

/// Blend score components by risk tier, shift into positive space and
/// scale by conviction.
fn tactical_weights(metrics: &[SignalMetrics], risk_factor: f64) -> Vec<f64> {
    let composites: Vec<f64> = metrics
        .iter()
        .map(|m| {
            let composite = if risk_factor > 0.7 {
                // Aggressive
                m.total_score * 0.6 + m.momentum * 0.4
            } else if risk_factor < 0.3 {
                // Conservative
                m.total_score * 0.3 + m.mean_reversion * 0.4 + 0.3
            } else {
                m.total_score * 0.5 + m.momentum * 0.2 + m.mean_reversion * 0.2 + 0.1
            };
            composite.clamp(-1.0, 1.0)
        })
        .collect();

    let shifted: Vec<f64> = composites.iter().map(|c| (c + 1.0).max(0.1)).collect();
    let total: f64 = shifted.iter().sum();

    composites
        .iter()
        .zip(shifted.iter())
        .map(|(c, s)| {
            let share = s / total;
            clamp_weight(100.0 * share * (1.0 + c * risk_factor))
        })
        .collect()
}
