//! Drift Analyzer
//!
//! Compares current and target weights (both in percentage points) and
//! decides whether the gap warrants a rebalance.

use std::collections::BTreeMap;

use crate::types::{DriftReport, Urgency};

/// Default drift threshold in percentage points.
pub const DEFAULT_DRIFT_THRESHOLD_PCT: f64 = 5.0;

/// Analyze drift between `current` and `target`.
///
/// Symbols missing from either side count as 0 weight. A rebalance is due
/// when the largest per-asset drift strictly exceeds `threshold_pct`.
pub fn analyze_drift(
    current: &BTreeMap<String, f64>,
    target: &BTreeMap<String, f64>,
    threshold_pct: f64,
) -> DriftReport {
    let mut per_asset_drift = BTreeMap::new();
    let mut max_drift: f64 = 0.0;

    for symbol in current.keys().chain(target.keys()) {
        if per_asset_drift.contains_key(symbol) {
            continue;
        }
        let c = sanitize(current.get(symbol).copied());
        let t = sanitize(target.get(symbol).copied());
        let drift = (c - t).abs();
        max_drift = max_drift.max(drift);
        per_asset_drift.insert(symbol.clone(), drift);
    }

    DriftReport {
        max_drift,
        per_asset_drift,
        should_rebalance: max_drift > threshold_pct,
        urgency: Urgency::from_drift(max_drift),
        threshold_pct,
    }
}

fn sanitize(weight: Option<f64>) -> f64 {
    match weight {
        Some(w) if w.is_finite() => w,
        _ => 0.0,
    }
}
