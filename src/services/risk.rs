//! Risk Assessor
//!
//! Concentration, diversification and signal-driven market risk of a set
//! of weights (percentage points).

use std::collections::BTreeMap;

use crate::types::{MarketRisk, RiskAssessment, RiskLimits, SignalMetrics};

/// Weight above which an asset counts toward diversification.
const DIVERSIFICATION_FLOOR_PCT: f64 = 1.0;

/// Assess the risk of `weights` under `signals`.
pub fn assess_risk(
    weights: &BTreeMap<String, f64>,
    signals: &BTreeMap<String, SignalMetrics>,
) -> RiskAssessment {
    let limits = RiskLimits::default();

    let concentration_risk = round2(
        weights
            .values()
            .map(|w| (w / 100.0).powi(2))
            .sum::<f64>()
            * 100.0,
    );
    let diversification = weights
        .values()
        .filter(|w| **w > DIVERSIFICATION_FLOOR_PCT)
        .count();
    let max_weight = weights.values().copied().fold(0.0_f64, f64::max);
    let market_risk = market_risk(signals);

    let mut recommendations = Vec::new();
    if !weights.is_empty() {
        if max_weight > 50.0 {
            recommendations.push("High concentration risk - consider diversifying".to_string());
        } else if max_weight < 30.0 {
            recommendations.push("Good diversification maintained".to_string());
        }
    }

    if !signals.is_empty() {
        let uncertain = signals
            .values()
            .filter(|s| s.total_score.abs() < 1.0)
            .count();
        if uncertain * 2 > signals.len() {
            recommendations
                .push("High signal uncertainty - consider smaller position sizes".to_string());
        }
    }

    match market_risk {
        MarketRisk::High => recommendations
            .push("High market volatility detected - consider reducing exposure".to_string()),
        MarketRisk::Low => {
            recommendations.push("Favorable market conditions for growth positions".to_string())
        }
        MarketRisk::Medium => {}
    }

    if recommendations.is_empty() {
        recommendations.push("Risk levels within acceptable parameters".to_string());
    }

    let mut breaches = Vec::new();
    if max_weight > limits.max_single_asset_weight {
        breaches.push(format!(
            "Single asset weight {:.1}% exceeds {:.0}%",
            max_weight, limits.max_single_asset_weight
        ));
    }
    if !weights.is_empty() && diversification < limits.min_diversification {
        breaches.push(format!(
            "Only {} assets held, minimum is {}",
            diversification, limits.min_diversification
        ));
    }
    if concentration_risk > limits.max_concentration_risk {
        breaches.push(format!(
            "Concentration {:.2} exceeds {:.0}",
            concentration_risk, limits.max_concentration_risk
        ));
    }

    RiskAssessment {
        concentration_risk,
        diversification,
        market_risk,
        risk_score: risk_score(signals),
        recommendations,
        limits,
        breaches,
    }
}

/// 1 (low) to 10 (high); stronger signals mean lower risk.
fn risk_score(signals: &BTreeMap<String, SignalMetrics>) -> f64 {
    if signals.is_empty() {
        return 5.0;
    }
    let avg_strength =
        signals.values().map(|s| s.total_score.abs()).sum::<f64>() / signals.len() as f64;
    ((7.0 - avg_strength).clamp(1.0, 10.0) * 10.0).round() / 10.0
}

fn market_risk(signals: &BTreeMap<String, SignalMetrics>) -> MarketRisk {
    if signals.is_empty() {
        return MarketRisk::Medium;
    }
    let avg_volatility =
        signals.values().map(|s| s.volatility).sum::<f64>() / signals.len() as f64;
    if avg_volatility >= 1.5 {
        MarketRisk::High
    } else if avg_volatility > 1.0 {
        MarketRisk::Medium
    } else {
        MarketRisk::Low
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
