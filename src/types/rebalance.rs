//! Rebalance Types
//!
//! Drift reports, trade plans, recommendations and risk assessments.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ledger::TradeAction;
use super::strategy::{StrategyInfo, StrategyKind, TargetWeights};

/// How urgently a portfolio should be rebalanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Classify a maximum drift in percentage points.
    pub fn from_drift(max_drift: f64) -> Self {
        if max_drift >= 10.0 {
            Urgency::High
        } else if max_drift > 5.0 {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Urgency::Low => write!(f, "low"),
            Urgency::Medium => write!(f, "medium"),
            Urgency::High => write!(f, "high"),
        }
    }
}

/// Result of comparing current and target weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub max_drift: f64,
    pub per_asset_drift: BTreeMap<String, f64>,
    pub should_rebalance: bool,
    pub urgency: Urgency,
    pub threshold_pct: f64,
}

/// One buy or sell instruction in a rebalance plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeInstruction {
    pub symbol: String,
    pub action: TradeAction,
    /// Quantity of the asset to trade.
    pub amount: f64,
    /// Absolute USD notional.
    pub value: f64,
    pub price: f64,
    pub current_weight: f64,
    pub target_weight: f64,
}

/// What the selector recommends doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationAction {
    Rebalance,
    Hold,
    /// Computation failed; callers treat this as `Hold`.
    Error,
}

impl RecommendationAction {
    pub fn is_rebalance(&self) -> bool {
        matches!(self, RecommendationAction::Rebalance)
    }
}

impl std::fmt::Display for RecommendationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendationAction::Rebalance => write!(f, "rebalance"),
            RecommendationAction::Hold => write!(f, "hold"),
            RecommendationAction::Error => write!(f, "error"),
        }
    }
}

/// Coarse market regime derived from signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    Volatile,
    Stable,
    Unknown,
}

/// Scoring inputs for one candidate strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceMetrics {
    /// Sum of absolute weight changes, in percentage points.
    pub drift_reduction: f64,
    /// Signal-weighted change in expected return.
    pub expected_return_impact: f64,
    /// Estimated transaction cost as a percent of portfolio value.
    pub transaction_cost_pct: f64,
    /// Composite score; higher is better.
    pub optimization_score: f64,
}

/// Output of the recommendation selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub action: RecommendationAction,
    pub urgency: Urgency,
    pub strategy: StrategyInfo,
    pub target_weights: TargetWeights,
    pub justification: Vec<String>,
    pub market_condition: MarketCondition,
    pub metrics: RebalanceMetrics,
    pub max_drift: f64,
    pub timestamp: i64,
}

impl Recommendation {
    /// Degraded recommendation carrying the failure cause.
    pub fn error(cause: &str, timestamp: i64) -> Self {
        Self {
            action: RecommendationAction::Error,
            urgency: Urgency::Low,
            strategy: StrategyKind::Tactical.info(),
            target_weights: TargetWeights::new(),
            justification: vec![format!("Error: {}", cause)],
            market_condition: MarketCondition::Unknown,
            metrics: RebalanceMetrics::default(),
            max_drift: 0.0,
            timestamp,
        }
    }
}

// =============================================================================
// Risk
// =============================================================================

/// Market risk tier derived from average signal volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRisk {
    Low,
    Medium,
    High,
}

/// Recommended risk limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskLimits {
    pub max_single_asset_weight: f64,
    pub min_diversification: usize,
    pub max_concentration_risk: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_single_asset_weight: 40.0,
            min_diversification: 3,
            max_concentration_risk: 60.0,
        }
    }
}

/// Risk assessment of a set of weights under the current signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// Herfindahl index of fractional weights, times 100.
    pub concentration_risk: f64,
    /// Number of assets above 1% weight.
    pub diversification: usize,
    pub market_risk: MarketRisk,
    /// 1 (low) to 10 (high).
    pub risk_score: f64,
    pub recommendations: Vec<String>,
    pub limits: RiskLimits,
    /// Limits currently exceeded.
    pub breaches: Vec<String>,
}
