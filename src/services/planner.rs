//! Trade Planner
//!
//! Turns a weight delta into buy/sell instructions ranked by notional.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{PriceSnapshot, TradeAction, TradeInstruction};

/// Trades below this USD notional are suppressed.
pub const DUST_THRESHOLD_USD: f64 = 1.0;

/// Build a rebalance plan.
///
/// Weights are percentage points. Symbols without a positive price and
/// deltas under the dust threshold are skipped. A non-positive
/// `total_value` yields an empty plan. Instructions are sorted by
/// descending USD value; equal values keep symbol order.
pub fn build_plan(
    current: &BTreeMap<String, f64>,
    target: &BTreeMap<String, f64>,
    prices: &PriceSnapshot,
    total_value: f64,
) -> Vec<TradeInstruction> {
    if !total_value.is_finite() || total_value <= 0.0 {
        return Vec::new();
    }

    let symbols: BTreeSet<&String> = current.keys().chain(target.keys()).collect();
    let mut plan = Vec::new();

    for symbol in symbols {
        let price = match prices.price(symbol) {
            Some(p) => p,
            None => continue,
        };
        let current_weight = current.get(symbol).copied().unwrap_or(0.0);
        let target_weight = target.get(symbol).copied().unwrap_or(0.0);

        let current_value = current_weight / 100.0 * total_value;
        let target_value = target_weight / 100.0 * total_value;
        let delta = target_value - current_value;

        if !delta.is_finite() || delta.abs() < DUST_THRESHOLD_USD {
            continue;
        }

        plan.push(TradeInstruction {
            symbol: symbol.clone(),
            action: if delta > 0.0 {
                TradeAction::Buy
            } else {
                TradeAction::Sell
            },
            amount: delta.abs() / price,
            value: delta.abs(),
            price,
            current_weight,
            target_weight,
        });
    }

    plan.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, w)| (s.to_string(), *w)).collect()
    }

    fn prices(pairs: &[(&str, f64)]) -> PriceSnapshot {
        let raw: HashMap<String, f64> = pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect();
        let requested: Vec<String> = pairs.iter().map(|(s, _)| s.to_string()).collect();
        PriceSnapshot::new(raw, &requested, 0, false)
    }

    #[test]
    fn test_plan_buys_and_sells() {
        let plan = build_plan(
            &weights(&[("BTC", 60.0), ("ETH", 40.0)]),
            &weights(&[("BTC", 50.0), ("ETH", 50.0)]),
            &prices(&[("BTC", 50_000.0), ("ETH", 2_500.0)]),
            10_000.0,
        );
        assert_eq!(plan.len(), 2);

        let btc = plan.iter().find(|i| i.symbol == "BTC").unwrap();
        assert_eq!(btc.action, TradeAction::Sell);
        assert!((btc.value - 1_000.0).abs() < 1e-9);
        assert!((btc.amount - 0.02).abs() < 1e-12);

        let eth = plan.iter().find(|i| i.symbol == "ETH").unwrap();
        assert_eq!(eth.action, TradeAction::Buy);
        assert!((eth.amount - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_plan_sorted_by_value() {
        let plan = build_plan(
            &weights(&[("BTC", 70.0), ("ETH", 20.0), ("ADA", 10.0)]),
            &weights(&[("BTC", 40.0), ("ETH", 30.0), ("ADA", 30.0)]),
            &prices(&[("BTC", 50_000.0), ("ETH", 2_500.0), ("ADA", 1.2)]),
            10_000.0,
        );
        let values: Vec<f64> = plan.iter().map(|i| i.value).collect();
        assert_eq!(plan[0].symbol, "BTC");
        assert!(values.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_zero_total_value_is_empty() {
        let plan = build_plan(
            &weights(&[("BTC", 60.0)]),
            &weights(&[("BTC", 50.0), ("ETH", 50.0)]),
            &prices(&[("BTC", 50_000.0), ("ETH", 2_500.0)]),
            0.0,
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_skips_unpriced_and_dust() {
        let plan = build_plan(
            &weights(&[("BTC", 50.005), ("ETH", 49.995)]),
            &weights(&[("BTC", 50.0), ("ETH", 40.0), ("DOT", 10.0)]),
            &prices(&[("BTC", 50_000.0), ("ETH", 2_500.0), ("DOT", 0.0)]),
            10_000.0,
        );
        // BTC delta is $0.50, DOT has no usable price.
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].symbol, "ETH");
        assert_eq!(plan[0].action, TradeAction::Sell);
    }
}
