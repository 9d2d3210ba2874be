//! Price-trend signal source.
//!
//! Derives signal metrics from a rolling window of prices sampled from a
//! wrapped price source:
//! - Momentum: rate of change across the window
//! - Mean reversion: negative z-score of the last price against the SMA
//! - Volatility: standard deviation of sample-to-sample returns
//! - Breakout: last price above the prior high or below the prior low
//!
//! Confidence grows with the number of samples collected.

use crate::error::AppError;
use crate::sources::{PriceSource, SignalSource};
use crate::types::{SignalMetrics, SIGNAL_SCORE_BOUND};
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default number of samples kept per symbol.
pub const DEFAULT_WINDOW: usize = 30;

/// Rate of change (percent) that maps to a momentum of 1.0.
const MOMENTUM_SCALE_PCT: f64 = 5.0;

struct PriceWindow {
    samples: VecDeque<f64>,
    last_sampled: Instant,
}

/// Signal source computing trend metrics from sampled prices.
pub struct TrendSignalSource {
    prices: Arc<dyn PriceSource>,
    windows: DashMap<String, PriceWindow>,
    window: usize,
    sample_interval: Duration,
}

impl TrendSignalSource {
    /// `sample_interval` is the minimum spacing between kept samples;
    /// fetches inside it refresh the latest sample instead of appending.
    pub fn new(prices: Arc<dyn PriceSource>, window: usize, sample_interval: Duration) -> Self {
        Self {
            prices,
            windows: DashMap::new(),
            window: window.max(2),
            sample_interval,
        }
    }

    /// Record a price sample for `symbol`.
    pub fn observe(&self, symbol: &str, price: f64) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(symbol.to_string())
            .or_insert_with(|| PriceWindow {
                samples: VecDeque::with_capacity(self.window),
                last_sampled: now,
            });

        let window = entry.value_mut();
        let due = window.samples.is_empty()
            || now.duration_since(window.last_sampled) >= self.sample_interval;
        if due {
            window.samples.push_back(price);
            window.last_sampled = now;
            while window.samples.len() > self.window {
                window.samples.pop_front();
            }
        } else if let Some(last) = window.samples.back_mut() {
            *last = price;
        }
    }

    /// Metrics for `symbol`, or `None` with fewer than two samples.
    pub fn metrics(&self, symbol: &str) -> Option<SignalMetrics> {
        let entry = self.windows.get(symbol)?;
        let samples: Vec<f64> = entry.samples.iter().copied().collect();
        drop(entry);
        compute_metrics(&samples, self.window)
    }
}

/// Compute trend metrics over `samples` (oldest first).
pub fn compute_metrics(samples: &[f64], window: usize) -> Option<SignalMetrics> {
    if samples.len() < 2 {
        return None;
    }
    let first = *samples.first()?;
    let last = *samples.last()?;
    let n = samples.len() as f64;

    let roc_pct = (last / first - 1.0) * 100.0;
    let momentum = bound(roc_pct / MOMENTUM_SCALE_PCT);

    let mean = samples.iter().sum::<f64>() / n;
    let std_dev = (samples.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n).sqrt();
    let mean_reversion = if std_dev > 0.0 {
        bound((mean - last) / std_dev)
    } else {
        0.0
    };

    let returns: Vec<f64> = samples.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
    let avg_return = returns.iter().sum::<f64>() / returns.len() as f64;
    let return_std = (returns
        .iter()
        .map(|r| (r - avg_return).powi(2))
        .sum::<f64>()
        / returns.len() as f64)
        .sqrt();
    // 1% per-sample deviation reads as volatility 1.0.
    let volatility = (return_std * 100.0).clamp(0.0, SIGNAL_SCORE_BOUND);

    let prior = &samples[..samples.len() - 1];
    let prior_high = prior.iter().copied().fold(f64::MIN, f64::max);
    let prior_low = prior.iter().copied().fold(f64::MAX, f64::min);
    let breakout = if samples.len() < 3 {
        0.0
    } else if last > prior_high {
        1.0
    } else if last < prior_low {
        -1.0
    } else {
        0.0
    };

    let total_score = bound(0.5 * momentum + 0.3 * mean_reversion + 0.2 * breakout);
    let confidence = (n / window.max(1) as f64).clamp(0.0, 1.0);

    Some(SignalMetrics {
        total_score,
        momentum,
        mean_reversion,
        volatility,
        breakout,
        confidence,
    })
}

fn bound(value: f64) -> f64 {
    value.clamp(-SIGNAL_SCORE_BOUND, SIGNAL_SCORE_BOUND)
}

impl SignalSource for TrendSignalSource {
    fn name(&self) -> &str {
        "trend"
    }

    fn get_signals<'a>(
        &'a self,
        symbols: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, SignalMetrics>, AppError>> + Send + 'a>>
    {
        Box::pin(async move {
            let prices = self.prices.get_prices(symbols).await?;
            for (symbol, price) in &prices {
                self.observe(symbol, *price);
            }

            let signals: HashMap<String, SignalMetrics> = symbols
                .iter()
                .filter_map(|s| self.metrics(s).map(|m| (s.clone(), m)))
                .collect();
            debug!(
                "Trend signals ready for {}/{} symbols",
                signals.len(),
                symbols.len()
            );
            Ok(signals)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticPriceSource;

    #[test]
    fn test_needs_two_samples() {
        assert!(compute_metrics(&[100.0], 10).is_none());
    }

    #[test]
    fn test_uptrend() {
        let samples = [100.0, 101.0, 102.0, 103.0, 105.0];
        let m = compute_metrics(&samples, 10).unwrap();
        assert!((m.momentum - 1.0).abs() < 1e-9);
        assert!(m.mean_reversion < 0.0);
        assert_eq!(m.breakout, 1.0);
        assert!(m.total_score > 0.0);
        assert!((m.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_flat_prices_are_calm() {
        let m = compute_metrics(&[50.0, 50.0, 50.0], 3).unwrap();
        assert_eq!(m.momentum, 0.0);
        assert_eq!(m.mean_reversion, 0.0);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.breakout, 0.0);
        assert_eq!(m.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_signals_from_sampled_prices() {
        let prices = Arc::new(StaticPriceSource::default());
        prices.set_price("BTC", 100.0);
        let source = TrendSignalSource::new(prices.clone(), 5, Duration::ZERO);
        let symbols = vec!["BTC".to_string(), "ETH".to_string()];

        let first = source.get_signals(&symbols).await.unwrap();
        assert!(first.is_empty());

        prices.set_price("BTC", 110.0);
        let second = source.get_signals(&symbols).await.unwrap();
        assert!(second["BTC"].momentum > 0.0);
        assert!(!second.contains_key("ETH"));
    }
}
