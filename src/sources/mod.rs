//! Market Data Sources
//!
//! Price and signal producers consumed by the rebalancing engine. Real
//! clients and static test doubles implement the same traits; the binary
//! picks one by configuration.

pub mod coingecko;
pub mod fixed;
pub mod trend;

pub use coingecko::CoinGeckoPriceSource;
pub use fixed::{StaticPriceSource, StaticSignalSource};
pub use trend::TrendSignalSource;

use crate::error::AppError;
use crate::types::SignalMetrics;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Produces USD prices for symbols.
///
/// Symbols the source cannot price are left out of the map. A price of
/// zero or less is treated as unavailable by every consumer.
pub trait PriceSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetch prices for `symbols` (uppercase).
    fn get_prices<'a>(
        &'a self,
        symbols: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, f64>, AppError>> + Send + 'a>>;
}

/// Produces per-symbol signal metrics.
///
/// Symbols without a signal are left out; consumers substitute the
/// neutral signal.
pub trait SignalSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetch signals for `symbols` (uppercase).
    fn get_signals<'a>(
        &'a self,
        symbols: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, SignalMetrics>, AppError>> + Send + 'a>>;
}
