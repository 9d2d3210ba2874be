use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::services::LedgerConfig;

/// Which price source backs the market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSourceKind {
    /// CoinGecko REST API.
    CoinGecko,
    /// Fixed prices from `STATIC_PRICES`.
    Static,
}

impl PriceSourceKind {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "static" | "fixed" | "mock" => PriceSourceKind::Static,
            _ => PriceSourceKind::CoinGecko,
        }
    }
}

/// Which signal source backs the market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSourceKind {
    /// Trend metrics sampled from the price source.
    Trend,
    /// Neutral signals only.
    Static,
}

impl SignalSourceKind {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "static" | "neutral" => SignalSourceKind::Static,
            _ => SignalSourceKind::Trend,
        }
    }
}

/// Market data configuration.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub price_source: PriceSourceKind,
    pub signal_source: SignalSourceKind,
    /// CoinGecko API key (optional, for pro tier).
    pub coingecko_api_key: Option<String>,
    /// Prices served by the static source.
    pub static_prices: HashMap<String, f64>,
    /// Bound on every price/signal fetch.
    pub fetch_timeout: Duration,
    /// How long fetched prices are reused by the price client.
    pub cache_ttl: Duration,
    /// Samples kept per symbol by the trend signal source.
    pub trend_window: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            price_source: PriceSourceKind::CoinGecko,
            signal_source: SignalSourceKind::Trend,
            coingecko_api_key: None,
            static_prices: parse_price_list(DEFAULT_STATIC_PRICES),
            fetch_timeout: Duration::from_millis(5000),
            cache_ttl: Duration::from_secs(60),
            trend_window: 30,
        }
    }
}

/// Background revaluation configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
        }
    }
}

const DEFAULT_STATIC_PRICES: &str = "BTC=50000,ETH=2500,ADA=0.45,DOT=6.5,USDC=1";

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database path for the ledger.
    pub database_path: String,
    pub market: MarketConfig,
    pub ledger: LedgerConfig,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let market_defaults = MarketConfig::default();
        let ledger_defaults = LedgerConfig::default();

        let universe = env::var("UNIVERSE")
            .ok()
            .map(|v| parse_symbol_list(&v))
            .filter(|list| !list.is_empty())
            .unwrap_or(ledger_defaults.universe);

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "signalstack.db".to_string()),
            market: MarketConfig {
                price_source: env::var("PRICE_SOURCE")
                    .map(|v| PriceSourceKind::parse(&v))
                    .unwrap_or(market_defaults.price_source),
                signal_source: env::var("SIGNAL_SOURCE")
                    .map(|v| SignalSourceKind::parse(&v))
                    .unwrap_or(market_defaults.signal_source),
                coingecko_api_key: env::var("COINGECKO_API_KEY")
                    .ok()
                    .filter(|k| !k.is_empty()),
                static_prices: env::var("STATIC_PRICES")
                    .ok()
                    .map(|v| parse_price_list(&v))
                    .filter(|p| !p.is_empty())
                    .unwrap_or(market_defaults.static_prices),
                fetch_timeout: env::var("PRICE_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(market_defaults.fetch_timeout),
                cache_ttl: env::var("PRICE_CACHE_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(market_defaults.cache_ttl),
                trend_window: env::var("TREND_WINDOW")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(market_defaults.trend_window),
            },
            ledger: LedgerConfig {
                universe,
                drift_threshold_pct: env::var("DRIFT_THRESHOLD_PCT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(ledger_defaults.drift_threshold_pct),
                cost_rate: env::var("TRANSACTION_COST_RATE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(ledger_defaults.cost_rate),
                snapshot_interval_secs: env::var("SNAPSHOT_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(ledger_defaults.snapshot_interval_secs),
                default_initial_balance: env::var("DEFAULT_INITIAL_BALANCE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(ledger_defaults.default_initial_balance),
            },
            scheduler: SchedulerConfig {
                enabled: env::var("SCHEDULER_ENABLED")
                    .ok()
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(true),
                interval: env::var("REVALUATION_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(SchedulerConfig::default().interval),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Parse `"BTC,eth, ADA"` into uppercase symbols, dropping blanks and
/// duplicates.
pub fn parse_symbol_list(value: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for part in value.split(',') {
        let symbol = part.trim().to_uppercase();
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

/// Parse `"BTC=50000,ETH=2500"` into a price map. Malformed entries are
/// skipped.
pub fn parse_price_list(value: &str) -> HashMap<String, f64> {
    value
        .split(',')
        .filter_map(|entry| {
            let (symbol, price) = entry.split_once('=')?;
            let symbol = symbol.trim().to_uppercase();
            let price: f64 = price.trim().parse().ok()?;
            if symbol.is_empty() {
                None
            } else {
                Some((symbol, price))
            }
        })
        .collect()
}
