use crate::error::AppError;
use crate::sources::PriceSource;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
const COINGECKO_PRO_API_URL: &str = "https://pro-api.coingecko.com/api/v3";

/// Symbol to CoinGecko ID mapping.
pub const SYMBOL_TO_ID: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("ADA", "cardano"),
    ("DOT", "polkadot"),
    ("USDC", "usd-coin"),
    ("USDT", "tether"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("XRP", "ripple"),
    ("DOGE", "dogecoin"),
    ("AVAX", "avalanche-2"),
    ("LINK", "chainlink"),
    ("MATIC", "matic-network"),
    ("LTC", "litecoin"),
    ("ATOM", "cosmos"),
    ("UNI", "uniswap"),
];

/// Look up the CoinGecko id of a symbol.
pub fn coingecko_id(symbol: &str) -> Option<&'static str> {
    SYMBOL_TO_ID
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
        .map(|(_, id)| *id)
}

#[derive(Debug, Deserialize)]
struct CoinGeckoPrice {
    usd: Option<f64>,
}

struct CachedPrice {
    price: f64,
    expires_at: Instant,
}

/// CoinGecko `simple/price` client with a short-lived price cache.
pub struct CoinGeckoPriceSource {
    client: Client,
    api_key: Option<String>,
    cache: DashMap<String, CachedPrice>,
    cache_ttl: Duration,
}

impl CoinGeckoPriceSource {
    /// Create a new CoinGecko price source.
    pub fn new(api_key: Option<String>, cache_ttl: Duration, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent("SignalStack/0.1 (Portfolio Rebalancer)")
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            cache: DashMap::new(),
            cache_ttl,
        }
    }

    fn base_url(&self) -> &str {
        if self.api_key.is_some() {
            COINGECKO_PRO_API_URL
        } else {
            COINGECKO_API_URL
        }
    }

    fn cached(&self, symbol: &str) -> Option<f64> {
        let entry = self.cache.get(symbol)?;
        if entry.expires_at > Instant::now() {
            Some(entry.price)
        } else {
            None
        }
    }

    async fn fetch(&self, symbols: &[String]) -> Result<HashMap<String, f64>, AppError> {
        let mut prices = HashMap::new();
        let mut to_fetch: Vec<(&String, &'static str)> = Vec::new();

        for symbol in symbols {
            if let Some(price) = self.cached(symbol) {
                prices.insert(symbol.clone(), price);
                continue;
            }
            match coingecko_id(symbol) {
                Some(id) => to_fetch.push((symbol, id)),
                None => debug!("No CoinGecko id for {}", symbol),
            }
        }

        if to_fetch.is_empty() {
            return Ok(prices);
        }

        let ids: Vec<&str> = to_fetch.iter().map(|(_, id)| *id).collect();
        let mut url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url(),
            ids.join(",")
        );
        if let Some(ref key) = self.api_key {
            url.push_str(&format!("&x_cg_pro_api_key={}", key));
        }

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            warn!("CoinGecko API returned {}: {}", status, snippet);
            return Err(AppError::ExternalApi(format!("CoinGecko API error: {}", status)));
        }

        let body: HashMap<String, CoinGeckoPrice> = response.json().await?;
        let expires_at = Instant::now() + self.cache_ttl;

        for (symbol, id) in to_fetch {
            let price = match body.get(id).and_then(|p| p.usd) {
                Some(p) if p.is_finite() && p > 0.0 => p,
                _ => continue,
            };
            debug!("CoinGecko price: {} = ${}", symbol, price);
            self.cache
                .insert(symbol.clone(), CachedPrice { price, expires_at });
            prices.insert(symbol.clone(), price);
        }

        Ok(prices)
    }
}

impl PriceSource for CoinGeckoPriceSource {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn get_prices<'a>(
        &'a self,
        symbols: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<String, f64>, AppError>> + Send + 'a>> {
        Box::pin(self.fetch(symbols))
    }
}
