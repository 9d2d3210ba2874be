//! Ledger Types
//!
//! Virtual accounts, bots, holdings, trades and performance history.
//! All timestamps are Unix milliseconds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::strategy::StrategyKind;

/// Asset quantities keyed by symbol. Quantities are always positive; an
/// entry that reaches zero is removed.
pub type Holdings = BTreeMap<String, f64>;

// =============================================================================
// Enums
// =============================================================================

/// Bot lifecycle status. Deleted bots are removed from the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Active,
    Stopped,
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotStatus::Active => write!(f, "active"),
            BotStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

/// Lifecycle event attached to a bot performance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceEvent {
    Deployed,
    Stopped,
    Resumed,
}

// =============================================================================
// Performance History
// =============================================================================

/// Point in a bot's performance history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotPerformancePoint {
    pub timestamp: i64,
    pub value: f64,
    /// Value minus the bot's allocated fund.
    pub pnl: f64,
    pub pnl_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<PerformanceEvent>,
}

/// Point in an account's performance history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPerformancePoint {
    pub timestamp: i64,
    /// Uncommitted cash.
    pub balance: f64,
    /// Sum of active bot values.
    pub portfolio_value: f64,
    /// Balance plus portfolio value.
    pub total_value: f64,
    /// Total value minus the account's initial balance.
    pub pnl: f64,
    pub pnl_percent: f64,
}

/// Percent change of `value` against `baseline`; zero for a zero baseline.
pub fn pnl_percent(pnl: f64, baseline: f64) -> f64 {
    if baseline > 0.0 {
        pnl / baseline * 100.0
    } else {
        0.0
    }
}

// =============================================================================
// Trade
// =============================================================================

/// Immutable trade log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub bot_id: String,
    pub asset: String,
    pub action: TradeAction,
    pub quantity: f64,
    pub price: f64,
    /// Quantity times price in USD.
    pub value: f64,
    pub timestamp: i64,
}

impl Trade {
    pub fn new(
        bot_id: &str,
        asset: &str,
        action: TradeAction,
        quantity: f64,
        price: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bot_id: bot_id.to_string(),
            asset: asset.to_string(),
            action,
            quantity,
            price,
            value: quantity * price,
            timestamp,
        }
    }
}

// =============================================================================
// Bot
// =============================================================================

/// An independently funded strategy instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub id: String,
    pub strategy: StrategyKind,
    /// 0 (conservative) to 100 (aggressive).
    pub risk_profile: u8,
    pub status: BotStatus,
    /// USD committed at deployment. Never changes; sole PnL baseline.
    pub allocated_fund: f64,
    /// Last computed value of the holdings in USD.
    pub current_value: f64,
    pub holdings: Holdings,
    /// Price snapshot used to convert funds into holdings at the last
    /// deployment or resume.
    pub deployment_prices: BTreeMap<String, f64>,
    /// Prices the current value was last marked at.
    #[serde(default)]
    pub mark_prices: BTreeMap<String, f64>,
    /// Value returned to cash by the last stop.
    #[serde(default)]
    pub liquidation_value: Option<f64>,
    pub performance_history: Vec<BotPerformancePoint>,
    pub created_at: i64,
    #[serde(default)]
    pub last_rebalanced_at: Option<i64>,
}

impl Bot {
    /// Generate a bot id tagged with the strategy key.
    pub fn generate_id(strategy: StrategyKind) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("bot_{}_{}", strategy.key(), &suffix[..12])
    }

    pub fn is_active(&self) -> bool {
        self.status == BotStatus::Active
    }

    pub fn pnl(&self) -> f64 {
        self.current_value - self.allocated_fund
    }

    pub fn pnl_percent(&self) -> f64 {
        pnl_percent(self.pnl(), self.allocated_fund)
    }

    /// Value the holdings at the given prices.
    ///
    /// Returns the first symbol without a usable (positive) price as the
    /// error, so the caller never values a bot with a silent hole in it.
    pub fn holdings_value<F>(&self, price_of: F) -> Result<f64, String>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let mut total = 0.0;
        for (symbol, quantity) in &self.holdings {
            match price_of(symbol) {
                Some(price) if price > 0.0 => total += quantity * price,
                _ => return Err(symbol.clone()),
            }
        }
        Ok(total)
    }

    /// Current weights of the holdings in percentage points.
    pub fn weights_at<F>(&self, price_of: F) -> Result<BTreeMap<String, f64>, String>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let total = self.holdings_value(&price_of)?;
        let mut weights = BTreeMap::new();
        if total <= 0.0 {
            return Ok(weights);
        }
        for (symbol, quantity) in &self.holdings {
            // Priced above; holdings_value bailed on anything missing.
            let price = price_of(symbol).unwrap_or(0.0);
            weights.insert(symbol.clone(), quantity * price / total * 100.0);
        }
        Ok(weights)
    }

    /// Build a performance point for `value` against the allocated fund.
    pub fn performance_point(
        &self,
        timestamp: i64,
        value: f64,
        event: Option<PerformanceEvent>,
    ) -> BotPerformancePoint {
        let pnl = value - self.allocated_fund;
        BotPerformancePoint {
            timestamp,
            value,
            pnl,
            pnl_percent: pnl_percent(pnl, self.allocated_fund),
            event,
        }
    }

    /// Append a performance point.
    ///
    /// Lifecycle points (with an event) are always recorded. Periodic
    /// points are dropped when the previous point is younger than
    /// `min_interval_ms`. Timestamps never go backwards.
    pub fn record_performance(&mut self, mut point: BotPerformancePoint, min_interval_ms: i64) -> bool {
        if let Some(last) = self.performance_history.last() {
            if point.event.is_none() && point.timestamp - last.timestamp < min_interval_ms {
                return false;
            }
            point.timestamp = point.timestamp.max(last.timestamp);
        }
        self.performance_history.push(point);
        true
    }

    /// Add `quantity` of `symbol` to the holdings.
    pub fn add_holding(&mut self, symbol: &str, quantity: f64) {
        if quantity <= 0.0 {
            return;
        }
        *self.holdings.entry(symbol.to_string()).or_insert(0.0) += quantity;
    }

    /// Remove up to `quantity` of `symbol`, returning the amount actually
    /// removed. Drops the entry once it reaches zero.
    pub fn remove_holding(&mut self, symbol: &str, quantity: f64) -> f64 {
        let held = self.holdings.get(symbol).copied().unwrap_or(0.0);
        let removed = quantity.min(held).max(0.0);
        let remaining = held - removed;
        if remaining <= 0.0 {
            self.holdings.remove(symbol);
        } else {
            self.holdings.insert(symbol.to_string(), remaining);
        }
        removed
    }
}

/// Read-only view of a bot's performance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotPerformance {
    pub bot_id: String,
    pub strategy: StrategyKind,
    pub status: BotStatus,
    pub allocated_fund: f64,
    pub current_value: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub holdings: Holdings,
    pub history: Vec<BotPerformancePoint>,
}

impl From<&Bot> for BotPerformance {
    fn from(bot: &Bot) -> Self {
        Self {
            bot_id: bot.id.clone(),
            strategy: bot.strategy,
            status: bot.status,
            allocated_fund: bot.allocated_fund,
            current_value: bot.current_value,
            pnl: bot.pnl(),
            pnl_percent: bot.pnl_percent(),
            holdings: bot.holdings.clone(),
            history: bot.performance_history.clone(),
        }
    }
}

// =============================================================================
// Account
// =============================================================================

/// One virtual account per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub user_id: String,
    /// Uncommitted USD.
    pub cash_balance: f64,
    /// Balance at creation. Never changes; baseline for account PnL.
    pub initial_balance: f64,
    pub bots: Vec<Bot>,
    pub trade_history: Vec<Trade>,
    pub performance_history: Vec<AccountPerformancePoint>,
    pub created_at: i64,
    /// Incremented on every committed mutation; guards persistence order.
    #[serde(default)]
    pub revision: u64,
}

impl Account {
    /// Create an account with its opening performance point.
    pub fn new(user_id: &str, initial_balance: f64, now: i64) -> Self {
        let mut account = Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            cash_balance: initial_balance,
            initial_balance,
            bots: Vec::new(),
            trade_history: Vec::new(),
            performance_history: Vec::new(),
            created_at: now,
            revision: 0,
        };
        let opening = account.performance_snapshot(now);
        account.performance_history.push(opening);
        account
    }

    /// Sum of active bot values. Stopped bots hold no assets; their value
    /// was returned to cash.
    pub fn portfolio_value(&self) -> f64 {
        self.bots
            .iter()
            .filter(|b| b.is_active())
            .map(|b| b.current_value)
            .sum()
    }

    pub fn total_value(&self) -> f64 {
        self.cash_balance + self.portfolio_value()
    }

    /// Account PnL against the initial balance, never against the sum of
    /// allocated funds (cash already reflects those deductions).
    pub fn pnl(&self) -> f64 {
        self.total_value() - self.initial_balance
    }

    pub fn pnl_percent(&self) -> f64 {
        pnl_percent(self.pnl(), self.initial_balance)
    }

    pub fn bot(&self, bot_id: &str) -> Option<&Bot> {
        self.bots.iter().find(|b| b.id == bot_id)
    }

    pub fn bot_mut(&mut self, bot_id: &str) -> Option<&mut Bot> {
        self.bots.iter_mut().find(|b| b.id == bot_id)
    }

    /// Aggregate holdings across active bots.
    pub fn aggregated_holdings(&self) -> Holdings {
        let mut holdings = Holdings::new();
        for bot in self.bots.iter().filter(|b| b.is_active()) {
            for (symbol, quantity) in &bot.holdings {
                *holdings.entry(symbol.clone()).or_insert(0.0) += quantity;
            }
        }
        holdings
    }

    /// Timestamp for the next trade: `now`, but never earlier than the last
    /// logged trade.
    pub fn next_trade_timestamp(&self, now: i64) -> i64 {
        self.trade_history
            .last()
            .map(|t| now.max(t.timestamp))
            .unwrap_or(now)
    }

    /// Compute the account performance point at `now`.
    pub fn performance_snapshot(&self, now: i64) -> AccountPerformancePoint {
        let portfolio_value = self.portfolio_value();
        let total_value = self.cash_balance + portfolio_value;
        let pnl = total_value - self.initial_balance;
        AccountPerformancePoint {
            timestamp: now,
            balance: self.cash_balance,
            portfolio_value,
            total_value,
            pnl,
            pnl_percent: pnl_percent(pnl, self.initial_balance),
        }
    }

    /// Append a performance point unless the previous one is younger than
    /// `min_interval_ms`.
    pub fn record_performance(&mut self, now: i64, min_interval_ms: i64) -> Option<AccountPerformancePoint> {
        let mut point = self.performance_snapshot(now);
        if let Some(last) = self.performance_history.last() {
            if now - last.timestamp < min_interval_ms {
                return None;
            }
            point.timestamp = point.timestamp.max(last.timestamp);
        }
        self.performance_history.push(point.clone());
        Some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn bot_with(holdings: &[(&str, f64)], allocated: f64) -> Bot {
        Bot {
            id: "bot_test".to_string(),
            strategy: StrategyKind::EqualWeight,
            risk_profile: 50,
            status: BotStatus::Active,
            allocated_fund: allocated,
            current_value: allocated,
            holdings: holdings.iter().map(|(s, q)| (s.to_string(), *q)).collect(),
            deployment_prices: BTreeMap::new(),
            mark_prices: BTreeMap::new(),
            liquidation_value: None,
            performance_history: Vec::new(),
            created_at: 0,
            last_rebalanced_at: None,
        }
    }

    #[test]
    fn test_new_account_opening_point() {
        let account = Account::new("user-1", 100_000.0, 1_000);
        assert_eq!(account.cash_balance, 100_000.0);
        assert_eq!(account.initial_balance, 100_000.0);
        assert_eq!(account.performance_history.len(), 1);
        assert_eq!(account.performance_history[0].total_value, 100_000.0);
        assert_eq!(account.performance_history[0].pnl, 0.0);
    }

    #[test]
    fn test_holdings_value_and_missing_price() {
        let bot = bot_with(&[("BTC", 0.1), ("ETH", 2.0)], 10_000.0);
        let prices: HashMap<&str, f64> = [("BTC", 50_000.0), ("ETH", 2_500.0)].into_iter().collect();
        let value = bot.holdings_value(|s| prices.get(s).copied()).unwrap();
        assert!((value - 10_000.0).abs() < 1e-9);

        let partial: HashMap<&str, f64> = [("BTC", 50_000.0)].into_iter().collect();
        assert_eq!(bot.holdings_value(|s| partial.get(s).copied()), Err("ETH".to_string()));
    }

    #[test]
    fn test_weights_in_percentage_points() {
        let bot = bot_with(&[("BTC", 0.12), ("ETH", 1.6)], 10_000.0);
        let prices: HashMap<&str, f64> = [("BTC", 50_000.0), ("ETH", 2_500.0)].into_iter().collect();
        let weights = bot.weights_at(|s| prices.get(s).copied()).unwrap();
        assert!((weights["BTC"] - 60.0).abs() < 1e-9);
        assert!((weights["ETH"] - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_remove_holding_clamps_and_drops_entry() {
        let mut bot = bot_with(&[("BTC", 0.5)], 10_000.0);
        let removed = bot.remove_holding("BTC", 2.0);
        assert_eq!(removed, 0.5);
        assert!(!bot.holdings.contains_key("BTC"));
        assert_eq!(bot.remove_holding("ETH", 1.0), 0.0);
    }

    #[test]
    fn test_bot_performance_gate() {
        let mut bot = bot_with(&[("BTC", 0.1)], 10_000.0);
        let first = bot.performance_point(0, 10_000.0, Some(PerformanceEvent::Deployed));
        assert!(bot.record_performance(first, 3_600_000));
        let early = bot.performance_point(60_000, 10_100.0, None);
        assert!(!bot.record_performance(early, 3_600_000));
        let event = bot.performance_point(60_000, 10_100.0, Some(PerformanceEvent::Stopped));
        assert!(bot.record_performance(event, 3_600_000));
        let later = bot.performance_point(3_700_000, 10_200.0, None);
        assert!(bot.record_performance(later, 3_600_000));
        assert_eq!(bot.performance_history.len(), 3);
        assert_eq!(bot.performance_history[2].pnl, 200.0);
    }

    #[test]
    fn test_account_performance_gate() {
        let mut account = Account::new("user-1", 100_000.0, 1_000);
        account.cash_balance -= 10_000.0;
        account.bots.push(bot_with(&[("BTC", 0.1)], 10_000.0));
        account.bots[0].current_value = 10_500.0;

        assert!(account.record_performance(1_000 + 3_599_999, 3_600_000).is_none());
        assert_eq!(account.performance_history.len(), 1);

        let point = account.record_performance(1_000 + 3_600_000, 3_600_000).unwrap();
        assert_eq!(point.timestamp, 3_601_000);
        assert_eq!(point.balance, 90_000.0);
        assert_eq!(point.portfolio_value, 10_500.0);
        assert_eq!(point.pnl, 500.0);
        assert_eq!(account.performance_history.len(), 2);
        assert_eq!(account.performance_history[1], point);
    }

    #[test]
    fn test_account_pnl_ignores_allocations() {
        let mut account = Account::new("user-1", 100_000.0, 0);
        account.cash_balance -= 10_000.0;
        account.bots.push(bot_with(&[("BTC", 0.1)], 10_000.0));
        assert!((account.pnl()).abs() < 1e-9);
        account.bots[0].current_value = 10_300.0;
        assert!((account.pnl() - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_next_trade_timestamp_monotonic() {
        let mut account = Account::new("user-1", 1_000.0, 0);
        account
            .trade_history
            .push(Trade::new("bot", "BTC", TradeAction::Buy, 1.0, 10.0, 5_000));
        assert_eq!(account.next_trade_timestamp(4_000), 5_000);
        assert_eq!(account.next_trade_timestamp(6_000), 6_000);
    }
}
