//! Virtual Portfolio Ledger
//!
//! Owns every account and enforces the ledger invariants:
//! - Deploying moves exactly `allocated_fund` from cash into holdings
//! - Stopping moves the liquidation value back to cash and empties holdings
//! - Account PnL is measured against the initial balance, bot PnL against
//!   the allocated fund
//! - Trade and performance history are append-only with monotonic
//!   timestamps
//!
//! Concurrency: each account sits behind its own async mutex. External data
//! (prices, signals) is fetched before the lock is taken; the mutation is
//! computed in full and committed only if nothing failed. Persistence runs
//! after the lock is released and is revision-guarded by the store.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::services::drift::DEFAULT_DRIFT_THRESHOLD_PCT;
use crate::services::market::MarketData;
use crate::services::planner::build_plan;
use crate::services::recommendation::{RecommendationSelector, DEFAULT_COST_RATE};
use crate::services::risk::assess_risk;
use crate::services::store::{LedgerStore, StoreError};
use crate::services::strategy::compute_target_weights;
use crate::types::{
    Account, AccountPerformancePoint, Bot, BotPerformance, BotStatus, Holdings, PerformanceEvent,
    PriceSnapshot, Recommendation, RiskAssessment, SignalSnapshot, StrategyKind, Trade,
    TradeAction,
};

/// Ledger operation errors. A failed operation leaves state unchanged,
/// except `Storage`, where the in-memory mutation stands.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Bot not found: {0}")]
    BotNotFound(String),

    #[error("Insufficient funds: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Cannot {operation} bot {bot_id} while {status}")]
    InvalidState {
        bot_id: String,
        status: BotStatus,
        operation: String,
    },

    #[error("No usable price for {0}")]
    PricingUnavailable(String),

    #[error("Recommendation failed: {0}")]
    RecommendationFailed(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LedgerError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::BotNotFound(_) => "BOT_NOT_FOUND",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::InvalidState { .. } => "INVALID_STATE",
            LedgerError::PricingUnavailable(_) => "PRICING_UNAVAILABLE",
            LedgerError::RecommendationFailed(_) => "RECOMMENDATION_FAILED",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }

    fn invalid_state(bot: &Bot, operation: &str) -> Self {
        LedgerError::InvalidState {
            bot_id: bot.id.clone(),
            status: bot.status,
            operation: operation.to_string(),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger tuning.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Tradable symbols used for deployment.
    pub universe: Vec<String>,
    pub drift_threshold_pct: f64,
    /// Transaction cost as a fraction of traded notional.
    pub cost_rate: f64,
    /// Minimum spacing of periodic performance records.
    pub snapshot_interval_secs: u64,
    /// Balance used when an account is created without one.
    pub default_initial_balance: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            universe: ["BTC", "ETH", "ADA", "DOT", "USDC"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            drift_threshold_pct: DEFAULT_DRIFT_THRESHOLD_PCT,
            cost_rate: DEFAULT_COST_RATE,
            snapshot_interval_secs: 3600,
            default_initial_balance: 100_000.0,
        }
    }
}

/// Result of revaluing one bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevalueOutcome {
    pub bot_id: String,
    /// Value of the holdings after the revaluation (and rebalance, if any).
    pub value: f64,
    pub rebalanced: bool,
    pub trades: Vec<Trade>,
    pub recommendation: Recommendation,
}

/// Holdings bought with a fund at one price snapshot.
struct Allocation {
    holdings: Holdings,
    prices: BTreeMap<String, f64>,
    value: f64,
}

type AccountHandle = Arc<Mutex<Account>>;

/// The ledger of virtual accounts.
pub struct Ledger {
    accounts: DashMap<String, AccountHandle>,
    store: Arc<dyn LedgerStore>,
    market: Arc<MarketData>,
    selector: RecommendationSelector,
    config: LedgerConfig,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new(config: LedgerConfig, market: Arc<MarketData>, store: Arc<dyn LedgerStore>) -> Self {
        let universe = normalize_symbols(&config.universe);
        let config = LedgerConfig { universe, ..config };
        Self {
            accounts: DashMap::new(),
            store,
            market,
            selector: RecommendationSelector::new(config.drift_threshold_pct, config.cost_rate),
            config,
        }
    }

    /// Create a ledger holding every account in `store`.
    pub fn load(
        config: LedgerConfig,
        market: Arc<MarketData>,
        store: Arc<dyn LedgerStore>,
    ) -> LedgerResult<Self> {
        let accounts = store.load_all()?;
        let ledger = Self::new(config, market, store);
        for account in accounts {
            ledger
                .accounts
                .insert(account.user_id.clone(), Arc::new(Mutex::new(account)));
        }
        info!("Ledger loaded {} accounts", ledger.accounts.len());
        Ok(ledger)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn market(&self) -> &Arc<MarketData> {
        &self.market
    }

    pub fn selector(&self) -> &RecommendationSelector {
        &self.selector
    }

    /// User ids of every account, sorted.
    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.accounts.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn handle(&self, user_id: &str) -> LedgerResult<AccountHandle> {
        self.accounts
            .get(user_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.to_string()))
    }

    fn snapshot_interval_ms(&self) -> i64 {
        (self.config.snapshot_interval_secs as i64).saturating_mul(1000)
    }

    fn persist(&self, account: &Account) -> LedgerResult<()> {
        self.store.save(account)?;
        Ok(())
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create an account, or return the existing one unchanged.
    pub async fn create_account(
        &self,
        user_id: &str,
        initial_balance: Option<f64>,
    ) -> LedgerResult<Account> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(LedgerError::InvalidAmount("user id must not be empty".to_string()));
        }
        let balance = initial_balance.unwrap_or(self.config.default_initial_balance);

        // An existing account is returned whatever balance was asked for
        let (handle, created) = match self.accounts.entry(user_id.to_string()) {
            Entry::Occupied(e) => (e.get().clone(), false),
            Entry::Vacant(e) => {
                if !balance.is_finite() || balance < 0.0 {
                    return Err(LedgerError::InvalidAmount(format!(
                        "initial balance must be a non-negative number, got {}",
                        balance
                    )));
                }
                let mut account = Account::new(user_id, balance, now_ms());
                account.revision = 1;
                (e.insert(Arc::new(Mutex::new(account))).value().clone(), true)
            }
        };

        let snapshot = handle.lock().await.clone();
        if created {
            info!("Created account {} with ${:.2}", user_id, balance);
            self.persist(&snapshot)?;
        } else {
            debug!("Account {} already exists", user_id);
        }
        Ok(snapshot)
    }

    pub async fn get_account(&self, user_id: &str) -> LedgerResult<Account> {
        let handle = self.handle(user_id)?;
        let account = handle.lock().await;
        Ok(account.clone())
    }

    // =========================================================================
    // Bot lifecycle
    // =========================================================================

    /// Deploy a new bot funded with `allocated_fund` from the account's cash.
    pub async fn deploy_bot(
        &self,
        user_id: &str,
        strategy: StrategyKind,
        risk_profile: u8,
        allocated_fund: f64,
    ) -> LedgerResult<Bot> {
        if risk_profile > 100 {
            return Err(LedgerError::InvalidAmount(format!(
                "risk profile must be 0-100, got {}",
                risk_profile
            )));
        }
        if !allocated_fund.is_finite() || allocated_fund <= 0.0 {
            return Err(LedgerError::InvalidAmount(format!(
                "allocated fund must be positive, got {}",
                allocated_fund
            )));
        }
        let handle = self.handle(user_id)?;

        let prices = self.market.prices(&self.config.universe).await;
        let signals = self.market.signals(&self.config.universe).await;
        let allocation = self.allocate(allocated_fund, strategy, risk_profile, &prices, &signals)?;

        let (bot, snapshot) = {
            let mut account = handle.lock().await;
            if allocated_fund > account.cash_balance {
                return Err(LedgerError::InsufficientFunds {
                    needed: allocated_fund,
                    available: account.cash_balance,
                });
            }

            let now = now_ms();
            let mut bot = Bot {
                id: Bot::generate_id(strategy),
                strategy,
                risk_profile,
                status: BotStatus::Active,
                allocated_fund,
                current_value: allocation.value,
                holdings: allocation.holdings,
                deployment_prices: allocation.prices.clone(),
                mark_prices: allocation.prices,
                liquidation_value: None,
                performance_history: Vec::new(),
                created_at: now,
                last_rebalanced_at: None,
            };
            let point = bot.performance_point(now, bot.current_value, Some(PerformanceEvent::Deployed));
            bot.record_performance(point, 0);

            let trades = position_trades(&bot, TradeAction::Buy, account.next_trade_timestamp(now));
            account.trade_history.extend(trades);
            account.cash_balance -= allocated_fund;
            account.bots.push(bot.clone());
            account.record_performance(now, self.snapshot_interval_ms());

            (bot, commit(&mut account))
        };

        info!(
            "Deployed {} bot {} for {} with ${:.2}",
            strategy.key(),
            bot.id,
            user_id,
            allocated_fund
        );
        self.persist(&snapshot)?;
        Ok(bot)
    }

    /// Stop a bot, returning the liquidation value credited to cash.
    pub async fn stop_bot(&self, user_id: &str, bot_id: &str) -> LedgerResult<f64> {
        let handle = self.handle(user_id)?;

        let held: Vec<String> = {
            let account = handle.lock().await;
            let bot = find_bot(&account, bot_id)?;
            if !bot.is_active() {
                return Err(LedgerError::invalid_state(bot, "stop"));
            }
            bot.holdings.keys().cloned().collect()
        };
        let prices = self.market.prices(&held).await;

        let (value, snapshot) = {
            let mut account = handle.lock().await;
            let now = now_ms();
            let trade_ts = account.next_trade_timestamp(now);

            let bot = find_bot(&account, bot_id)?;
            if !bot.is_active() {
                return Err(LedgerError::invalid_state(bot, "stop"));
            }
            let value = bot
                .holdings_value(|s| prices.price(s))
                .map_err(LedgerError::PricingUnavailable)?;
            let trades = liquidation_trades(bot, &prices, trade_ts);

            let bot = find_bot_mut(&mut account, bot_id)?;
            bot.status = BotStatus::Stopped;
            bot.current_value = value;
            bot.liquidation_value = Some(value);
            bot.mark_prices = bot
                .holdings
                .keys()
                .filter_map(|s| prices.price(s).map(|p| (s.clone(), p)))
                .collect();
            bot.holdings.clear();
            let point = bot.performance_point(now, value, Some(PerformanceEvent::Stopped));
            bot.record_performance(point, 0);

            account.trade_history.extend(trades);
            account.cash_balance += value;
            account.record_performance(now, self.snapshot_interval_ms());

            (value, commit(&mut account))
        };

        info!("Stopped bot {} for {}: ${:.2} returned to cash", bot_id, user_id, value);
        self.persist(&snapshot)?;
        Ok(value)
    }

    /// Resume a stopped bot, re-investing its liquidation value (or its
    /// allocated fund if it was never liquidated) at fresh prices.
    pub async fn resume_bot(&self, user_id: &str, bot_id: &str) -> LedgerResult<Bot> {
        let handle = self.handle(user_id)?;

        let (strategy, risk_profile, amount) = {
            let account = handle.lock().await;
            let bot = find_bot(&account, bot_id)?;
            if bot.status != BotStatus::Stopped {
                return Err(LedgerError::invalid_state(bot, "resume"));
            }
            (
                bot.strategy,
                bot.risk_profile,
                bot.liquidation_value.unwrap_or(bot.allocated_fund),
            )
        };

        let prices = self.market.prices(&self.config.universe).await;
        let signals = self.market.signals(&self.config.universe).await;
        let allocation = self.allocate(amount, strategy, risk_profile, &prices, &signals)?;

        let (bot, snapshot) = {
            let mut account = handle.lock().await;
            let now = now_ms();
            let trade_ts = account.next_trade_timestamp(now);
            let available = account.cash_balance;

            let bot = find_bot_mut(&mut account, bot_id)?;
            if bot.status != BotStatus::Stopped {
                return Err(LedgerError::invalid_state(bot, "resume"));
            }
            if amount > available {
                return Err(LedgerError::InsufficientFunds {
                    needed: amount,
                    available,
                });
            }

            bot.status = BotStatus::Active;
            bot.holdings = allocation.holdings;
            bot.deployment_prices = allocation.prices.clone();
            bot.mark_prices = allocation.prices;
            bot.current_value = allocation.value;
            bot.liquidation_value = None;
            let point = bot.performance_point(now, bot.current_value, Some(PerformanceEvent::Resumed));
            bot.record_performance(point, 0);

            let bot = bot.clone();
            account
                .trade_history
                .extend(position_trades(&bot, TradeAction::Buy, trade_ts));
            account.cash_balance -= amount;
            account.record_performance(now, self.snapshot_interval_ms());

            (bot, commit(&mut account))
        };

        info!("Resumed bot {} for {} with ${:.2}", bot_id, user_id, amount);
        self.persist(&snapshot)?;
        Ok(bot)
    }

    /// Delete a stopped bot. Its trades stay in the account history.
    pub async fn delete_bot(&self, user_id: &str, bot_id: &str) -> LedgerResult<()> {
        let handle = self.handle(user_id)?;
        let snapshot = {
            let mut account = handle.lock().await;
            let bot = find_bot(&account, bot_id)?;
            if bot.status != BotStatus::Stopped {
                return Err(LedgerError::invalid_state(bot, "delete"));
            }
            account.bots.retain(|b| b.id != bot_id);
            commit(&mut account)
        };

        info!("Deleted bot {} for {}", bot_id, user_id);
        self.persist(&snapshot)
    }

    // =========================================================================
    // Trades
    // =========================================================================

    /// Record a manual trade against an active bot's holdings.
    ///
    /// Sells larger than the holding are clamped to the holding, so selling
    /// an asset the bot does not hold records a zero-quantity trade. Cash is
    /// not touched; a held asset is marked at the trade price.
    pub async fn execute_trade(
        &self,
        user_id: &str,
        bot_id: &str,
        asset: &str,
        action: TradeAction,
        amount: f64,
        price: f64,
    ) -> LedgerResult<Trade> {
        let asset = asset.trim().to_uppercase();
        if asset.is_empty() {
            return Err(LedgerError::InvalidAmount("asset must not be empty".to_string()));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(format!(
                "trade amount must be positive, got {}",
                amount
            )));
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(LedgerError::PricingUnavailable(asset));
        }
        let handle = self.handle(user_id)?;

        let (trade, snapshot) = {
            let mut account = handle.lock().await;
            let now = now_ms();
            let trade_ts = account.next_trade_timestamp(now);

            let bot = find_bot_mut(&mut account, bot_id)?;
            if !bot.is_active() {
                return Err(LedgerError::invalid_state(bot, "trade"));
            }

            let quantity = match action {
                TradeAction::Buy => {
                    bot.add_holding(&asset, amount);
                    amount
                }
                TradeAction::Sell => {
                    let removed = bot.remove_holding(&asset, amount);
                    if removed < amount {
                        warn!(
                            "Clamped sell of {} {} to held {} for bot {}",
                            amount, asset, removed, bot_id
                        );
                    }
                    removed
                }
            };

            if bot.holdings.contains_key(&asset) {
                bot.mark_prices.insert(asset.clone(), price);
            }
            bot.current_value = marked_value(bot);

            let trade = Trade::new(bot_id, &asset, action, quantity, price, trade_ts);
            account.trade_history.push(trade.clone());
            (trade, commit(&mut account))
        };

        debug!(
            "Trade {} {} {} @ {} for bot {}",
            trade.action, trade.quantity, trade.asset, trade.price, bot_id
        );
        self.persist(&snapshot)?;
        Ok(trade)
    }

    // =========================================================================
    // Revaluation
    // =========================================================================

    /// Revalue a bot at `prices` and rebalance it if its strategy's target
    /// has drifted past the threshold.
    ///
    /// Only the bot's own strategy is scored, over its holdings plus its
    /// strategy basket. A rebalance replaces the holdings with the target
    /// allocation of the bot's own current value and logs every planned trade.
    pub async fn revalue_and_maybe_rebalance(
        &self,
        user_id: &str,
        bot_id: &str,
        prices: &PriceSnapshot,
        signals: &SignalSnapshot,
    ) -> LedgerResult<RevalueOutcome> {
        let handle = self.handle(user_id)?;

        let (outcome, snapshot) = {
            let mut account = handle.lock().await;
            let now = now_ms();
            let trade_ts = account.next_trade_timestamp(now);
            let interval = self.snapshot_interval_ms();

            let bot = find_bot(&account, bot_id)?;
            if !bot.is_active() {
                return Err(LedgerError::invalid_state(bot, "revalue"));
            }

            let value = bot
                .holdings_value(|s| prices.price(s))
                .map_err(LedgerError::PricingUnavailable)?;
            let current = bot
                .weights_at(|s| prices.price(s))
                .map_err(LedgerError::PricingUnavailable)?;

            let basket = self.basket(bot.strategy);
            let symbols: Vec<String> = bot
                .holdings
                .keys()
                .chain(basket.iter())
                .filter(|s| prices.price(s).is_some())
                .cloned()
                .collect::<BTreeSet<String>>()
                .into_iter()
                .collect();

            let recommendation = self.selector.recommend_among(
                &[bot.strategy],
                &current,
                &symbols,
                &signals.signals,
                bot.risk_profile,
                now,
            );

            let mut trades = Vec::new();
            let mut new_holdings = None;
            if recommendation.action.is_rebalance() && value > 0.0 {
                let plan = build_plan(&current, &recommendation.target_weights, prices, value);
                let mut holdings = Holdings::new();
                for (symbol, weight) in &recommendation.target_weights {
                    if let Some(price) = prices.price(symbol) {
                        let quantity = value * weight / 100.0 / price;
                        if quantity > 0.0 {
                            holdings.insert(symbol.clone(), quantity);
                        }
                    }
                }
                trades = plan
                    .iter()
                    .map(|i| Trade::new(bot_id, &i.symbol, i.action, i.amount, i.price, trade_ts))
                    .collect();
                new_holdings = Some(holdings);
            }

            let bot = find_bot_mut(&mut account, bot_id)?;
            let rebalanced = new_holdings.is_some();
            if let Some(holdings) = new_holdings {
                bot.holdings = holdings;
                bot.last_rebalanced_at = Some(now);
            }
            bot.mark_prices = bot
                .holdings
                .keys()
                .filter_map(|s| prices.price(s).map(|p| (s.clone(), p)))
                .collect();
            bot.current_value = marked_value(bot);
            let point = bot.performance_point(now, bot.current_value, None);
            bot.record_performance(point, interval);

            let outcome = RevalueOutcome {
                bot_id: bot_id.to_string(),
                value: bot.current_value,
                rebalanced,
                trades: trades.clone(),
                recommendation,
            };
            account.trade_history.extend(trades);
            (outcome, commit(&mut account))
        };

        if outcome.rebalanced {
            info!(
                "Rebalanced bot {} for {} with {} trades",
                bot_id,
                user_id,
                outcome.trades.len()
            );
        }
        self.persist(&snapshot)?;
        Ok(outcome)
    }

    /// Fetch fresh market data and revalue one bot.
    pub async fn revalue_bot(&self, user_id: &str, bot_id: &str) -> LedgerResult<RevalueOutcome> {
        let held = self.held_symbols(user_id, bot_id).await?;
        let symbols = merge_symbols(&held, &self.config.universe);
        let prices = self.market.prices(&symbols).await;
        let signals = self.market.signals(&symbols).await;
        self.revalue_and_maybe_rebalance(user_id, bot_id, &prices, &signals)
            .await
    }

    /// Append a periodic account performance record unless the last one is
    /// younger than the snapshot interval.
    pub async fn append_performance_snapshot(
        &self,
        user_id: &str,
    ) -> LedgerResult<Option<AccountPerformancePoint>> {
        let handle = self.handle(user_id)?;
        let (point, snapshot) = {
            let mut account = handle.lock().await;
            match account.record_performance(now_ms(), self.snapshot_interval_ms()) {
                Some(point) => (Some(point), Some(commit(&mut account))),
                None => (None, None),
            }
        };
        if let Some(snapshot) = snapshot {
            self.persist(&snapshot)?;
        }
        Ok(point)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_bot_performance(
        &self,
        user_id: &str,
        bot_id: &str,
    ) -> LedgerResult<BotPerformance> {
        let handle = self.handle(user_id)?;
        let account = handle.lock().await;
        let bot = find_bot(&account, bot_id)?;
        Ok(BotPerformance::from(bot))
    }

    /// Recommend a strategy for the account's aggregated holdings.
    pub async fn get_recommendation(
        &self,
        user_id: &str,
        risk_profile: u8,
    ) -> LedgerResult<Recommendation> {
        if risk_profile > 100 {
            return Err(LedgerError::InvalidAmount(format!(
                "risk profile must be 0-100, got {}",
                risk_profile
            )));
        }
        let holdings = self.get_account(user_id).await?.aggregated_holdings();
        let held: Vec<String> = holdings.keys().cloned().collect();
        let symbols = merge_symbols(&held, &self.config.universe);

        let prices = self.market.prices(&symbols).await;
        let signals = self.market.signals(&symbols).await;
        let current = weights_of(&holdings, &prices)?;
        let priced: Vec<String> = symbols
            .into_iter()
            .filter(|s| prices.price(s).is_some())
            .collect();

        Ok(self.selector.recommend(
            &current,
            &priced,
            &signals.signals,
            risk_profile,
            now_ms(),
        ))
    }

    /// Risk assessment of the account's aggregated holdings.
    pub async fn get_risk_assessment(&self, user_id: &str) -> LedgerResult<RiskAssessment> {
        let holdings = self.get_account(user_id).await?.aggregated_holdings();
        let symbols: Vec<String> = if holdings.is_empty() {
            self.config.universe.clone()
        } else {
            holdings.keys().cloned().collect()
        };

        let prices = self.market.prices(&symbols).await;
        let signals = self.market.signals(&symbols).await;
        let weights = weights_of(&holdings, &prices)?;
        Ok(assess_risk(&weights, &signals.signals))
    }

    /// Ids of the account's active bots.
    pub async fn active_bot_ids(&self, user_id: &str) -> LedgerResult<Vec<String>> {
        let handle = self.handle(user_id)?;
        let account = handle.lock().await;
        Ok(account
            .bots
            .iter()
            .filter(|b| b.is_active())
            .map(|b| b.id.clone())
            .collect())
    }

    /// Universe plus every symbol held by any active bot.
    pub async fn tracked_symbols(&self) -> Vec<String> {
        let handles: Vec<AccountHandle> = self.accounts.iter().map(|e| e.value().clone()).collect();
        let mut held = Vec::new();
        for handle in handles {
            let account = handle.lock().await;
            held.extend(account.aggregated_holdings().into_keys());
        }
        merge_symbols(&held, &self.config.universe)
    }

    async fn held_symbols(&self, user_id: &str, bot_id: &str) -> LedgerResult<Vec<String>> {
        let handle = self.handle(user_id)?;
        let account = handle.lock().await;
        let bot = find_bot(&account, bot_id)?;
        Ok(bot.holdings.keys().cloned().collect())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// The strategy's default basket restricted to the configured universe.
    /// Falls back to the whole universe when the two share no symbol.
    fn basket(&self, strategy: StrategyKind) -> Vec<String> {
        let basket: Vec<String> = strategy
            .default_symbols()
            .iter()
            .map(|s| s.to_string())
            .filter(|s| self.config.universe.contains(s))
            .collect();
        if basket.is_empty() {
            self.config.universe.clone()
        } else {
            basket
        }
    }

    /// Convert `amount` into holdings of `strategy`'s target weights over the
    /// priced symbols of its basket, all at one price snapshot.
    fn allocate(
        &self,
        amount: f64,
        strategy: StrategyKind,
        risk_profile: u8,
        prices: &PriceSnapshot,
        signals: &SignalSnapshot,
    ) -> LedgerResult<Allocation> {
        let basket = self.basket(strategy);
        let priced: Vec<String> = basket
            .iter()
            .filter(|s| prices.price(s).is_some())
            .cloned()
            .collect();
        if priced.is_empty() {
            let symbol = basket
                .first()
                .cloned()
                .unwrap_or_else(|| "universe".to_string());
            return Err(LedgerError::PricingUnavailable(symbol));
        }

        let target = compute_target_weights(strategy, &priced, &signals.signals, risk_profile);
        if target.is_empty() {
            return Err(LedgerError::RecommendationFailed(format!(
                "strategy {} produced no target weights",
                strategy.key()
            )));
        }

        let mut holdings = Holdings::new();
        let mut used_prices = BTreeMap::new();
        let mut value = 0.0;
        for (symbol, weight) in &target {
            let price = match prices.price(symbol) {
                Some(p) => p,
                None => continue,
            };
            let quantity = amount * weight / 100.0 / price;
            if quantity > 0.0 {
                holdings.insert(symbol.clone(), quantity);
                used_prices.insert(symbol.clone(), price);
                value += quantity * price;
            }
        }

        Ok(Allocation {
            holdings,
            prices: used_prices,
            value,
        })
    }
}

/// Bump the revision and take the snapshot to persist.
fn commit(account: &mut Account) -> Account {
    account.revision += 1;
    account.clone()
}

fn find_bot<'a>(account: &'a Account, bot_id: &str) -> LedgerResult<&'a Bot> {
    account
        .bot(bot_id)
        .ok_or_else(|| LedgerError::BotNotFound(bot_id.to_string()))
}

fn find_bot_mut<'a>(account: &'a mut Account, bot_id: &str) -> LedgerResult<&'a mut Bot> {
    account
        .bot_mut(bot_id)
        .ok_or_else(|| LedgerError::BotNotFound(bot_id.to_string()))
}

/// Value of the holdings at their mark prices, falling back to the
/// deployment price for symbols never marked.
fn marked_value(bot: &Bot) -> f64 {
    bot.holdings
        .iter()
        .map(|(symbol, quantity)| {
            let price = bot
                .mark_prices
                .get(symbol)
                .or_else(|| bot.deployment_prices.get(symbol))
                .copied()
                .unwrap_or(0.0);
            quantity * price
        })
        .sum()
}

/// One trade per holding at the bot's mark prices.
fn position_trades(bot: &Bot, action: TradeAction, timestamp: i64) -> Vec<Trade> {
    bot.holdings
        .iter()
        .filter_map(|(symbol, quantity)| {
            let price = bot.mark_prices.get(symbol)?;
            Some(Trade::new(&bot.id, symbol, action, *quantity, *price, timestamp))
        })
        .collect()
}

fn liquidation_trades(bot: &Bot, prices: &PriceSnapshot, timestamp: i64) -> Vec<Trade> {
    bot.holdings
        .iter()
        .filter_map(|(symbol, quantity)| {
            let price = prices.price(symbol)?;
            Some(Trade::new(&bot.id, symbol, TradeAction::Sell, *quantity, price, timestamp))
        })
        .collect()
}

/// Weights (percentage points) of `holdings` at `prices`.
fn weights_of(holdings: &Holdings, prices: &PriceSnapshot) -> LedgerResult<BTreeMap<String, f64>> {
    let mut values = BTreeMap::new();
    let mut total = 0.0;
    for (symbol, quantity) in holdings {
        let price = prices
            .price(symbol)
            .ok_or_else(|| LedgerError::PricingUnavailable(symbol.clone()))?;
        let value = quantity * price;
        total += value;
        values.insert(symbol.clone(), value);
    }
    if total <= 0.0 {
        return Ok(BTreeMap::new());
    }
    Ok(values
        .into_iter()
        .map(|(s, v)| (s, v / total * 100.0))
        .collect())
}

fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    merge_symbols(symbols, &[])
}

/// Uppercased union of both lists, first occurrence order kept.
fn merge_symbols(first: &[String], second: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for symbol in first.iter().chain(second.iter()) {
        let upper = symbol.trim().to_uppercase();
        if !upper.is_empty() && !out.contains(&upper) {
            out.push(upper);
        }
    }
    out
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LedgerError::InsufficientFunds {
                needed: 1.0,
                available: 0.0
            }
            .code(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(LedgerError::BotNotFound("b".into()).code(), "BOT_NOT_FOUND");
        assert_eq!(
            LedgerError::PricingUnavailable("BTC".into()).to_string(),
            "No usable price for BTC"
        );
    }

    #[test]
    fn test_merge_symbols() {
        let merged = merge_symbols(
            &["eth".to_string(), "BTC".to_string()],
            &["BTC".to_string(), "ADA".to_string(), " ".to_string()],
        );
        assert_eq!(merged, vec!["ETH", "BTC", "ADA"]);
    }

    #[test]
    fn test_weights_of_requires_prices() {
        let holdings: Holdings = [("BTC".to_string(), 0.1), ("ETH".to_string(), 2.0)]
            .into_iter()
            .collect();
        let raw = [("BTC".to_string(), 50_000.0), ("ETH".to_string(), 2_500.0)]
            .into_iter()
            .collect();
        let prices = PriceSnapshot::new(raw, &[], 0, false);
        let weights = weights_of(&holdings, &prices).unwrap();
        assert!((weights["BTC"] - 50.0).abs() < 1e-9);

        let empty = PriceSnapshot::default();
        assert!(matches!(
            weights_of(&holdings, &empty),
            Err(LedgerError::PricingUnavailable(_))
        ));
    }
}
