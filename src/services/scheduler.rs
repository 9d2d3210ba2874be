//! Revaluation Scheduler
//!
//! Background loop that periodically re-prices every active bot, lets each
//! bot rebalance when its target has drifted, and appends account
//! performance snapshots. Market data is fetched once per tick. A failure
//! for one bot or account is logged and the tick moves on.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::services::ledger::Ledger;

/// Counters for one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub accounts: usize,
    pub bots_revalued: usize,
    pub rebalanced: usize,
    pub snapshots: usize,
    pub failures: usize,
}

/// Drives periodic revaluation of the ledger.
pub struct RevaluationScheduler {
    ledger: Arc<Ledger>,
    period: Duration,
    shutdown_tx: broadcast::Sender<()>,
    running: AtomicBool,
    /// Set by `stop`; covers a stop issued before the loop subscribed.
    stop_requested: AtomicBool,
}

impl RevaluationScheduler {
    pub fn new(ledger: Arc<Ledger>, period: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            ledger,
            period,
            shutdown_tx,
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run ticks until `stop` is called. Returns immediately if already
    /// running, or if `stop` was called since the last run ended.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.stop_requested.swap(false, Ordering::SeqCst) {
            info!("Revaluation scheduler stopped before its first tick");
            self.running.store(false, Ordering::SeqCst);
            return;
        }

        info!("Revaluation scheduler started, interval {:?}", self.period);
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Revaluation scheduler received shutdown signal");
                    break;
                }
            }
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Signal the loop to stop after the current tick. A stop issued before
    /// `start` makes the next `start` return at once.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        // No receiver yet is fine: the flag carries the request
        let _ = self.shutdown_tx.send(());
    }

    /// Run one revaluation pass over every account.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let symbols = self.ledger.tracked_symbols().await;
        let market = self.ledger.market();
        let prices = market.prices(&symbols).await;
        let signals = market.signals(&symbols).await;
        debug!(
            "Tick market data: {} prices (stale={}), signals degraded={}",
            prices.prices.len(),
            prices.stale,
            signals.degraded
        );

        for user_id in self.ledger.user_ids() {
            report.accounts += 1;

            let bot_ids = match self.ledger.active_bot_ids(&user_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    error!("Scheduler skipped account {}: {}", user_id, e);
                    report.failures += 1;
                    continue;
                }
            };

            for bot_id in bot_ids {
                match self
                    .ledger
                    .revalue_and_maybe_rebalance(&user_id, &bot_id, &prices, &signals)
                    .await
                {
                    Ok(outcome) => {
                        report.bots_revalued += 1;
                        if outcome.rebalanced {
                            report.rebalanced += 1;
                        }
                    }
                    Err(e) => {
                        error!("Revaluation failed for bot {} of {}: {}", bot_id, user_id, e);
                        report.failures += 1;
                    }
                }
            }

            match self.ledger.append_performance_snapshot(&user_id).await {
                Ok(Some(_)) => report.snapshots += 1,
                Ok(None) => {}
                Err(e) => {
                    error!("Performance snapshot failed for {}: {}", user_id, e);
                    report.failures += 1;
                }
            }
        }

        info!(
            "Scheduler tick: {} accounts, {} bots revalued, {} rebalanced, {} snapshots, {} failures",
            report.accounts,
            report.bots_revalued,
            report.rebalanced,
            report.snapshots,
            report.failures
        );
        report
    }
}
