//! Integration tests for the revaluation scheduler

mod common;

use common::{assert_close, harness};
use signalstack::services::{RevaluationScheduler, TickReport};
use signalstack::types::{StrategyKind, TradeAction};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_tick_rebalances_drifted_bots() {
    let h = harness();
    h.ledger.create_account("alice", None).await.unwrap();
    let bot = h
        .ledger
        .deploy_bot("alice", StrategyKind::EqualWeight, 50, 10_000.0)
        .await
        .unwrap();

    h.prices.set_price("BTC", 75_000.0);
    let scheduler = RevaluationScheduler::new(h.ledger.clone(), Duration::from_secs(60));
    let report = scheduler.tick().await;

    assert_eq!(
        report,
        TickReport {
            accounts: 1,
            bots_revalued: 1,
            rebalanced: 1,
            snapshots: 1,
            failures: 0,
        }
    );
    let performance = h.ledger.get_bot_performance("alice", &bot.id).await.unwrap();
    assert_close(performance.current_value, 12_500.0);
}

#[tokio::test]
async fn test_tick_skips_stopped_bots() {
    let h = harness();
    h.ledger.create_account("alice", None).await.unwrap();
    let bot = h
        .ledger
        .deploy_bot("alice", StrategyKind::EqualWeight, 50, 10_000.0)
        .await
        .unwrap();
    h.ledger.stop_bot("alice", &bot.id).await.unwrap();

    let scheduler = RevaluationScheduler::new(h.ledger.clone(), Duration::from_secs(60));
    let report = scheduler.tick().await;
    assert_eq!(report.bots_revalued, 0);
    assert_eq!(report.failures, 0);
}

#[tokio::test]
async fn test_one_failing_bot_does_not_stop_the_tick() {
    let h = harness();
    h.ledger.create_account("alice", None).await.unwrap();
    h.ledger.create_account("bob", None).await.unwrap();
    h.ledger
        .deploy_bot("alice", StrategyKind::EqualWeight, 50, 10_000.0)
        .await
        .unwrap();
    let bobs = h
        .ledger
        .deploy_bot("bob", StrategyKind::EqualWeight, 50, 10_000.0)
        .await
        .unwrap();

    // Bob's bot now holds an asset no source can price
    h.ledger
        .execute_trade("bob", &bobs.id, "XRP", TradeAction::Buy, 100.0, 0.5)
        .await
        .unwrap();

    let scheduler = RevaluationScheduler::new(h.ledger.clone(), Duration::from_secs(60));
    let report = scheduler.tick().await;

    assert_eq!(report.accounts, 2);
    assert_eq!(report.bots_revalued, 1);
    assert_eq!(report.failures, 1);
    assert_eq!(report.snapshots, 2);

    // Bob's bot keeps its last committed state
    let performance = h.ledger.get_bot_performance("bob", &bobs.id).await.unwrap();
    assert_close(performance.holdings["XRP"], 100.0);
}

#[tokio::test]
async fn test_tick_uses_stale_prices_when_source_fails() {
    let h = harness();
    h.ledger.create_account("alice", None).await.unwrap();
    h.ledger
        .deploy_bot("alice", StrategyKind::EqualWeight, 50, 10_000.0)
        .await
        .unwrap();

    h.prices.set_failing(true);
    h.signals.set_failing(true);
    let scheduler = RevaluationScheduler::new(h.ledger.clone(), Duration::from_secs(60));
    let report = scheduler.tick().await;

    assert_eq!(report.bots_revalued, 1);
    assert_eq!(report.rebalanced, 0);
    assert_eq!(report.failures, 0);
}

#[tokio::test]
async fn test_start_and_stop() {
    let h = harness();
    let scheduler = Arc::new(RevaluationScheduler::new(
        h.ledger.clone(),
        Duration::from_millis(10),
    ));

    let runner = scheduler.clone();
    let handle = tokio::spawn(async move { runner.start().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(scheduler.is_running());

    scheduler.stop();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_stop_before_start_prevents_the_loop() {
    let h = harness();
    let scheduler = Arc::new(RevaluationScheduler::new(
        h.ledger.clone(),
        Duration::from_millis(10),
    ));

    scheduler.stop();
    tokio::time::timeout(Duration::from_secs(1), scheduler.start())
        .await
        .expect("start ignored an earlier stop");
    assert!(!scheduler.is_running());

    // The request was consumed; the next start runs normally
    let runner = scheduler.clone();
    let handle = tokio::spawn(async move { runner.start().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(scheduler.is_running());

    scheduler.stop();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lifecycle_and_ticks_conserve_funds() {
    let h = harness();
    h.ledger.create_account("alice", Some(100_000.0)).await.unwrap();

    let mut first_wave = Vec::new();
    for _ in 0..4 {
        let bot = h
            .ledger
            .deploy_bot("alice", StrategyKind::EqualWeight, 50, 5_000.0)
            .await
            .unwrap();
        first_wave.push(bot.id);
    }

    let scheduler = Arc::new(RevaluationScheduler::new(
        h.ledger.clone(),
        Duration::from_secs(60),
    ));

    let mut lifecycle = Vec::new();
    for bot_id in first_wave {
        let ledger = h.ledger.clone();
        lifecycle.push(tokio::spawn(async move {
            ledger.stop_bot("alice", &bot_id).await.map(|_| ())
        }));
    }
    for i in 0..4 {
        let ledger = h.ledger.clone();
        let strategy = if i % 2 == 0 {
            StrategyKind::EqualWeight
        } else {
            StrategyKind::Threshold
        };
        lifecycle.push(tokio::spawn(async move {
            ledger.deploy_bot("alice", strategy, 50, 7_500.0).await.map(|_| ())
        }));
    }
    let ticks: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.tick().await })
        })
        .collect();

    for task in lifecycle {
        task.await.unwrap().unwrap();
    }
    for task in ticks {
        // A tick may race a stop and count it as a failure, but never trades
        let report = task.await.unwrap();
        assert_eq!(report.rebalanced, 0);
    }

    let account = h.ledger.get_account("alice").await.unwrap();
    let active: Vec<_> = account.bots.iter().filter(|b| b.is_active()).collect();
    assert_eq!(active.len(), 4);
    assert_eq!(account.bots.len(), 8);

    let allocated: f64 = active.iter().map(|b| b.allocated_fund).sum();
    assert_close(account.cash_balance + allocated, 100_000.0);
    assert_close(account.total_value(), 100_000.0);
    assert_close(account.pnl(), 0.0);
}
