//! Full-pipeline integration tests.
//!
//! Drive the engine through complete cycles over an in-memory store and
//! deterministic market sources: placement, resolution sweeps, the
//! training feedback loop and strategy weight updates.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use longshot::config::AppConfig;
use longshot::engine::Engine;
use longshot::ledger;
use longshot::optimizer;
use longshot::store::{self, MemoryStore, StateStore};
use longshot::types::BetStatus;

use crate::mock_sources::{
    resolved_no, resolved_void, resolved_yes, tail_opportunity, MockResolutionSource, MockScanner,
};

// ---- helpers ----

/// Defaults tuned for deterministic tests: sweep every cycle, no lookup
/// pacing, and a certain prior so strong rule scores place immediately.
fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.engine.resolution_interval_secs = 0;
    cfg.engine.resolution_delay_ms = 0;
    cfg.scorer.prior_win_prob = 1.0;
    cfg
}

fn memory_store() -> Arc<dyn StateStore> {
    Arc::new(MemoryStore::new())
}

// ---- tests ----

#[tokio::test]
async fn test_first_cycle_places_and_settles() {
    let store = memory_store();
    let scanner = MockScanner::new(vec![
        tail_opportunity("mkt-btc", "Will Bitcoin close above $500k this quarter?", dec!(0.01), 15),
        tail_opportunity("mkt-eth", "Will Ethereum flip Bitcoin by market cap?", dec!(0.008), 20),
    ]);
    let resolution = MockResolutionSource::new()
        .with_status("mkt-btc", resolved_yes())
        .with_status("mkt-eth", resolved_no());

    let mut engine = Engine::from_config(
        &test_config(),
        Arc::clone(&store),
        Box::new(scanner),
        Box::new(resolution),
    )
    .unwrap();

    let report = engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.placed, 2);
    let summary = report.resolution.unwrap();
    assert_eq!(summary.wins, 1);
    assert_eq!(summary.losses, 1);

    // $2 at 1c returns $200; the loser burns its $2 stake
    let stats = engine.ledger().stats();
    assert_eq!(stats.total_bets, 2);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.total_invested, dec!(4));
    assert_eq!(stats.total_returned, dec!(200));
    assert_eq!(stats.total_profit, dec!(196));
    assert_eq!(stats.hit_rate, 50.0);

    // both outcomes became training examples
    assert_eq!(engine.scorer().buffered(), 2);

    // settled bets land in the append-only archive
    let archive: Vec<serde_json::Value> = store::load(store.as_ref(), ledger::RESULTS_SLOT)
        .unwrap()
        .unwrap();
    assert_eq!(archive.len(), 2);
}

#[tokio::test]
async fn test_duplicate_markets_are_not_rebet() {
    let store = memory_store();
    let scanner = MockScanner::new(vec![
        tail_opportunity("mkt-btc", "Will Bitcoin close above $500k this quarter?", dec!(0.01), 15),
        tail_opportunity("mkt-sol", "Will Solana process a billion transactions in a day?", dec!(0.012), 12),
    ]);
    let resolution = MockResolutionSource::new();

    let mut engine = Engine::from_config(
        &test_config(),
        store,
        Box::new(scanner),
        Box::new(resolution),
    )
    .unwrap();

    let first = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(first.placed, 2);

    // same feed again: both markets are already in the book
    let second = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(second.scanned, 2);
    assert_eq!(second.candidates, 0);
    assert_eq!(second.placed, 0);
    assert_eq!(engine.ledger().pending_count(), 2);
}

#[tokio::test]
async fn test_restart_restores_state() {
    let store = memory_store();
    let feed = vec![
        tail_opportunity("mkt-btc", "Will Bitcoin close above $500k this quarter?", dec!(0.01), 15),
        tail_opportunity("mkt-eth", "Will Ethereum flip Bitcoin by market cap?", dec!(0.008), 20),
    ];

    {
        let mut engine = Engine::from_config(
            &test_config(),
            Arc::clone(&store),
            Box::new(MockScanner::new(feed.clone())),
            Box::new(MockResolutionSource::new()),
        )
        .unwrap();
        let report = engine.run_cycle(Utc::now()).await.unwrap();
        assert_eq!(report.placed, 2);
    }

    // a new engine over the same store sees the open positions and does
    // not re-bet the same markets
    let mut engine = Engine::from_config(
        &test_config(),
        Arc::clone(&store),
        Box::new(MockScanner::new(feed)),
        Box::new(MockResolutionSource::new()),
    )
    .unwrap();
    assert_eq!(engine.ledger().pending_count(), 2);

    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.placed, 0);
}

#[tokio::test]
async fn test_scan_failure_does_not_stop_resolution() {
    let store = memory_store();
    let scanner = MockScanner::new(vec![tail_opportunity(
        "mkt-btc",
        "Will Bitcoin close above $500k this quarter?",
        dec!(0.01),
        15,
    )]);
    let fault = scanner.fault_switch();
    let resolution = MockResolutionSource::new();
    let statuses = resolution.statuses_handle();

    let mut engine = Engine::from_config(
        &test_config(),
        store,
        Box::new(scanner),
        Box::new(resolution),
    )
    .unwrap();

    let first = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(first.placed, 1);
    assert_eq!(first.resolution.unwrap().still_pending, 1);

    // venue dies for scans, but the market resolves
    *fault.lock().unwrap() = Some("simulated venue outage".to_string());
    statuses
        .lock()
        .unwrap()
        .insert("mkt-btc".to_string(), resolved_yes());

    let second = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(second.scanned, 0);
    assert_eq!(second.resolution.unwrap().wins, 1);
    assert_eq!(engine.ledger().pending_count(), 0);
}

#[tokio::test]
async fn test_feedback_retrains_classifier() {
    let store = memory_store();

    // 50 settled outcomes in one sweep fill the training buffer with
    // both classes present: cheap deep tails win, dearer ones lose
    let mut feed = Vec::new();
    let mut resolution = MockResolutionSource::new();
    for i in 0..50 {
        let id = format!("mkt-{i}");
        let price = if i % 2 == 0 { dec!(0.004) } else { dec!(0.012) };
        let question = format!("Will Bitcoin milestone {i} arrive this year?");
        feed.push(tail_opportunity(&id, &question, price, 10 + (i as i64 % 20)));
        let status = if i % 2 == 0 { resolved_yes() } else { resolved_no() };
        resolution = resolution.with_status(&id, status);
    }

    let mut engine = Engine::from_config(
        &test_config(),
        store,
        Box::new(MockScanner::new(feed)),
        Box::new(resolution),
    )
    .unwrap();
    assert!(!engine.scorer().is_trained());

    let report = engine.run_cycle(Utc::now()).await.unwrap();

    assert_eq!(report.placed, 50);
    let summary = report.resolution.unwrap();
    assert_eq!(summary.wins, 25);
    assert_eq!(summary.losses, 25);

    assert!(report.retrained);
    assert!(engine.scorer().is_trained());
    // buffers trim to the most recent examples after a retrain
    assert_eq!(engine.scorer().buffered(), 20);
}

#[tokio::test]
async fn test_weight_shift_follows_performance() {
    let store = memory_store();

    let mut cfg = test_config();
    // let value tails through the rule gate so both ends of the price
    // range trade in this scenario
    cfg.scorer.bet_min_rule_score = 60.0;

    let mut feed = Vec::new();
    let mut resolution = MockResolutionSource::new();
    for i in 0..3 {
        let deep_id = format!("deep-{i}");
        feed.push(tail_opportunity(
            &deep_id,
            &format!("Will Bitcoin record {i} fall this month?"),
            dec!(0.004),
            15,
        ));
        resolution = resolution.with_status(&deep_id, resolved_yes());

        let value_id = format!("value-{i}");
        feed.push(tail_opportunity(
            &value_id,
            &format!("Will Ethereum upgrade {i} ship this month?"),
            dec!(0.03),
            15,
        ));
        resolution = resolution.with_status(&value_id, resolved_no());
    }

    let mut engine = Engine::from_config(
        &cfg,
        Arc::clone(&store),
        Box::new(MockScanner::new(feed)),
        Box::new(resolution),
    )
    .unwrap();

    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.placed, 6);
    assert!(report.reweighted);

    // the persisted weights lean toward the winning strategy
    let weights: BTreeMap<String, f64> = store::load(store.as_ref(), optimizer::WEIGHTS_SLOT)
        .unwrap()
        .unwrap();
    assert!(weights["deep_tail"] > weights["value_tail"]);
    let total: f64 = weights.values().sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_void_resolution_refunds_stake() {
    let store = memory_store();
    let scanner = MockScanner::new(vec![tail_opportunity(
        "mkt-btc",
        "Will Bitcoin close above $500k this quarter?",
        dec!(0.01),
        15,
    )]);
    let resolution = MockResolutionSource::new().with_status("mkt-btc", resolved_void());

    let mut engine = Engine::from_config(
        &test_config(),
        store,
        Box::new(scanner),
        Box::new(resolution),
    )
    .unwrap();

    let report = engine.run_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.placed, 1);
    assert_eq!(report.resolution.unwrap().cancelled, 1);

    let bets = engine.ledger().bets();
    assert_eq!(bets[0].status, BetStatus::Cancelled);
    assert!(bets[0].resolution_price.is_none());

    // stake comes back untouched and nothing reaches the classifier
    let stats = engine.ledger().stats();
    assert_eq!(stats.total_returned, dec!(2));
    assert_eq!(stats.total_profit, Decimal::ZERO);
    assert_eq!(engine.scorer().buffered(), 0);
}
