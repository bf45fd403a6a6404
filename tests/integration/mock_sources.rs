//! Deterministic market sources for integration testing.
//!
//! In-memory implementations of `MarketScanner` and `ResolutionSource`
//! with a test-controlled feed, per-market resolution outcomes and
//! switchable failures. No external dependencies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use longshot::markets::{MarketScanner, MarketStatus, ResolutionSource};
use longshot::types::{EngineError, Opportunity};

/// Shared switch that makes a mock fail on demand.
pub type FaultSwitch = Arc<Mutex<Option<String>>>;

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct MockScanner {
    feed: Arc<Mutex<Vec<Opportunity>>>,
    fault: FaultSwitch,
}

impl MockScanner {
    pub fn new(feed: Vec<Opportunity>) -> Self {
        Self {
            feed: Arc::new(Mutex::new(feed)),
            fault: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle for swapping the feed between cycles, kept valid after
    /// the scanner moves into the engine.
    pub fn feed_handle(&self) -> Arc<Mutex<Vec<Opportunity>>> {
        Arc::clone(&self.feed)
    }

    pub fn fault_switch(&self) -> FaultSwitch {
        Arc::clone(&self.fault)
    }
}

#[async_trait]
impl MarketScanner for MockScanner {
    async fn scan(&self) -> Result<Vec<Opportunity>, EngineError> {
        if let Some(message) = self.fault.lock().unwrap().clone() {
            return Err(EngineError::Scanner { message });
        }
        Ok(self.feed.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Resolution source
// ---------------------------------------------------------------------------

/// Answers lookups from a per-market status table; unknown markets are
/// reported as still open.
pub struct MockResolutionSource {
    statuses: Arc<Mutex<HashMap<String, MarketStatus>>>,
    fault: FaultSwitch,
}

impl MockResolutionSource {
    pub fn new() -> Self {
        Self {
            statuses: Arc::new(Mutex::new(HashMap::new())),
            fault: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_status(self, market_id: &str, status: MarketStatus) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(market_id.to_string(), status);
        self
    }

    /// Handle for flipping outcomes between cycles.
    pub fn statuses_handle(&self) -> Arc<Mutex<HashMap<String, MarketStatus>>> {
        Arc::clone(&self.statuses)
    }

    pub fn fault_switch(&self) -> FaultSwitch {
        Arc::clone(&self.fault)
    }
}

#[async_trait]
impl ResolutionSource for MockResolutionSource {
    async fn market_status(&self, market_id: &str) -> Result<MarketStatus, EngineError> {
        if let Some(message) = self.fault.lock().unwrap().clone() {
            return Err(EngineError::Resolution {
                market_id: market_id.to_string(),
                message,
            });
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(market_id)
            .cloned()
            .unwrap_or_else(open_market))
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn open_market() -> MarketStatus {
    MarketStatus { resolved: false, resolution_price: None }
}

pub fn resolved_yes() -> MarketStatus {
    MarketStatus { resolved: true, resolution_price: Some(Decimal::ONE) }
}

pub fn resolved_no() -> MarketStatus {
    MarketStatus { resolved: true, resolution_price: Some(Decimal::ZERO) }
}

/// Resolved with no reported outcome, which the ledger treats as a void.
pub fn resolved_void() -> MarketStatus {
    MarketStatus { resolved: true, resolution_price: None }
}

pub fn tail_opportunity(id: &str, question: &str, price: Decimal, days_out: i64) -> Opportunity {
    Opportunity {
        id: id.to_string(),
        question: question.to_string(),
        yes_price: price,
        liquidity: dec!(5000),
        volume_24h: dec!(1200),
        end_date: Some((Utc::now() + Duration::days(days_out)).to_rfc3339()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scanner_returns_feed() {
        let scanner = MockScanner::new(vec![tail_opportunity(
            "m1",
            "Will Bitcoin close above $500k this quarter?",
            dec!(0.01),
            15,
        )]);
        let feed = scanner.scan().await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, "m1");
    }

    #[tokio::test]
    async fn test_scanner_fault_switch() {
        let scanner = MockScanner::new(vec![]);
        let fault = scanner.fault_switch();

        *fault.lock().unwrap() = Some("simulated venue outage".to_string());
        assert!(scanner.scan().await.is_err());

        *fault.lock().unwrap() = None;
        assert!(scanner.scan().await.is_ok());
    }

    #[tokio::test]
    async fn test_feed_handle_swaps_between_scans() {
        let scanner = MockScanner::new(vec![]);
        let feed = scanner.feed_handle();
        assert!(scanner.scan().await.unwrap().is_empty());

        feed.lock().unwrap().push(tail_opportunity(
            "m2",
            "Will Ethereum flip Bitcoin by market cap?",
            dec!(0.004),
            20,
        ));
        assert_eq!(scanner.scan().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_defaults_to_open() {
        let source = MockResolutionSource::new();
        let status = source.market_status("unknown").await.unwrap();
        assert!(!status.resolved);
        assert!(status.resolution_price.is_none());
    }

    #[tokio::test]
    async fn test_resolution_statuses_update() {
        let source = MockResolutionSource::new().with_status("m1", open_market());
        let statuses = source.statuses_handle();

        assert!(!source.market_status("m1").await.unwrap().resolved);

        statuses
            .lock()
            .unwrap()
            .insert("m1".to_string(), resolved_yes());
        let status = source.market_status("m1").await.unwrap();
        assert!(status.resolved);
        assert_eq!(status.resolution_price, Some(Decimal::ONE));
    }
}
