//! Market data sources.
//!
//! Two async traits keep the engine testable: [`MarketScanner`] lists
//! open markets, [`ResolutionSource`] reports how a single market
//! settled. [`GammaClient`] implements both against Polymarket's public
//! Gamma API.

mod gamma;

pub use gamma::GammaClient;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{EngineError, Opportunity};

/// Where one market stands at the resolution source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketStatus {
    pub resolved: bool,
    /// Final YES price when determinable: 1 when YES won, 0 when it
    /// lost. `None` for markets that settled without a usable outcome.
    pub resolution_price: Option<Decimal>,
}

#[async_trait]
pub trait MarketScanner: Send + Sync {
    /// One page of open markets, mapped to domain form. Filtering to
    /// the tail window happens downstream.
    async fn scan(&self) -> Result<Vec<Opportunity>, EngineError>;
}

#[async_trait]
pub trait ResolutionSource: Send + Sync {
    async fn market_status(&self, market_id: &str) -> Result<MarketStatus, EngineError>;
}
