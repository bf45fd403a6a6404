//! Polymarket Gamma API client.
//!
//! The Gamma API serves numeric fields as strings and sometimes as
//! numbers, and `outcomePrices` arrives as a JSON array encoded inside
//! a string. The mapping layer here absorbs all of that; rows missing
//! an id, question or YES price are dropped rather than failing the
//! whole page.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::{MarketScanner, MarketStatus, ResolutionSource};
use crate::types::{d, EngineError, Opportunity};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GammaClient {
    client: Client,
    base_url: String,
    scan_limit: u32,
}

impl GammaClient {
    pub fn new(base_url: &str, scan_limit: u32) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("longshot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::Scanner {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            scan_limit,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GammaMarket {
    condition_id: Option<String>,
    id: Option<Value>,
    question: Option<String>,
    /// Usually a string holding a JSON array of price strings.
    outcome_prices: Option<Value>,
    liquidity: Option<Value>,
    #[serde(rename = "volume24hr")]
    volume_24h: Option<Value>,
    end_date: Option<String>,
    closed: Option<bool>,
    resolved: Option<bool>,
    /// "Yes" or "No" once the market has settled with a usable outcome.
    outcome: Option<String>,
}

fn parse_decimal(value: Option<&Value>) -> Decimal {
    match value {
        Some(Value::String(s)) => Decimal::from_str(s.trim()).unwrap_or_default(),
        Some(Value::Number(n)) => n.as_f64().map(d).unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

/// First element of `outcomePrices`, the YES price.
fn yes_price(market: &GammaMarket) -> Option<Decimal> {
    let prices: Vec<String> = match market.outcome_prices.as_ref()? {
        Value::String(encoded) => serde_json::from_str(encoded).ok()?,
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => return None,
    };
    Decimal::from_str(prices.first()?.trim()).ok()
}

fn market_id(market: &GammaMarket) -> Option<String> {
    if let Some(id) = market.condition_id.as_ref().filter(|s| !s.is_empty()) {
        return Some(id.clone());
    }
    match market.id.as_ref()? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_opportunity(market: &GammaMarket) -> Option<Opportunity> {
    Some(Opportunity {
        id: market_id(market)?,
        question: market.question.clone().filter(|q| !q.is_empty())?,
        yes_price: yes_price(market)?,
        liquidity: parse_decimal(market.liquidity.as_ref()),
        volume_24h: parse_decimal(market.volume_24h.as_ref()),
        end_date: market.end_date.clone(),
    })
}

fn map_status(market: &GammaMarket) -> MarketStatus {
    let resolved = market.closed.unwrap_or(false) || market.resolved.unwrap_or(false);
    let resolution_price = if resolved {
        match market.outcome.as_deref() {
            Some("Yes") => Some(Decimal::ONE),
            Some("No") => Some(Decimal::ZERO),
            _ => None,
        }
    } else {
        None
    };
    MarketStatus { resolved, resolution_price }
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketScanner for GammaClient {
    async fn scan(&self) -> Result<Vec<Opportunity>, EngineError> {
        let url = format!(
            "{}/markets?active=true&closed=false&limit={}",
            self.base_url, self.scan_limit
        );
        let scanner_err = |message: String| EngineError::Scanner { message };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| scanner_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(scanner_err(format!("HTTP {}", response.status())));
        }
        let markets: Vec<GammaMarket> = response
            .json()
            .await
            .map_err(|e| scanner_err(format!("bad market page: {e}")))?;

        let mut opportunities = Vec::new();
        let mut skipped = 0usize;
        for market in &markets {
            match to_opportunity(market) {
                Some(opportunity) => opportunities.push(opportunity),
                None => skipped += 1,
            }
        }
        debug!(
            fetched = markets.len(),
            mapped = opportunities.len(),
            skipped,
            "Gamma market page"
        );
        Ok(opportunities)
    }
}

#[async_trait]
impl ResolutionSource for GammaClient {
    async fn market_status(&self, market_id: &str) -> Result<MarketStatus, EngineError> {
        let url = format!("{}/markets/{}", self.base_url, urlencoding::encode(market_id));
        let resolution_err = |message: String| EngineError::Resolution {
            market_id: market_id.to_string(),
            message,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| resolution_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(resolution_err(format!("HTTP {}", response.status())));
        }

        // Some Gamma endpoints return a single-element array.
        let value: Value = response
            .json()
            .await
            .map_err(|e| resolution_err(format!("bad market body: {e}")))?;
        let value = match value {
            Value::Array(mut items) if !items.is_empty() => items.remove(0),
            Value::Array(_) => return Err(resolution_err("market not found".to_string())),
            other => other,
        };
        let market: GammaMarket = serde_json::from_value(value)
            .map_err(|e| resolution_err(format!("bad market body: {e}")))?;

        Ok(map_status(&market))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
