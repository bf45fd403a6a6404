//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed sections.
//! Every field has a default matching the shipped strategy, so a sparse
//! (or missing) file is fine; `validate` rejects combinations the engine
//! cannot run with.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::types::EngineError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub markets: MarketsSection,
    pub scorer: ScorerSection,
    pub optimizer: OptimizerSection,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineSection {
    /// Directory for all persisted state (bets, stats, model, weights).
    pub data_dir: String,
    pub scan_interval_secs: u64,
    /// How often pending bets are checked against the resolution source.
    pub resolution_interval_secs: u64,
    /// Pause between per-bet resolution lookups (rate limiting).
    pub resolution_delay_ms: u64,
    pub max_open_bets: usize,
    /// Scale the stake by the optimized sub-strategy weight. Off by
    /// default: weights are advisory until proven out.
    pub scale_stake_by_weight: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            scan_interval_secs: 60,
            resolution_interval_secs: 3600,
            resolution_delay_ms: 100,
            max_open_bets: 100,
            scale_stake_by_weight: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketsSection {
    pub gamma_base_url: String,
    pub scan_limit: u32,
    /// Only YES prices at or below this are tail opportunities.
    pub price_ceiling: f64,
    /// Prices below this are noise (dead markets, rounding dust).
    pub price_floor: f64,
    pub min_liquidity: f64,
}

impl Default for MarketsSection {
    fn default() -> Self {
        Self {
            gamma_base_url: "https://gamma-api.polymarket.com".to_string(),
            scan_limit: 500,
            price_ceiling: 0.04,
            price_floor: 0.001,
            min_liquidity: 100.0,
        }
    }
}

/// One rule-score price band: prices at or below `max_price` earn `bonus`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PriceBand {
    pub max_price: f64,
    pub bonus: f64,
}

/// One payout-multiplier band: multipliers at or above `min_multiplier`
/// earn `bonus`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MultiplierBand {
    pub min_multiplier: f64,
    pub bonus: f64,
}

/// Expiry adjustments for the rule score.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExpiryBands {
    pub sweet_min_days: f64,
    pub sweet_max_days: f64,
    pub sweet_bonus: f64,
    /// Applied under `sweet_min_days` (quick resolution).
    pub near_bonus: f64,
    /// Applied over `far_days` (capital tied up too long).
    pub far_days: f64,
    pub far_penalty: f64,
}

impl Default for ExpiryBands {
    fn default() -> Self {
        Self {
            sweet_min_days: 7.0,
            sweet_max_days: 30.0,
            sweet_bonus: 10.0,
            near_bonus: 5.0,
            far_days: 180.0,
            far_penalty: -5.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScorerSection {
    pub stake_usd: f64,
    /// Minimum normalized score (rule/100) to place a bet automatically.
    pub min_auto_bet_score: f64,
    /// Baseline tail win probability before any training.
    pub prior_win_prob: f64,
    pub ml_weight: f64,
    pub rule_weight: f64,
    pub buffer_capacity: usize,
    pub retrain_min_examples: usize,
    /// Buffer examples kept after a successful retrain.
    pub retain_recent: usize,
    pub bet_min_ev: f64,
    pub bet_min_rule_score: f64,
    pub watch_min_ev: f64,
    pub watch_min_rule_score: f64,
    /// Ascending by `max_price`; the first matching band wins.
    pub price_bands: Vec<PriceBand>,
    pub expiry: ExpiryBands,
    /// Category name -> rule score bonus.
    pub category_bonus: HashMap<String, f64>,
    /// Descending by `min_multiplier`; the first matching band wins.
    pub multiplier_bands: Vec<MultiplierBand>,
    pub deep_tail_max_price: f64,
    pub standard_tail_max_price: f64,
}

impl Default for ScorerSection {
    fn default() -> Self {
        Self {
            stake_usd: 2.0,
            min_auto_bet_score: 0.60,
            prior_win_prob: 0.01,
            ml_weight: 0.6,
            rule_weight: 0.4,
            buffer_capacity: 50,
            retrain_min_examples: 20,
            retain_recent: 20,
            bet_min_ev: 0.5,
            bet_min_rule_score: 70.0,
            watch_min_ev: 0.0,
            watch_min_rule_score: 50.0,
            price_bands: vec![
                PriceBand { max_price: 0.005, bonus: 25.0 },
                PriceBand { max_price: 0.01, bonus: 20.0 },
                PriceBand { max_price: 0.02, bonus: 10.0 },
                PriceBand { max_price: 0.03, bonus: 5.0 },
            ],
            expiry: ExpiryBands::default(),
            category_bonus: HashMap::from([
                ("crypto".to_string(), 5.0),
                ("tech".to_string(), 3.0),
            ]),
            multiplier_bands: vec![
                MultiplierBand { min_multiplier: 500.0, bonus: 10.0 },
                MultiplierBand { min_multiplier: 200.0, bonus: 5.0 },
            ],
            deep_tail_max_price: 0.005,
            standard_tail_max_price: 0.02,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OptimizerSection {
    pub learning_rate: f64,
    pub momentum_decay: f64,
    /// Floor each weight is clamped to before renormalization.
    pub min_weight: f64,
    /// Convergence threshold on the gradient L2 norm.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Strategies with fewer resolved trades than this get a zero gradient.
    pub min_trades: usize,
}

impl Default for OptimizerSection {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            momentum_decay: 0.9,
            min_weight: 0.05,
            tolerance: 0.01,
            max_iterations: 10,
            min_trades: 3,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file. A missing file is not an
    /// error: the engine runs on defaults.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!(path, "No config file found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        let bad = |msg: String| Err(EngineError::Config(msg));

        if self.scorer.stake_usd <= 0.0 {
            return bad(format!("stake_usd must be positive, got {}", self.scorer.stake_usd));
        }
        if self.markets.price_floor <= 0.0 {
            return bad(format!(
                "price_floor must be positive, got {}",
                self.markets.price_floor
            ));
        }
        if self.markets.price_ceiling <= self.markets.price_floor {
            return bad(format!(
                "price_ceiling ({}) must exceed price_floor ({})",
                self.markets.price_ceiling, self.markets.price_floor
            ));
        }
        if self.scorer.buffer_capacity == 0 {
            return bad("buffer_capacity must be at least 1".to_string());
        }
        if self.scorer.retrain_min_examples < 2 {
            return bad("retrain_min_examples must be at least 2 (both classes)".to_string());
        }
        if self.scorer.retain_recent > self.scorer.buffer_capacity {
            return bad(format!(
                "retain_recent ({}) cannot exceed buffer_capacity ({})",
                self.scorer.retain_recent, self.scorer.buffer_capacity
            ));
        }
        if !(0.0..=1.0).contains(&self.scorer.ml_weight)
            || !(0.0..=1.0).contains(&self.scorer.rule_weight)
        {
            return bad("blend weights must be within [0, 1]".to_string());
        }
        let ascending = self
            .scorer
            .price_bands
            .windows(2)
            .all(|w| w[0].max_price < w[1].max_price);
        if !ascending {
            return bad("price_bands must be sorted ascending by max_price".to_string());
        }
        let descending = self
            .scorer
            .multiplier_bands
            .windows(2)
            .all(|w| w[0].min_multiplier > w[1].min_multiplier);
        if !descending {
            return bad("multiplier_bands must be sorted descending by min_multiplier".to_string());
        }
        if self.optimizer.learning_rate <= 0.0 {
            return bad("learning_rate must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.optimizer.momentum_decay) {
            return bad("momentum_decay must be within [0, 1)".to_string());
        }
        if self.optimizer.min_weight <= 0.0 || self.optimizer.min_weight > 0.5 {
            return bad("min_weight must be within (0, 0.5]".to_string());
        }
        if self.optimizer.tolerance <= 0.0 {
            return bad("tolerance must be positive".to_string());
        }
        if self.optimizer.max_iterations == 0 {
            return bad("max_iterations must be at least 1".to_string());
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
