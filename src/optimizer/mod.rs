//! Strategy weight optimization.
//!
//! Maintains one weight per sub-strategy and nudges them toward the
//! strategies that have actually been paying, using gradient ascent
//! with momentum over realized performance. The gradient blends win
//! rate, average P&L and a Sharpe-style consistency term; strategies
//! without enough resolved trades contribute a zero gradient so thin
//! evidence cannot move the weights.
//!
//! Optimized weights are advisory: they are persisted and reported,
//! and stake scaling only consumes them when explicitly enabled.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::OptimizerSection;
use crate::store::{self, StateStore};
use crate::types::EngineError;

pub const WEIGHTS_SLOT: &str = "strategy_weights";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub momentum_decay: f64,
    pub min_weight: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub min_trades: usize,
}

impl OptimizerConfig {
    pub fn from_section(section: &OptimizerSection) -> Self {
        Self {
            learning_rate: section.learning_rate,
            momentum_decay: section.momentum_decay,
            min_weight: section.min_weight,
            tolerance: section.tolerance,
            max_iterations: section.max_iterations,
            min_trades: section.min_trades,
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::from_section(&OptimizerSection::default())
    }
}

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// One settled bet, reduced to what the optimizer needs.
#[derive(Debug, Clone)]
pub struct ResolvedTrade {
    pub strategy: String,
    pub pnl: f64,
    pub won: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyPerformance {
    pub trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub avg_pnl: f64,
    /// Mean over population standard deviation, zero when P&L never
    /// varies.
    pub sharpe: f64,
    pub total_pnl: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub initial_weights: BTreeMap<String, f64>,
    pub optimized_weights: BTreeMap<String, f64>,
    /// Weight-averaged win rate over strategies with data.
    pub expected_win_rate: f64,
    pub expected_pnl_per_trade: f64,
    /// Trades seen over the 50 needed for full confidence, capped at 1.
    pub confidence: f64,
    pub iterations: usize,
    /// Relative change in expected P&L per trade versus the initial
    /// weights. Zero when the baseline is zero.
    pub improvement: f64,
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

pub struct WeightOptimizer {
    config: OptimizerConfig,
    weights: BTreeMap<String, f64>,
    velocity: BTreeMap<String, f64>,
    store: Arc<dyn StateStore>,
}

impl WeightOptimizer {
    pub fn new(config: OptimizerConfig, strategies: &[&str], store: Arc<dyn StateStore>) -> Self {
        let mut optimizer =
            Self { config, weights: BTreeMap::new(), velocity: BTreeMap::new(), store };
        optimizer.ensure_strategies(strategies);
        optimizer
    }

    /// Restore persisted weights, seeding any strategy the stored set
    /// does not know yet.
    pub fn load(
        config: OptimizerConfig,
        strategies: &[&str],
        store: Arc<dyn StateStore>,
    ) -> Result<Self, EngineError> {
        let weights: BTreeMap<String, f64> =
            store::load(store.as_ref(), WEIGHTS_SLOT)?.unwrap_or_default();
        let mut optimizer = Self { config, weights, velocity: BTreeMap::new(), store };
        optimizer.ensure_strategies(strategies);
        Ok(optimizer)
    }

    fn ensure_strategies(&mut self, strategies: &[&str]) {
        if strategies.is_empty() {
            return;
        }
        let default_weight = 1.0 / strategies.len() as f64;
        for strategy in strategies {
            self.weights.entry((*strategy).to_string()).or_insert(default_weight);
        }
        let sum: f64 = self.weights.values().sum();
        if sum > 0.0 {
            for weight in self.weights.values_mut() {
                *weight /= sum;
            }
        }
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    /// Current weight for a strategy, equal share for unknown tags.
    pub fn weight_for(&self, strategy: &str) -> f64 {
        match self.weights.get(strategy) {
            Some(weight) => *weight,
            None if self.weights.is_empty() => 1.0,
            None => 1.0 / self.weights.len() as f64,
        }
    }

    /// Group trades by strategy and measure each group.
    pub fn analyze(&self, trades: &[ResolvedTrade]) -> BTreeMap<String, StrategyPerformance> {
        let mut grouped: BTreeMap<&str, Vec<&ResolvedTrade>> = BTreeMap::new();
        for trade in trades {
            grouped.entry(trade.strategy.as_str()).or_default().push(trade);
        }

        let mut out = BTreeMap::new();
        for (strategy, trades) in grouped {
            let n = trades.len() as f64;
            let wins = trades.iter().filter(|t| t.won).count();
            let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
            let mean = total_pnl / n;
            let variance = trades.iter().map(|t| (t.pnl - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            out.insert(
                strategy.to_string(),
                StrategyPerformance {
                    trades: trades.len(),
                    wins,
                    win_rate: wins as f64 / n,
                    avg_pnl: mean,
                    sharpe: if std > 0.0 { mean / std } else { 0.0 },
                    total_pnl,
                },
            );
        }
        out
    }

    /// One gradient per weighted strategy. Strategies under the trade
    /// minimum get zero so they hold their current weight.
    fn gradients(&self, performance: &BTreeMap<String, StrategyPerformance>) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for strategy in self.weights.keys() {
            let gradient = match performance.get(strategy) {
                Some(p) if p.trades >= self.config.min_trades => {
                    0.4 * (p.win_rate - 0.5) * 2.0 + 0.4 * (p.avg_pnl / 5.0) + 0.2 * (p.sharpe * 0.5)
                }
                _ => 0.0,
            };
            out.insert(strategy.clone(), gradient);
        }
        out
    }

    /// L2 norm of the gradient vector for the given performance table.
    fn gradient_norm(&self, performance: &BTreeMap<String, StrategyPerformance>) -> f64 {
        self.gradients(performance)
            .values()
            .map(|g| g * g)
            .sum::<f64>()
            .sqrt()
    }

    /// One momentum update over the given performance table. Returns
    /// the post-step weights and the gradient magnitude the step was
    /// driven by.
    pub fn step(
        &mut self,
        performance: &BTreeMap<String, StrategyPerformance>,
    ) -> (BTreeMap<String, f64>, f64) {
        let gradients = self.gradients(performance);
        let norm = gradients.values().map(|g| g * g).sum::<f64>().sqrt();
        self.apply_step(&gradients);
        (self.weights.clone(), norm)
    }

    /// Momentum step, then floor clamp and renormalize to sum one.
    fn apply_step(&mut self, gradients: &BTreeMap<String, f64>) {
        let decay = self.config.momentum_decay;
        let learning_rate = self.config.learning_rate;
        for (strategy, weight) in self.weights.iter_mut() {
            let gradient = gradients.get(strategy).copied().unwrap_or(0.0);
            let velocity = self.velocity.entry(strategy.clone()).or_insert(0.0);
            *velocity = decay * *velocity + (1.0 - decay) * gradient;
            *weight += learning_rate * *velocity;
        }

        let floor = self.config.min_weight;
        for weight in self.weights.values_mut() {
            if *weight < floor {
                *weight = floor;
            }
        }
        let sum: f64 = self.weights.values().sum();
        if sum > 0.0 {
            for weight in self.weights.values_mut() {
                *weight /= sum;
            }
        }
    }

    /// Run the optimization over the full resolved history, persist the
    /// new weights and report what changed.
    pub fn optimize(&mut self, trades: &[ResolvedTrade]) -> Result<OptimizationResult, EngineError> {
        let initial = self.weights.clone();
        let performance = self.analyze(trades);

        let mut iterations = 0;
        for _ in 0..self.config.max_iterations {
            if self.gradient_norm(&performance) < self.config.tolerance {
                break;
            }
            self.step(&performance);
            iterations += 1;
        }

        let (_, initial_pnl) = expected(&initial, &performance);
        let (expected_win_rate, expected_pnl_per_trade) = expected(&self.weights, &performance);
        let improvement = if initial_pnl.abs() > f64::EPSILON {
            (expected_pnl_per_trade - initial_pnl) / initial_pnl.abs()
        } else {
            0.0
        };
        let confidence = (trades.len() as f64 / 50.0).min(1.0);

        self.persist()?;
        info!(
            iterations,
            trades = trades.len(),
            confidence = %format!("{confidence:.2}"),
            improvement = %format!("{:+.1}%", improvement * 100.0),
            "Strategy weights optimized"
        );

        Ok(OptimizationResult {
            initial_weights: initial,
            optimized_weights: self.weights.clone(),
            expected_win_rate,
            expected_pnl_per_trade,
            confidence,
            iterations,
            improvement,
        })
    }

    fn persist(&self) -> Result<(), EngineError> {
        store::save(self.store.as_ref(), WEIGHTS_SLOT, &self.weights)
    }
}

fn expected(
    weights: &BTreeMap<String, f64>,
    performance: &BTreeMap<String, StrategyPerformance>,
) -> (f64, f64) {
    let mut win_rate = 0.0;
    let mut pnl = 0.0;
    for (strategy, weight) in weights {
        if let Some(p) = performance.get(strategy) {
            win_rate += weight * p.win_rate;
            pnl += weight * p.avg_pnl;
        }
    }
    (win_rate, pnl)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
