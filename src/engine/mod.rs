//! Cycle orchestration.
//!
//! One engine cycle is: scan the market feed, filter to fresh tail
//! candidates, score them, paper-bet the ones that clear the auto-bet
//! bar, then (when the resolution interval has elapsed) sweep pending
//! bets, feed resolved outcomes back into the scorer, retrain when the
//! scorer says it is due, and re-optimize strategy weights.
//!
//! Scan and resolution failures are logged and survive to the next
//! cycle; only storage failures abort a cycle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::ledger::{Ledger, ResolutionSummary};
use crate::markets::{MarketScanner, ResolutionSource};
use crate::model::LogisticModel;
use crate::optimizer::{OptimizerConfig, ResolvedTrade, WeightOptimizer};
use crate::scorer::{RetrainOutcome, ScoreResult, Scorer, ScorerConfig, KNOWN_STRATEGIES};
use crate::store::StateStore;
use crate::types::{d, Bet, BetStatus, EngineError, Opportunity, Recommendation};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_open_bets: usize,
    pub price_floor: Decimal,
    pub price_ceiling: Decimal,
    pub min_liquidity: Decimal,
    pub resolution_interval: Duration,
    pub resolution_delay: StdDuration,
    pub scale_stake_by_weight: bool,
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub scanned: usize,
    /// Opportunities surviving the price, liquidity and dedup filters.
    pub candidates: usize,
    pub placed: usize,
    pub watched: usize,
    pub skipped: usize,
    pub resolution: Option<ResolutionSummary>,
    pub retrained: bool,
    pub reweighted: bool,
    pub elapsed_ms: u128,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle #{}: scanned {} | candidates {} | placed {} | watched {} | skipped {}",
            self.cycle, self.scanned, self.candidates, self.placed, self.watched, self.skipped
        )?;
        if let Some(resolution) = &self.resolution {
            write!(
                f,
                " | resolved {} (w{} l{} c{}) pending {}",
                resolution.newly_resolved.len(),
                resolution.wins,
                resolution.losses,
                resolution.cancelled,
                resolution.still_pending
            )?;
        }
        if self.retrained {
            write!(f, " | retrained")?;
        }
        if self.reweighted {
            write!(f, " | reweighted")?;
        }
        write!(f, " | {}ms", self.elapsed_ms)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    config: EngineConfig,
    scorer: Scorer,
    ledger: Ledger,
    optimizer: WeightOptimizer,
    scanner: Box<dyn MarketScanner>,
    resolution: Box<dyn ResolutionSource>,
    last_resolution_check: Option<DateTime<Utc>>,
    cycle: u64,
}

impl Engine {
    /// Wire all components against one store, restoring whatever state
    /// a previous run left behind. Scorer and optimizer state fall back
    /// to fresh on a bad slot; the bet ledger is the book of record and
    /// refuses to start over a slot it cannot read.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn StateStore>,
        scanner: Box<dyn MarketScanner>,
        resolution: Box<dyn ResolutionSource>,
    ) -> Result<Self, EngineError> {
        let scorer_config =
            ScorerConfig::from_section(&config.scorer, config.markets.price_ceiling);
        let scorer = match Scorer::load(
            scorer_config.clone(),
            Box::new(LogisticModel::new()),
            Arc::clone(&store),
        ) {
            Ok(scorer) => scorer,
            Err(e) => {
                warn!(error = %e, "Could not restore scorer state, starting fresh");
                Scorer::new(scorer_config, Box::new(LogisticModel::new()), Arc::clone(&store))
            }
        };

        let ledger = Ledger::load(Arc::clone(&store))?;

        let optimizer_config = OptimizerConfig::from_section(&config.optimizer);
        let optimizer = match WeightOptimizer::load(
            optimizer_config.clone(),
            KNOWN_STRATEGIES,
            Arc::clone(&store),
        ) {
            Ok(optimizer) => optimizer,
            Err(e) => {
                warn!(error = %e, "Could not restore strategy weights, starting fresh");
                WeightOptimizer::new(optimizer_config, KNOWN_STRATEGIES, store)
            }
        };

        Ok(Self {
            config: EngineConfig {
                max_open_bets: config.engine.max_open_bets,
                price_floor: d(config.markets.price_floor),
                price_ceiling: d(config.markets.price_ceiling),
                min_liquidity: d(config.markets.min_liquidity),
                resolution_interval: Duration::seconds(
                    config.engine.resolution_interval_secs as i64,
                ),
                resolution_delay: StdDuration::from_millis(config.engine.resolution_delay_ms),
                scale_stake_by_weight: config.engine.scale_stake_by_weight,
            },
            scorer,
            ledger,
            optimizer,
            scanner,
            resolution,
            last_resolution_check: None,
            cycle: 0,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Persist derived state on shutdown. Bets, buffers and weights are
    /// already written as they change.
    pub fn save(&self) -> Result<(), EngineError> {
        self.ledger.persist_stats()
    }

    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, EngineError> {
        let started = std::time::Instant::now();
        self.cycle += 1;
        let mut report = CycleReport { cycle: self.cycle, ..Default::default() };

        match self.scanner.scan().await {
            Ok(opportunities) => {
                report.scanned = opportunities.len();
                let candidates = self.filter_candidates(opportunities);
                report.candidates = candidates.len();
                self.score_candidates(&candidates, now, &mut report)?;
            }
            Err(e) => warn!(error = %e, "Scan failed, skipping scan phase"),
        }

        if self.resolution_due(now) {
            let summary = self
                .ledger
                .resolve_pending(self.resolution.as_ref(), self.config.resolution_delay)
                .await;
            self.last_resolution_check = Some(now);

            if !summary.newly_resolved.is_empty() {
                let mut retrain_due = false;
                for bet in &summary.newly_resolved {
                    retrain_due |= self.feed_back(bet);
                }
                if retrain_due {
                    report.retrained =
                        matches!(self.scorer.retrain()?, RetrainOutcome::Retrained { .. });
                }
                report.reweighted = self.reoptimize()?;
                info!("\n{}", self.ledger.report());
            }
            report.resolution = Some(summary);
        }

        report.elapsed_ms = started.elapsed().as_millis();
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Scan phase
    // -----------------------------------------------------------------------

    fn filter_candidates(&self, opportunities: Vec<Opportunity>) -> Vec<Opportunity> {
        opportunities
            .into_iter()
            .filter(|o| {
                o.yes_price >= self.config.price_floor && o.yes_price <= self.config.price_ceiling
            })
            .filter(|o| o.liquidity >= self.config.min_liquidity)
            .filter(|o| !self.ledger.has_bet_on(&o.id))
            .collect()
    }

    fn score_candidates(
        &mut self,
        candidates: &[Opportunity],
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<(), EngineError> {
        for opportunity in candidates {
            let result = self.scorer.score(opportunity, now);
            debug!(market_id = %opportunity.id, verdict = %result, "Scored opportunity");

            match result.recommendation {
                Recommendation::Bet
                    if result.opportunity_score >= self.scorer.config().min_auto_bet_score =>
                {
                    if self.ledger.pending_count() >= self.config.max_open_bets {
                        debug!(
                            cap = self.config.max_open_bets,
                            "Open bet cap reached, not placing"
                        );
                        report.skipped += 1;
                        continue;
                    }
                    self.place_bet(opportunity, &result, now)?;
                    report.placed += 1;
                }
                Recommendation::Bet | Recommendation::Watch => {
                    info!(
                        market_id = %opportunity.id,
                        verdict = %result,
                        question = %opportunity.question,
                        "👀 Watching"
                    );
                    report.watched += 1;
                }
                Recommendation::Skip => report.skipped += 1,
            }
        }
        Ok(())
    }

    fn place_bet(
        &mut self,
        opportunity: &Opportunity,
        score: &ScoreResult,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut stake = self.scorer.config().stake;
        if self.config.scale_stake_by_weight {
            // scale relative to the equal share so untouched weights
            // leave the stake as configured
            let share = self.optimizer.weight_for(score.strategy);
            let n = self.optimizer.weights().len().max(1);
            stake *= d(share * n as f64);
        }

        let bet = Bet::open(
            &opportunity.id,
            &opportunity.question,
            score.features.category(),
            opportunity.yes_price,
            stake,
            score.opportunity_score,
            score.strategy,
            Some(score.features.clone()),
            now,
        )?;
        info!(
            market_id = %opportunity.id,
            strategy = %score.strategy,
            price = %format!("${:.4}", opportunity.yes_price),
            stake = %format!("${:.2}", bet.stake),
            potential = %format!("${:.2}", bet.potential_return),
            ev = %format!("${:.2}", score.expected_value),
            question = %opportunity.question,
            "📈 Paper bet placed"
        );
        debug!(reasons = ?score.reasons, "Bet rationale");
        self.ledger.record(bet);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Resolution phase
    // -----------------------------------------------------------------------

    fn resolution_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_resolution_check {
            None => true,
            Some(last) => now - last >= self.config.resolution_interval,
        }
    }

    /// Turn one settled bet into a training example. Cancelled bets and
    /// bets without stored features carry no signal. Returns whether the
    /// scorer's buffer is ready for a retrain.
    fn feed_back(&mut self, bet: &Bet) -> bool {
        let won = match bet.status {
            BetStatus::Won => true,
            BetStatus::Lost => false,
            _ => return false,
        };
        let Some(features) = bet.features.as_ref() else {
            warn!(
                market_id = %bet.opportunity_id,
                "Resolved bet has no stored features, skipping training example"
            );
            return false;
        };
        let receipt = self.scorer.record_outcome(features, won);
        debug!(
            market_id = %bet.opportunity_id,
            buffered = receipt.buffered,
            retrain_due = receipt.retrain_due,
            "Outcome recorded"
        );
        receipt.retrain_due
    }

    /// Re-run the weight optimization over the full settled history.
    /// Returns true when the weights actually moved.
    fn reoptimize(&mut self) -> Result<bool, EngineError> {
        let trades: Vec<ResolvedTrade> = self
            .ledger
            .bets()
            .iter()
            .filter(|b| matches!(b.status, BetStatus::Won | BetStatus::Lost))
            .map(|b| ResolvedTrade {
                strategy: b.strategy.clone(),
                pnl: b.profit_loss.unwrap_or_default().to_f64().unwrap_or(0.0),
                won: b.status == BetStatus::Won,
            })
            .collect();
        if trades.is_empty() {
            return Ok(false);
        }
        let result = self.optimizer.optimize(&trades)?;
        debug!(weights = ?result.optimized_weights, "Strategy weights updated");
        Ok(result.iterations > 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
