//! Position ledger.
//!
//! Owns every bet the engine has placed: opening, resolution sweeps,
//! and the aggregate statistics derived from them. Statistics are never
//! mutated incrementally; they are recomputed in full from the bet list
//! so the persisted numbers always agree with the bets on disk.
//!
//! The ledger assumes a single writer. Both the scan path (opening) and
//! the resolution path (settling) run on the engine's cycle loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::features;
use crate::markets::ResolutionSource;
use crate::store::{self, StateStore};
use crate::types::{Bet, BetStatus, Category, EngineError};

pub const BETS_SLOT: &str = "bets";
/// Append-only archive of resolved bets.
pub const RESULTS_SLOT: &str = "results";
pub const STATS_SLOT: &str = "stats";

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Totals derived from the full bet list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_bets: usize,
    pub pending: usize,
    pub wins: usize,
    pub losses: usize,
    pub cancelled: usize,
    /// Sum of stakes across all bets, pending included.
    pub total_invested: Decimal,
    /// Sum of actual returns across settled bets.
    pub total_returned: Decimal,
    /// Sum of realized P&L across settled bets.
    pub total_profit: Decimal,
    /// Wins over decided bets (wins + losses), as a percentage.
    pub hit_rate: f64,
    /// Returned over invested, minus one, as a percentage.
    pub roi: f64,
    pub best_win: Decimal,
    pub avg_win_multiplier: f64,
}

impl AggregateStats {
    pub fn from_bets(bets: &[Bet]) -> Self {
        let mut stats = Self { total_bets: bets.len(), ..Self::default() };
        let mut multiplier_sum = 0.0;

        for bet in bets {
            stats.total_invested += bet.stake;
            match bet.status {
                BetStatus::Pending => stats.pending += 1,
                BetStatus::Won => stats.wins += 1,
                BetStatus::Lost => stats.losses += 1,
                BetStatus::Cancelled => stats.cancelled += 1,
            }
            if bet.is_pending() {
                continue;
            }

            let returned = bet.actual_return.unwrap_or_default();
            stats.total_returned += returned;
            stats.total_profit += bet.profit_loss.unwrap_or_default();
            if bet.status == BetStatus::Won {
                if returned > stats.best_win {
                    stats.best_win = returned;
                }
                multiplier_sum += (returned / bet.stake).to_f64().unwrap_or(0.0);
            }
        }

        let decided = stats.wins + stats.losses;
        if decided > 0 {
            stats.hit_rate = stats.wins as f64 / decided as f64 * 100.0;
        }
        if stats.total_invested > Decimal::ZERO {
            let ratio = stats.total_returned / stats.total_invested;
            stats.roi = (ratio.to_f64().unwrap_or(0.0) - 1.0) * 100.0;
        }
        if stats.wins > 0 {
            stats.avg_win_multiplier = multiplier_sum / stats.wins as f64;
        }
        stats
    }
}

/// Persisted envelope for the stats slot.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsRecord {
    #[serde(flatten)]
    pub stats: AggregateStats,
    pub last_updated: DateTime<Utc>,
}

/// What one resolution sweep did.
#[derive(Debug, Default)]
pub struct ResolutionSummary {
    /// Pending bets queried, including failed lookups.
    pub checked: usize,
    pub wins: usize,
    pub losses: usize,
    pub cancelled: usize,
    pub errors: usize,
    /// Pending bets remaining after the sweep.
    pub still_pending: usize,
    pub realized_pnl: Decimal,
    pub newly_resolved: Vec<Bet>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct Ledger {
    bets: Vec<Bet>,
    store: Arc<dyn StateStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { bets: Vec::new(), store }
    }

    /// Restore the bet list from the store. A missing slot yields an
    /// empty ledger.
    pub fn load(store: Arc<dyn StateStore>) -> Result<Self, EngineError> {
        let bets: Vec<Bet> = store::load(store.as_ref(), BETS_SLOT)?.unwrap_or_default();
        if !bets.is_empty() {
            info!(
                bets = bets.len(),
                pending = bets.iter().filter(|b| b.is_pending()).count(),
                "Ledger restored"
            );
        }
        Ok(Self { bets, store })
    }

    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    pub fn pending_count(&self) -> usize {
        self.bets.iter().filter(|b| b.is_pending()).count()
    }

    /// True if any bet, settled or not, was placed on this market.
    pub fn has_bet_on(&self, opportunity_id: &str) -> bool {
        self.bets.iter().any(|b| b.opportunity_id == opportunity_id)
    }

    /// Record a freshly opened bet and persist the ledger.
    pub fn record(&mut self, bet: Bet) {
        debug!(market_id = %bet.opportunity_id, strategy = %bet.strategy, "Recording bet");
        self.bets.push(bet);
        self.persist();
    }

    /// Check every pending bet against the resolution source. Lookups
    /// are spaced by `delay`. A failed lookup leaves the bet pending
    /// for the next sweep. Each transition is persisted immediately
    /// and archived to the results slot.
    pub async fn resolve_pending(
        &mut self,
        source: &dyn ResolutionSource,
        delay: Duration,
    ) -> ResolutionSummary {
        let pending: Vec<usize> = self
            .bets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_pending())
            .map(|(i, _)| i)
            .collect();

        let mut summary = ResolutionSummary::default();
        for (n, index) in pending.into_iter().enumerate() {
            if n > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let market_id = self.bets[index].opportunity_id.clone();
            summary.checked += 1;
            let status = match source.market_status(&market_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(market_id = %market_id, error = %e, "Resolution check failed, bet stays pending");
                    summary.errors += 1;
                    continue;
                }
            };
            if !status.resolved {
                continue;
            }

            let applied = self.bets[index].apply_resolution(status.resolution_price, Utc::now());
            if !applied {
                continue;
            }
            let resolved = self.bets[index].clone();
            match resolved.status {
                BetStatus::Won => summary.wins += 1,
                BetStatus::Lost => summary.losses += 1,
                BetStatus::Cancelled => summary.cancelled += 1,
                BetStatus::Pending => {}
            }
            let pnl = resolved.profit_loss.unwrap_or_default();
            summary.realized_pnl += pnl;
            info!(
                market_id = %resolved.opportunity_id,
                status = %resolved.status,
                pnl = %format!("${:.2}", pnl),
                question = %resolved.question,
                "Bet resolved"
            );

            self.persist();
            if let Err(e) = store::append(self.store.as_ref(), RESULTS_SLOT, &resolved) {
                error!(error = %e, "Result archive write failed");
            }
            summary.newly_resolved.push(resolved);
        }

        summary.still_pending = self.pending_count();
        if !summary.newly_resolved.is_empty() {
            if let Err(e) = self.persist_stats() {
                error!(error = %e, "Stats write failed");
            }
        }
        summary
    }

    pub fn stats(&self) -> AggregateStats {
        AggregateStats::from_bets(&self.bets)
    }

    /// Recompute and persist the stats slot.
    pub fn persist_stats(&self) -> Result<(), EngineError> {
        let record = StatsRecord { stats: self.stats(), last_updated: Utc::now() };
        store::save(self.store.as_ref(), STATS_SLOT, &record)
    }

    /// Pending exposure grouped by question category. Categories are
    /// derived from the question text so bets imported from older
    /// ledgers group correctly.
    pub fn pending_by_category(&self) -> BTreeMap<Category, usize> {
        let mut map = BTreeMap::new();
        for bet in self.bets.iter().filter(|b| b.is_pending()) {
            *map.entry(features::detect_category(&bet.question)).or_insert(0) += 1;
        }
        map
    }

    /// Human-readable position report.
    pub fn report(&self) -> String {
        let stats = self.stats();
        let mut lines = vec![
            "📊 POSITION REPORT".to_string(),
            format!(
                "   Bets: {} total | {} pending | {} won | {} lost | {} cancelled",
                stats.total_bets, stats.pending, stats.wins, stats.losses, stats.cancelled
            ),
            format!(
                "   Invested: ${:.2} | Returned: ${:.2} | P&L: ${:.2}",
                stats.total_invested, stats.total_returned, stats.total_profit
            ),
            format!(
                "   Hit rate: {:.1}% | ROI: {:.1}% | Best win: ${:.2} | Avg win: {:.1}x",
                stats.hit_rate, stats.roi, stats.best_win, stats.avg_win_multiplier
            ),
        ];
        let pending = self.pending_by_category();
        if !pending.is_empty() {
            let breakdown = pending
                .iter()
                .map(|(category, count)| format!("{category} {count}"))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("   Pending by category: {breakdown}"));
        }
        lines.join("\n")
    }

    /// Write the bet list. A failed write is logged and the in-memory
    /// ledger stays authoritative for the rest of the process lifetime.
    fn persist(&self) {
        if let Err(e) = store::save(self.store.as_ref(), BETS_SLOT, &self.bets) {
            error!(error = %e, "Bet write failed, in-memory ledger stays authoritative");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
