//! Opportunity scoring.
//!
//! Combines a transparent rule score with a classifier that learns from
//! resolved bets. The rule score starts at a base of 50 and moves with
//! price, expiry, category and payout multiplier; the win probability
//! blends the classifier output with a prior-scaled rule component and
//! feeds the expected-value sizing that drives the recommendation.
//!
//! Training examples accumulate in bounded buffers and the classifier
//! retrains in place once enough resolved outcomes arrive. All of it
//! (buffers, per-category tallies, model weights) persists through one
//! state slot.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{ExpiryBands, MultiplierBand, PriceBand, ScorerSection};
use crate::features;
use crate::model::Classifier;
use crate::store::{self, StateStore};
use crate::types::{d, Category, EngineError, FeatureVector, Opportunity, Recommendation, FEATURE_COUNT};

pub const SCORER_SLOT: &str = "scorer_state";

/// Sub-strategy tags, assigned by price depth at decision time.
pub const STRATEGY_DEEP_TAIL: &str = "deep_tail";
pub const STRATEGY_STANDARD_TAIL: &str = "standard_tail";
pub const STRATEGY_VALUE_TAIL: &str = "value_tail";

pub const KNOWN_STRATEGIES: &[&str] =
    &[STRATEGY_DEEP_TAIL, STRATEGY_STANDARD_TAIL, STRATEGY_VALUE_TAIL];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scoring parameters in domain form: money as `Decimal`, category
/// bonuses keyed by parsed [`Category`].
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub stake: Decimal,
    pub price_ceiling: f64,
    pub min_auto_bet_score: f64,
    pub prior_win_prob: f64,
    pub ml_weight: f64,
    pub rule_weight: f64,
    pub buffer_capacity: usize,
    pub retrain_min_examples: usize,
    pub retain_recent: usize,
    pub bet_min_ev: Decimal,
    pub bet_min_rule_score: f64,
    pub watch_min_ev: Decimal,
    pub watch_min_rule_score: f64,
    pub price_bands: Vec<PriceBand>,
    pub expiry: ExpiryBands,
    pub category_bonus: BTreeMap<Category, f64>,
    pub multiplier_bands: Vec<MultiplierBand>,
    pub deep_tail_max_price: f64,
    pub standard_tail_max_price: f64,
}

impl ScorerConfig {
    /// Build from the TOML section. Unknown category names are skipped
    /// with a warning rather than failing startup.
    pub fn from_section(section: &ScorerSection, price_ceiling: f64) -> Self {
        let mut category_bonus = BTreeMap::new();
        for (name, bonus) in &section.category_bonus {
            match name.parse::<Category>() {
                Ok(category) => {
                    category_bonus.insert(category, *bonus);
                }
                Err(_) => warn!(category = %name, "Unknown category in category_bonus, skipping"),
            }
        }

        Self {
            stake: d(section.stake_usd),
            price_ceiling,
            min_auto_bet_score: section.min_auto_bet_score,
            prior_win_prob: section.prior_win_prob,
            ml_weight: section.ml_weight,
            rule_weight: section.rule_weight,
            buffer_capacity: section.buffer_capacity,
            retrain_min_examples: section.retrain_min_examples,
            retain_recent: section.retain_recent,
            bet_min_ev: d(section.bet_min_ev),
            bet_min_rule_score: section.bet_min_rule_score,
            watch_min_ev: d(section.watch_min_ev),
            watch_min_rule_score: section.watch_min_rule_score,
            price_bands: section.price_bands.clone(),
            expiry: section.expiry.clone(),
            category_bonus,
            multiplier_bands: section.multiplier_bands.clone(),
            deep_tail_max_price: section.deep_tail_max_price,
            standard_tail_max_price: section.standard_tail_max_price,
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self::from_section(&ScorerSection::default(), 0.04)
    }
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Everything the engine needs to act on one scored opportunity.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreResult {
    pub opportunity_id: String,
    /// Transparent rule score in [0, 100].
    pub rule_score: f64,
    /// Normalized rule score in [0, 1], compared against the auto-bet
    /// threshold.
    pub opportunity_score: f64,
    /// Classifier output, present only once trained.
    pub ml_probability: Option<f64>,
    /// Blended win probability used for expected value.
    pub win_probability: f64,
    pub expected_value: Decimal,
    pub recommendation: Recommendation,
    pub strategy: &'static str,
    /// Decision-time features, snapshotted onto the bet when placed.
    pub features: FeatureVector,
    pub reasons: Vec<String>,
}

impl fmt::Display for ScoreResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} rule={:.0} q={:.4} ev=${:.2}",
            self.recommendation,
            self.strategy,
            self.rule_score,
            self.win_probability,
            self.expected_value
        )
    }
}

/// What `record_outcome` did with one resolved bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeReceipt {
    /// Buffer size after the example was added.
    pub buffered: usize,
    /// True once the rolling buffer has filled to capacity.
    pub retrain_due: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrainOutcome {
    Retrained { examples: usize },
    SkippedTooFew { buffered: usize, needed: usize },
    /// All buffered labels are one class; a fit would be degenerate.
    SkippedSingleClass,
}

/// Per-category win/loss tally.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryStats {
    pub wins: u32,
    pub losses: u32,
}

impl CategoryStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.wins + self.losses;
        if total == 0 {
            0.0
        } else {
            f64::from(self.wins) / f64::from(total)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ScorerState {
    features: Vec<[f64; FEATURE_COUNT]>,
    labels: Vec<bool>,
    category_stats: BTreeMap<Category, CategoryStats>,
    model: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct Scorer {
    config: ScorerConfig,
    classifier: Box<dyn Classifier>,
    feature_buffer: VecDeque<[f64; FEATURE_COUNT]>,
    label_buffer: VecDeque<bool>,
    category_stats: BTreeMap<Category, CategoryStats>,
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scorer")
            .field("config", &self.config)
            .field("feature_buffer", &self.feature_buffer)
            .field("label_buffer", &self.label_buffer)
            .field("category_stats", &self.category_stats)
            .finish_non_exhaustive()
    }
}

impl Scorer {
    pub fn new(
        config: ScorerConfig,
        classifier: Box<dyn Classifier>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            config,
            classifier,
            feature_buffer: VecDeque::new(),
            label_buffer: VecDeque::new(),
            category_stats: BTreeMap::new(),
            store,
        }
    }

    /// Restore buffers, tallies and model weights from the state slot.
    /// A missing slot yields a fresh scorer.
    pub fn load(
        config: ScorerConfig,
        mut classifier: Box<dyn Classifier>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, EngineError> {
        let Some(state) = store::load::<ScorerState>(store.as_ref(), SCORER_SLOT)? else {
            return Ok(Self::new(config, classifier, store));
        };

        if state.features.len() != state.labels.len() {
            return Err(EngineError::Storage {
                slot: SCORER_SLOT.to_string(),
                message: format!(
                    "{} buffered features but {} labels",
                    state.features.len(),
                    state.labels.len()
                ),
            });
        }
        classifier.import_state(state.model)?;

        let mut scorer = Self {
            config,
            classifier,
            feature_buffer: VecDeque::from(state.features),
            label_buffer: VecDeque::from(state.labels),
            category_stats: state.category_stats,
            store,
        };
        // capacity may have shrunk since the state was written
        while scorer.feature_buffer.len() > scorer.config.buffer_capacity {
            scorer.feature_buffer.pop_front();
            scorer.label_buffer.pop_front();
        }
        info!(
            buffered = scorer.feature_buffer.len(),
            trained = scorer.classifier.is_trained(),
            "Scorer state restored"
        );
        Ok(scorer)
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn buffered(&self) -> usize {
        self.feature_buffer.len()
    }

    pub fn is_trained(&self) -> bool {
        self.classifier.is_trained()
    }

    /// Historical hit rate for a category, falling back to the tail
    /// prior until outcomes exist.
    pub fn category_hit_rate(&self, category: Category) -> f64 {
        self.category_stats
            .get(&category)
            .map(CategoryStats::hit_rate)
            .unwrap_or(self.config.prior_win_prob)
    }

    pub fn strategy_tag(&self, yes_price: f64) -> &'static str {
        if yes_price <= self.config.deep_tail_max_price {
            STRATEGY_DEEP_TAIL
        } else if yes_price <= self.config.standard_tail_max_price {
            STRATEGY_STANDARD_TAIL
        } else {
            STRATEGY_VALUE_TAIL
        }
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    pub fn score(&self, opportunity: &Opportunity, now: DateTime<Utc>) -> ScoreResult {
        let category = features::detect_category(&opportunity.question);
        let hit_rate = self.category_hit_rate(category);
        let features = features::build(opportunity, self.config.price_ceiling, hit_rate, now);

        let (rule_score, mut reasons) = self.rule_score(&features);
        let (win_probability, ml_probability) = self.win_probability(rule_score, &features);
        if let Some(ml) = ml_probability {
            reasons.push(format!("classifier win prob {ml:.4}"));
        }
        let expected_value = self.expected_value(win_probability, opportunity.yes_price);
        let recommendation = self.recommend(expected_value, rule_score);
        let strategy = self.strategy_tag(features.yes_price);

        ScoreResult {
            opportunity_id: opportunity.id.clone(),
            rule_score,
            opportunity_score: rule_score / 100.0,
            ml_probability,
            win_probability,
            expected_value,
            recommendation,
            strategy,
            features,
            reasons,
        }
    }

    /// Base 50, adjusted by price band, expiry window, category and
    /// payout multiplier. Clamped to [0, 100].
    fn rule_score(&self, f: &FeatureVector) -> (f64, Vec<String>) {
        let mut score = 50.0;
        let mut reasons = Vec::new();

        // first matching band wins; bands are validated ascending
        for band in &self.config.price_bands {
            if f.yes_price <= band.max_price {
                score += band.bonus;
                reasons.push(format!(
                    "price {:.4} within {:.4} ({:+.0})",
                    f.yes_price, band.max_price, band.bonus
                ));
                break;
            }
        }

        let e = &self.config.expiry;
        if f.days_to_expiry >= e.sweet_min_days && f.days_to_expiry <= e.sweet_max_days {
            score += e.sweet_bonus;
            reasons.push(format!(
                "expiry {:.0}d in sweet spot ({:+.0})",
                f.days_to_expiry, e.sweet_bonus
            ));
        } else if f.days_to_expiry < e.sweet_min_days {
            score += e.near_bonus;
            reasons.push(format!(
                "resolves within {:.0}d ({:+.0})",
                e.sweet_min_days, e.near_bonus
            ));
        } else if f.days_to_expiry > e.far_days {
            score += e.far_penalty;
            reasons.push(format!(
                "expiry {:.0}d too far out ({:+.0})",
                f.days_to_expiry, e.far_penalty
            ));
        }

        let category = f.category();
        if let Some(bonus) = self.config.category_bonus.get(&category) {
            score += bonus;
            reasons.push(format!("{category} category ({bonus:+.0})"));
        }

        for band in &self.config.multiplier_bands {
            if f.potential_multiplier >= band.min_multiplier {
                score += band.bonus;
                reasons.push(format!(
                    "{:.0}x payout ({:+.0})",
                    f.potential_multiplier, band.bonus
                ));
                break;
            }
        }

        (score.clamp(0.0, 100.0), reasons)
    }

    /// Untrained: rule score scaled by the tail prior. Trained: blend of
    /// classifier output and the prior-scaled rule component.
    fn win_probability(&self, rule_score: f64, features: &FeatureVector) -> (f64, Option<f64>) {
        let rule_component = (rule_score / 100.0) * self.config.prior_win_prob;
        if !self.classifier.is_trained() {
            return (rule_component, None);
        }
        let ml = self.classifier.predict_probability(&features.to_array());
        let blended = self.config.ml_weight * ml + self.config.rule_weight * rule_component;
        (blended, Some(ml))
    }

    /// EV of the fixed stake: q * payout - (1 - q) * stake, with the
    /// payout taken as stake / price.
    fn expected_value(&self, win_probability: f64, price: Decimal) -> Decimal {
        let q = d(win_probability);
        let stake = self.config.stake;
        if price <= Decimal::ZERO {
            return (Decimal::ONE - q) * -stake;
        }
        let payout = stake / price;
        q * payout - (Decimal::ONE - q) * stake
    }

    fn recommend(&self, expected_value: Decimal, rule_score: f64) -> Recommendation {
        if expected_value > self.config.bet_min_ev && rule_score > self.config.bet_min_rule_score {
            Recommendation::Bet
        } else if expected_value > self.config.watch_min_ev
            && rule_score > self.config.watch_min_rule_score
        {
            Recommendation::Watch
        } else {
            Recommendation::Skip
        }
    }

    // -----------------------------------------------------------------------
    // Feedback and retraining
    // -----------------------------------------------------------------------

    /// Buffer one resolved outcome and update the category tally. The
    /// oldest example is evicted once the buffer is at capacity. State
    /// is written before returning. Retraining itself is left to the
    /// orchestrator; the receipt flags when the buffer is full.
    pub fn record_outcome(&mut self, features: &FeatureVector, won: bool) -> OutcomeReceipt {
        if self.feature_buffer.len() >= self.config.buffer_capacity {
            self.feature_buffer.pop_front();
            self.label_buffer.pop_front();
        }
        self.feature_buffer.push_back(features.to_array());
        self.label_buffer.push_back(won);

        let stats = self.category_stats.entry(features.category()).or_default();
        if won {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }

        self.persist();
        OutcomeReceipt {
            buffered: self.feature_buffer.len(),
            retrain_due: self.feature_buffer.len() >= self.config.buffer_capacity,
        }
    }

    /// Refit the classifier on the buffered examples. Skips (leaving the
    /// buffers untouched) when there are too few examples or only one
    /// outcome class. On success the buffers are trimmed to the most
    /// recent examples so the next retrain leans fresh.
    pub fn retrain(&mut self) -> Result<RetrainOutcome, EngineError> {
        if self.feature_buffer.len() < self.config.retrain_min_examples {
            return Ok(RetrainOutcome::SkippedTooFew {
                buffered: self.feature_buffer.len(),
                needed: self.config.retrain_min_examples,
            });
        }
        let wins = self.label_buffer.iter().filter(|l| **l).count();
        if wins == 0 || wins == self.label_buffer.len() {
            warn!(
                buffered = self.label_buffer.len(),
                wins, "Retrain skipped: outcomes are all one class"
            );
            return Ok(RetrainOutcome::SkippedSingleClass);
        }

        let rows: Vec<[f64; FEATURE_COUNT]> = self.feature_buffer.iter().copied().collect();
        let labels: Vec<bool> = self.label_buffer.iter().copied().collect();
        self.classifier.fit(&rows, &labels)?;

        while self.feature_buffer.len() > self.config.retain_recent {
            self.feature_buffer.pop_front();
            self.label_buffer.pop_front();
        }
        self.persist();
        info!(
            examples = rows.len(),
            retained = self.feature_buffer.len(),
            model = self.classifier.name(),
            "Classifier retrained"
        );
        Ok(RetrainOutcome::Retrained { examples: rows.len() })
    }

    /// Write buffers, tallies and model weights. A failed write is
    /// logged and the in-memory state stays authoritative.
    fn persist(&self) {
        let model = match self.classifier.export_state() {
            Ok(model) => model,
            Err(e) => {
                error!(error = %e, "Model export failed, scorer state not written");
                return;
            }
        };
        let state = ScorerState {
            features: self.feature_buffer.iter().copied().collect(),
            labels: self.label_buffer.iter().copied().collect(),
            category_stats: self.category_stats.clone(),
            model,
        };
        if let Err(e) = store::save(self.store.as_ref(), SCORER_SLOT, &state) {
            error!(error = %e, "Scorer state write failed, in-memory state stays authoritative");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
