//! Core domain types shared across the engine.
//!
//! Everything that crosses a module boundary lives here: opportunities,
//! feature vectors, bets and their lifecycle, recommendations, and the
//! crate-wide error enum.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Convert an `f64` to `Decimal`, defaulting to zero on non-finite input.
/// Used at the boundary between probability math (f64) and money (Decimal).
pub fn d(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Market category detected from question text.
///
/// Detection priority (first match wins) is political > crypto > sports >
/// finance > tech > other; see `features::detect_category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Political,
    Crypto,
    Sports,
    Finance,
    Tech,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Political,
        Category::Crypto,
        Category::Sports,
        Category::Finance,
        Category::Tech,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Political => "political",
            Category::Crypto => "crypto",
            Category::Sports => "sports",
            Category::Finance => "finance",
            Category::Tech => "tech",
            Category::Other => "other",
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Other
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "political" | "politics" => Ok(Category::Political),
            "crypto" => Ok(Category::Crypto),
            "sports" => Ok(Category::Sports),
            "finance" => Ok(Category::Finance),
            "tech" => Ok(Category::Tech),
            "other" => Ok(Category::Other),
            other => Err(EngineError::Config(format!("unknown category: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Opportunities
// ---------------------------------------------------------------------------

/// A tail opportunity as delivered by a market scanner: a binary market
/// whose YES side trades at a deep discount.
///
/// `end_date` is kept as the raw string from the venue. It may be missing
/// or malformed; `features::days_to_expiry` handles both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    /// Venue identifier (condition id for Polymarket).
    pub id: String,
    pub question: String,
    pub yes_price: Decimal,
    pub liquidity: Decimal,
    pub volume_24h: Decimal,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] '{}' @ ${}", self.id, self.question, self.yes_price)
    }
}

// ---------------------------------------------------------------------------
// Feature vectors
// ---------------------------------------------------------------------------

/// Number of model features. Must match `FeatureVector::to_array`.
pub const FEATURE_COUNT: usize = 14;

/// The 14 numeric features describing one opportunity at scoring time.
///
/// Built once per scoring call and consumed immediately. A copy is
/// snapshotted onto the `Bet` at placement so resolved outcomes can train
/// the classifier on exactly the features seen at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub yes_price: f64,
    /// YES price as a fraction of the configured price ceiling.
    pub price_pct: f64,
    /// Payout multiplier if YES resolves true (1 / price).
    pub potential_multiplier: f64,
    pub liquidity: f64,
    pub volume_24h: f64,
    pub days_to_expiry: f64,
    pub hour_of_day: f64,
    pub day_of_week: f64,
    pub is_political: f64,
    pub is_crypto: f64,
    pub is_sports: f64,
    pub is_finance: f64,
    pub is_tech: f64,
    /// Historical hit rate of the detected category, or the prior.
    pub category_hit_rate: f64,
}

impl FeatureVector {
    pub const NAMES: [&'static str; FEATURE_COUNT] = [
        "yes_price",
        "price_pct",
        "potential_multiplier",
        "liquidity",
        "volume_24h",
        "days_to_expiry",
        "hour_of_day",
        "day_of_week",
        "is_political",
        "is_crypto",
        "is_sports",
        "is_finance",
        "is_tech",
        "category_hit_rate",
    ];

    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.yes_price,
            self.price_pct,
            self.potential_multiplier,
            self.liquidity,
            self.volume_24h,
            self.days_to_expiry,
            self.hour_of_day,
            self.day_of_week,
            self.is_political,
            self.is_crypto,
            self.is_sports,
            self.is_finance,
            self.is_tech,
            self.category_hit_rate,
        ]
    }

    /// Primary category from the one-hot flags, same priority order as
    /// keyword detection.
    pub fn category(&self) -> Category {
        if self.is_political > 0.0 {
            Category::Political
        } else if self.is_crypto > 0.0 {
            Category::Crypto
        } else if self.is_sports > 0.0 {
            Category::Sports
        } else if self.is_finance > 0.0 {
            Category::Finance
        } else if self.is_tech > 0.0 {
            Category::Tech
        } else {
            Category::Other
        }
    }
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

/// Scorer verdict for one opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Bet,
    Watch,
    Skip,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Bet => "BET",
            Recommendation::Watch => "WATCH",
            Recommendation::Skip => "SKIP",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Bet lifecycle
// ---------------------------------------------------------------------------

/// Bet status. `Pending` is the only non-terminal state.
///
/// Deserialization normalizes legacy spellings ("open", "OPEN", empty
/// string) and anything unrecognized to `Pending`; this is the single
/// place where on-disk status strings enter the closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Cancelled,
}

impl BetStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BetStatus::Pending)
    }
}

impl<'de> Deserialize<'de> for BetStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.to_ascii_lowercase().as_str() {
            "won" => BetStatus::Won,
            "lost" => BetStatus::Lost,
            "cancelled" | "canceled" => BetStatus::Cancelled,
            // "pending", "open", "" and unknown strings all normalize here
            _ => BetStatus::Pending,
        })
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BetStatus::Pending => "pending",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One paper bet and its full lifecycle.
///
/// While `status` is `Pending`, the resolution fields (`resolution_price`,
/// `resolved_at`, `actual_return`, `profit_loss`) are all `None`. A
/// terminal transition fills them exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub placed_at: DateTime<Utc>,
    pub opportunity_id: String,
    pub question: String,
    #[serde(default)]
    pub category: Category,
    pub entry_price: Decimal,
    pub stake: Decimal,
    /// Shares bought: stake / entry price. Each share pays $1 on YES.
    pub size: Decimal,
    pub potential_return: Decimal,
    /// Blended win probability at placement.
    #[serde(default)]
    pub score: f64,
    /// Sub-strategy tag (price-depth family) for weight optimization.
    #[serde(default)]
    pub strategy: String,
    pub status: BetStatus,
    #[serde(default)]
    pub resolution_price: Option<Decimal>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_return: Option<Decimal>,
    #[serde(default)]
    pub profit_loss: Option<Decimal>,
    /// Feature snapshot from scoring time, used for outcome feedback.
    #[serde(default)]
    pub features: Option<FeatureVector>,
}

impl Bet {
    /// Open a new pending paper bet. Size is derived from stake and price.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        opportunity_id: &str,
        question: &str,
        category: Category,
        entry_price: Decimal,
        stake: Decimal,
        score: f64,
        strategy: &str,
        features: Option<FeatureVector>,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        if entry_price <= Decimal::ZERO {
            return Err(EngineError::InvalidBet(format!(
                "entry price must be positive, got {entry_price}"
            )));
        }
        if stake <= Decimal::ZERO {
            return Err(EngineError::InvalidBet(format!(
                "stake must be positive, got {stake}"
            )));
        }

        let size = stake / entry_price;
        Ok(Bet {
            id: Uuid::new_v4().to_string(),
            placed_at: now,
            opportunity_id: opportunity_id.to_string(),
            question: question.to_string(),
            category,
            entry_price,
            stake,
            size,
            potential_return: size,
            score,
            strategy: strategy.to_string(),
            status: BetStatus::Pending,
            resolution_price: None,
            resolved_at: None,
            actual_return: None,
            profit_loss: None,
            features,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == BetStatus::Pending
    }

    /// Apply a market resolution. Returns `true` if the bet transitioned,
    /// `false` if it was already terminal (idempotent no-op).
    ///
    /// `resolution_price` of `None` means the market resolved without a
    /// usable outcome (voided): the stake is refunded. `1.0` means YES
    /// won; anything else means YES lost.
    pub fn apply_resolution(
        &mut self,
        resolution_price: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        match resolution_price {
            None => {
                self.status = BetStatus::Cancelled;
                self.actual_return = Some(self.stake);
                self.profit_loss = Some(Decimal::ZERO);
            }
            Some(price) if price == Decimal::ONE => {
                self.status = BetStatus::Won;
                self.resolution_price = Some(price);
                self.actual_return = Some(self.size);
                self.profit_loss = Some(self.size - self.stake);
            }
            Some(price) => {
                self.status = BetStatus::Lost;
                self.resolution_price = Some(price);
                self.actual_return = Some(Decimal::ZERO);
                self.profit_loss = Some(-self.stake);
            }
        }

        self.resolved_at = Some(at);
        true
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ${} @ ${} on '{}' ({})",
            self.status, self.stake, self.entry_price, self.question, self.id
        )
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Crate-wide error enum for domain failures.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Scanner error: {message}")]
    Scanner { message: String },

    #[error("Resolution source error for market {market_id}: {message}")]
    Resolution { market_id: String, message: String },

    #[error("Storage error in slot '{slot}': {message}")]
    Storage { slot: String, message: String },

    #[error("Classifier error: {0}")]
    Model(String),

    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
