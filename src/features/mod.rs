//! Feature extraction.
//!
//! Turns a raw market snapshot into the fixed-width numeric vector the
//! scorer and classifier consume. Category detection is keyword-based
//! over the question text; when several categories match, the most
//! specific signal wins in a fixed priority order.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;

use crate::types::{Category, FeatureVector, Opportunity};

/// Fallback when the expiry is missing or unparsable. Far-dated markets
/// score the same either way.
pub const DEFAULT_DAYS_TO_EXPIRY: f64 = 365.0;

// ---------------------------------------------------------------------------
// Category detection
// ---------------------------------------------------------------------------

const POLITICAL_KEYWORDS: &[&str] = &[
    "trump", "biden", "election", "president", "congress", "senate", "government", "war",
    "russia", "ukraine", "china", "nato", "minister",
];

const CRYPTO_KEYWORDS: &[&str] = &[
    "btc", "bitcoin", "eth", "ethereum", "sol", "solana", "crypto", "coinbase", "binance",
    "token", "blockchain",
];

const SPORTS_KEYWORDS: &[&str] = &[
    "nba", "nfl", "mlb", "soccer", "football", "basketball", "traded", "championship",
    "playoffs", "win", "match",
];

const FINANCE_KEYWORDS: &[&str] = &[
    "stock", "msft", "aapl", "amzn", "nvda", "fed", "interest rate", "market cap", "etf",
    "52-week", "gold",
];

const TECH_KEYWORDS: &[&str] = &[
    "ai", "openai", "google", "anthropic", "chatgpt", "model", "grok", "apple", "microsoft",
    "meta", "nvidia",
];

/// Classify a question by keyword match. Priority: political beats
/// crypto beats sports beats finance beats tech.
pub fn detect_category(text: &str) -> Category {
    let text = text.to_lowercase();
    let hit = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    if hit(POLITICAL_KEYWORDS) {
        Category::Political
    } else if hit(CRYPTO_KEYWORDS) {
        Category::Crypto
    } else if hit(SPORTS_KEYWORDS) {
        Category::Sports
    } else if hit(FINANCE_KEYWORDS) {
        Category::Finance
    } else if hit(TECH_KEYWORDS) {
        Category::Tech
    } else {
        Category::Other
    }
}

// ---------------------------------------------------------------------------
// Expiry parsing
// ---------------------------------------------------------------------------

/// Days until the market expires, clamped at zero. Accepts RFC 3339,
/// naive datetimes and bare dates; anything else falls back to
/// [`DEFAULT_DAYS_TO_EXPIRY`].
pub fn days_to_expiry(end_date: Option<&str>, now: DateTime<Utc>) -> f64 {
    let Some(raw) = end_date else {
        return DEFAULT_DAYS_TO_EXPIRY;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return DEFAULT_DAYS_TO_EXPIRY;
    }

    match parse_end_date(raw) {
        Some(expiry) => {
            let secs = (expiry - now).num_seconds() as f64;
            (secs / 86_400.0).max(0.0)
        }
        None => DEFAULT_DAYS_TO_EXPIRY,
    }
}

fn parse_end_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

// ---------------------------------------------------------------------------
// Vector assembly
// ---------------------------------------------------------------------------

/// Build the feature vector for one opportunity at decision time.
///
/// `category_hit_rate` is the caller's historical hit rate for the
/// detected category, in [0, 1].
pub fn build(
    opportunity: &Opportunity,
    price_ceiling: f64,
    category_hit_rate: f64,
    now: DateTime<Utc>,
) -> FeatureVector {
    let yes_price = opportunity.yes_price.to_f64().unwrap_or(0.0);
    let category = detect_category(&opportunity.question);
    let flag = |c: Category| if category == c { 1.0 } else { 0.0 };

    FeatureVector {
        yes_price,
        price_pct: if price_ceiling > 0.0 {
            yes_price / price_ceiling
        } else {
            0.0
        },
        potential_multiplier: if yes_price > 0.0 { 1.0 / yes_price } else { 0.0 },
        liquidity: opportunity.liquidity.to_f64().unwrap_or(0.0),
        volume_24h: opportunity.volume_24h.to_f64().unwrap_or(0.0),
        days_to_expiry: days_to_expiry(opportunity.end_date.as_deref(), now),
        hour_of_day: now.hour() as f64,
        day_of_week: now.weekday().num_days_from_monday() as f64,
        is_political: flag(Category::Political),
        is_crypto: flag(Category::Crypto),
        is_sports: flag(Category::Sports),
        is_finance: flag(Category::Finance),
        is_tech: flag(Category::Tech),
        category_hit_rate,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    // ---- helpers ----

    fn make_opportunity(question: &str, end_date: Option<&str>) -> Opportunity {
        Opportunity {
            id: "m1".to_string(),
            question: question.to_string(),
            yes_price: dec!(0.01),
            liquidity: dec!(5000),
            volume_24h: dec!(1200),
            end_date: end_date.map(str::to_string),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        // A Wednesday, 14:30 UTC.
        Utc.with_ymd_and_hms(2025, 6, 18, 14, 30, 0).unwrap()
    }

    // ---- category detection ----

    #[test]
    fn test_detect_each_category() {
        assert_eq!(detect_category("Will Congress pass the bill?"), Category::Political);
        assert_eq!(detect_category("Will Bitcoin reach $200k?"), Category::Crypto);
        assert_eq!(detect_category("Will the Lakers make the playoffs?"), Category::Sports);
        assert_eq!(detect_category("Will NVDA stock split?"), Category::Finance);
        assert_eq!(detect_category("Will OpenAI release a new model?"), Category::Tech);
        assert_eq!(detect_category("Will it snow tomorrow?"), Category::Other);
    }

    #[test]
    fn test_detection_is_case_insensitive() {
        assert_eq!(detect_category("WILL TRUMP WIN?"), Category::Political);
        assert_eq!(detect_category("will eth flip btc?"), Category::Crypto);
    }

    #[test]
    fn test_political_wins_over_crypto() {
        // "trump" and "bitcoin" both match; political has priority.
        let cat = detect_category("Will Trump launch a Bitcoin ETF?");
        assert_eq!(cat, Category::Political);
    }

    #[test]
    fn test_crypto_wins_over_sports() {
        let cat = detect_category("Will Solana win the L1 championship?");
        assert_eq!(cat, Category::Crypto);
    }

    // ---- expiry parsing ----

    #[test]
    fn test_days_to_expiry_rfc3339() {
        let now = fixed_now();
        let days = days_to_expiry(Some("2025-07-03T14:30:00Z"), now);
        assert!((days - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_days_to_expiry_with_offset() {
        let now = fixed_now();
        // 16:30 at +02:00 is 14:30 UTC.
        let days = days_to_expiry(Some("2025-06-25T16:30:00+02:00"), now);
        assert!((days - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_days_to_expiry_naive_datetime() {
        let now = fixed_now();
        let days = days_to_expiry(Some("2025-06-19T14:30:00"), now);
        assert!((days - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_days_to_expiry_date_only() {
        let now = fixed_now();
        // Midnight UTC on the 20th is 1.395833... days out.
        let days = days_to_expiry(Some("2025-06-20"), now);
        assert!(days > 1.0 && days < 2.0);
    }

    #[test]
    fn test_days_to_expiry_missing_or_garbage() {
        let now = fixed_now();
        assert_eq!(days_to_expiry(None, now), DEFAULT_DAYS_TO_EXPIRY);
        assert_eq!(days_to_expiry(Some(""), now), DEFAULT_DAYS_TO_EXPIRY);
        assert_eq!(days_to_expiry(Some("soon"), now), DEFAULT_DAYS_TO_EXPIRY);
        assert_eq!(days_to_expiry(Some("2025/06/20"), now), DEFAULT_DAYS_TO_EXPIRY);
    }

    #[test]
    fn test_days_to_expiry_past_clamps_to_zero() {
        let now = fixed_now();
        assert_eq!(days_to_expiry(Some("2024-01-01T00:00:00Z"), now), 0.0);
    }

    // ---- vector assembly ----

    #[test]
    fn test_build_wires_fields() {
        let opp = make_opportunity("Will Bitcoin reach $200k?", Some("2025-07-03T14:30:00Z"));
        let features = build(&opp, 0.04, 0.25, fixed_now());

        assert_eq!(features.yes_price, 0.01);
        assert!((features.price_pct - 0.25).abs() < 1e-9);
        assert!((features.potential_multiplier - 100.0).abs() < 1e-9);
        assert_eq!(features.liquidity, 5000.0);
        assert_eq!(features.volume_24h, 1200.0);
        assert!((features.days_to_expiry - 15.0).abs() < 1e-9);
        assert_eq!(features.hour_of_day, 14.0);
        assert_eq!(features.day_of_week, 2.0); // Wednesday
        assert_eq!(features.category_hit_rate, 0.25);
    }

    #[test]
    fn test_build_one_hot_is_exclusive() {
        let opp = make_opportunity("Will Bitcoin reach $200k?", None);
        let features = build(&opp, 0.04, 0.0, fixed_now());

        assert_eq!(features.is_crypto, 1.0);
        let others = features.is_political
            + features.is_sports
            + features.is_finance
            + features.is_tech;
        assert_eq!(others, 0.0);
        assert_eq!(features.category(), Category::Crypto);
    }

    #[test]
    fn test_build_zero_price_has_zero_multiplier() {
        let mut opp = make_opportunity("Anything", None);
        opp.yes_price = dec!(0);
        let features = build(&opp, 0.04, 0.0, fixed_now());
        assert_eq!(features.potential_multiplier, 0.0);
        assert_eq!(features.price_pct, 0.0);
    }
}
