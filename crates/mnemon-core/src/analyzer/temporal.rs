//! Temporal Expression Detection
//!
//! Resolves the supported natural-language time expressions into inclusive
//! UTC ranges:
//!
//! - `last <season>` / `this <season>` ("last spring")
//! - `in <month>` / `during <month>` / `last <month>` ("in June")
//! - `between <month> and <month>`, optionally with a year
//! - `<month> <year>` ("June 2024")
//! - bare `<year>` ("2023")
//!
//! Seasons map to canonical 3-month ranges (spring = Mar 1 - May 31,
//! summer = Jun 1 - Aug 31, autumn = Sep 1 - Nov 30, winter = Dec 1 - Feb 28
//! of the following year). Relative expressions resolve against the
//! caller-supplied `now`, never the wall clock. Anything outside this grammar
//! yields `None` - the analyzer never guesses a range.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::memory::TemporalRange;

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december";
const SEASONS: &str = "spring|summer|autumn|fall|winter";

static RE_BETWEEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\bbetween\s+({MONTHS})\s+and\s+({MONTHS})(?:\s+(\d{{4}}))?\b"
    ))
    .expect("between regex")
});

static RE_MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\b({MONTHS})\s+(\d{{4}})\b")).expect("month-year regex"));

static RE_SEASON: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\b(last|this)\s+({SEASONS})\b")).expect("season regex"));

static RE_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\b(in|during|last)\s+({MONTHS})\b")).expect("month regex"));

static RE_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("year regex"));

// ============================================================================
// DETECTION
// ============================================================================

/// Detect a temporal range in `text`, resolving relative expressions
/// against `now`. Returns `None` when no supported expression is present.
pub fn detect_temporal_range(text: &str, now: DateTime<Utc>) -> Option<TemporalRange> {
    let lower = text.to_lowercase();

    if let Some(caps) = RE_BETWEEN.captures(&lower) {
        let start_month = month_number(caps.get(1)?.as_str())?;
        let end_month = month_number(caps.get(2)?.as_str())?;
        let explicit_year = caps.get(3).and_then(|m| m.as_str().parse::<i32>().ok());
        return between_months(start_month, end_month, explicit_year, now);
    }

    if let Some(caps) = RE_MONTH_YEAR.captures(&lower) {
        let month = month_number(caps.get(1)?.as_str())?;
        let year = caps.get(2)?.as_str().parse::<i32>().ok()?;
        return month_range(year, month);
    }

    if let Some(caps) = RE_SEASON.captures(&lower) {
        let qualifier = caps.get(1)?.as_str();
        let season = caps.get(2)?.as_str();
        return resolve_season(qualifier, season, now);
    }

    if let Some(caps) = RE_MONTH.captures(&lower) {
        let qualifier = caps.get(1)?.as_str();
        let month = month_number(caps.get(2)?.as_str())?;
        return resolve_month(qualifier, month, now);
    }

    if let Some(caps) = RE_YEAR.captures(&lower) {
        let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
        return year_range(year);
    }

    None
}

// ============================================================================
// RESOLUTION
// ============================================================================

fn month_number(name: &str) -> Option<u32> {
    let number = match name {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        "december" => 12,
        _ => return None,
    };
    Some(number)
}

fn date(year: i32, month: u32, day: u32, h: u32, m: u32, s: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, h, m, s).single()
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Some(
        NaiveDate::from_ymd_opt(next_year, next_month, 1)?
            .pred_opt()?
            .day(),
    )
}

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    date(year, month, 1, 0, 0, 0)
}

fn month_end(year: i32, month: u32) -> Option<DateTime<Utc>> {
    date(year, month, days_in_month(year, month)?, 23, 59, 59)
}

fn month_range(year: i32, month: u32) -> Option<TemporalRange> {
    Some(TemporalRange::new(
        month_start(year, month)?,
        month_end(year, month)?,
    ))
}

fn year_range(year: i32) -> Option<TemporalRange> {
    Some(TemporalRange::new(
        date(year, 1, 1, 0, 0, 0)?,
        date(year, 12, 31, 23, 59, 59)?,
    ))
}

/// Canonical season range anchored at `year` (the year the season starts in).
/// Winter spans the year boundary and ends on the canonical Feb 28.
fn season_range(year: i32, season: &str) -> Option<TemporalRange> {
    let (start, end) = match season {
        "spring" => (date(year, 3, 1, 0, 0, 0)?, date(year, 5, 31, 23, 59, 59)?),
        "summer" => (date(year, 6, 1, 0, 0, 0)?, date(year, 8, 31, 23, 59, 59)?),
        "autumn" | "fall" => (date(year, 9, 1, 0, 0, 0)?, date(year, 11, 30, 23, 59, 59)?),
        "winter" => (
            date(year, 12, 1, 0, 0, 0)?,
            date(year + 1, 2, 28, 23, 59, 59)?,
        ),
        _ => return None,
    };
    Some(TemporalRange::new(start, end))
}

fn resolve_season(qualifier: &str, season: &str, now: DateTime<Utc>) -> Option<TemporalRange> {
    // Walk anchor years backwards until the constraint holds; two steps
    // suffice because a season recurs every year.
    for offset in 0..=2 {
        let range = season_range(now.year() - offset, season)?;
        let admissible = match qualifier {
            // Most recent fully completed occurrence
            "last" => range.end < now,
            // Most recent occurrence that has started
            "this" => range.start <= now,
            _ => return None,
        };
        if admissible {
            return Some(range);
        }
    }
    None
}

fn resolve_month(qualifier: &str, month: u32, now: DateTime<Utc>) -> Option<TemporalRange> {
    let year = match qualifier {
        // Most recent occurrence that has started (the current month counts)
        "in" | "during" => {
            if month <= now.month() {
                now.year()
            } else {
                now.year() - 1
            }
        }
        // Most recent fully completed occurrence
        "last" => {
            if month < now.month() {
                now.year()
            } else {
                now.year() - 1
            }
        }
        _ => return None,
    };
    month_range(year, month)
}

fn between_months(
    start_month: u32,
    end_month: u32,
    explicit_year: Option<i32>,
    now: DateTime<Utc>,
) -> Option<TemporalRange> {
    let start_year = match explicit_year {
        Some(year) => year,
        // Most recent occurrence of the range that has started
        None => {
            if start_month <= now.month() {
                now.year()
            } else {
                now.year() - 1
            }
        }
    };
    // An end month before the start month wraps into the next year
    let end_year = if end_month >= start_month {
        start_year
    } else {
        start_year + 1
    };

    Some(TemporalRange::new(
        month_start(start_year, start_month)?,
        month_end(end_year, end_month)?,
    ))
}

// ============================================================================
// TESTS
// ============================================================================
