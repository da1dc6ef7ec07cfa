//! Ground-truth clock values for the rendered time column.
//!
//! The page renders local times the way `Intl.DateTimeFormat('en-US',
//! { hour: 'numeric', minute: '2-digit', hour12: true })` does, e.g. `3:07 PM`.
//! Newer ICU builds put a narrow no-break space before the day period, so
//! every comparison goes through [`normalize`] first.

use crate::error::{ScenarioError, ScenarioResult};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

const CLOCK_FORMAT: &str = "%-I:%M %p";
const PARSE_FORMAT: &str = "%I:%M %p";

/// Parse an IANA timezone identifier.
pub fn zone(id: &str) -> ScenarioResult<Tz> {
    id.parse::<Tz>()
        .map_err(|e| ScenarioError::Clock(format!("unknown timezone '{}': {}", id, e)))
}

/// Format `now` as a 12-hour `H:MM AM/PM` wall clock in the given zone.
pub fn format_local_time(zone_id: &str, now: DateTime<Utc>) -> ScenarioResult<String> {
    let tz = zone(zone_id)?;
    Ok(now.with_timezone(&tz).format(CLOCK_FORMAT).to_string())
}

/// Current 12-hour wall clock in the given zone.
pub fn local_time_now(zone_id: &str) -> ScenarioResult<String> {
    format_local_time(zone_id, Utc::now())
}

/// Collapse Unicode spaces and surrounding whitespace so that browser output
/// compares equal to the formatted ground truth.
pub fn normalize(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| match c {
            '\u{202f}' | '\u{00a0}' | '\u{2009}' => ' ',
            other => other,
        })
        .collect()
}

/// Parse a rendered `H:MM AM/PM` value into a time of day.
pub fn parse_clock(text: &str) -> ScenarioResult<NaiveTime> {
    let normalized = normalize(text);
    NaiveTime::parse_from_str(&normalized, PARSE_FORMAT)
        .map_err(|e| ScenarioError::Clock(format!("cannot parse clock value '{}': {}", text, e)))
}

/// Sort rendered clock values by time of day, keeping the original strings.
pub fn sorted_chronologically(values: &[String]) -> ScenarioResult<Vec<String>> {
    let mut keyed = values
        .iter()
        .map(|v| parse_clock(v).map(|t| (t, v.clone())))
        .collect::<ScenarioResult<Vec<_>>>()?;
    keyed.sort_by_key(|(t, _)| *t);
    Ok(keyed.into_iter().map(|(_, v)| v).collect())
}
