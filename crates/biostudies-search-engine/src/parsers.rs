//! Parser catalog
//!
//! Registry-driven extractors that turn a submission JSON tree into one
//! typed field value. Date values arrive in several historical shapes:
//! wrapped `{"$date": ISO8601}`, wrapped `{"$date": {"$numberLong": N}}`,
//! bare ISO-8601 strings, bare numerics, and numerics-as-strings. Missing
//! or empty values parse to `-1`; malformed wrapped forms are an error
//! (they indicate corrupted source data rather than an absent field).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Sentinel for a missing or empty time value.
pub const MISSING_TIME: i64 = -1;

/// Stored stand-in for an unparseable or absent date string field.
pub const NOT_AVAILABLE: &str = "N/A";

/// Error for malformed wrapped date values.
#[derive(Debug, Error)]
#[error("malformed date value: {0}")]
pub struct DateParseError(String);

/// The fixed parser set a registry property may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    ReleaseTime,
    ReleaseDate,
    ModificationTime,
}

impl ParserKind {
    /// Parse a registry parser name, accepting short and legacy class-name
    /// forms case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "release_time" | "releasetime" | "releasetimeparser" => Some(Self::ReleaseTime),
            "release_date" | "releasedate" | "releasedateparser" => Some(Self::ReleaseDate),
            "modification_time" | "modificationtime" | "modificationtimeparser" => {
                Some(Self::ModificationTime)
            }
            _ => None,
        }
    }

    /// Apply the parser to a submission, producing the stored field value.
    ///
    /// # Errors
    ///
    /// Propagates [`DateParseError`] for malformed wrapped date forms; the
    /// caller logs and skips the offending field.
    pub fn apply(self, submission: &Value) -> Result<Option<String>, DateParseError> {
        match self {
            Self::ReleaseTime => Ok(Some(release_time(submission)?.to_string())),
            Self::ReleaseDate => Ok(Some(release_date(submission)?)),
            Self::ModificationTime => Ok(Some(modification_time(submission)?.to_string())),
        }
    }
}

/// Epoch milliseconds of the release time, falling back to the modification
/// time only when the submission is flagged as released.
pub fn release_time(submission: &Value) -> Result<i64, DateParseError> {
    let release = parse_epoch_ms(submission.get("releaseTime"))?;
    if release != MISSING_TIME {
        return Ok(release);
    }
    if submission.get("released").and_then(Value::as_bool) == Some(true) {
        return modification_time(submission);
    }
    Ok(MISSING_TIME)
}

/// Release time rounded to day resolution and formatted `YYYY-MM-DD`,
/// or `N/A` when absent.
pub fn release_date(submission: &Value) -> Result<String, DateParseError> {
    let millis = release_time(submission)?;
    Ok(format_day(millis))
}

/// Epoch milliseconds of the modification time, `-1` when absent.
pub fn modification_time(submission: &Value) -> Result<i64, DateParseError> {
    parse_epoch_ms(submission.get("modificationTime"))
}

/// Format epoch milliseconds as a `YYYY-MM-DD` day, `N/A` for the missing
/// sentinel.
#[must_use]
pub fn format_day(millis: i64) -> String {
    if millis < 0 {
        return NOT_AVAILABLE.to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(millis).map_or_else(
        || NOT_AVAILABLE.to_string(),
        |dt| dt.format("%Y-%m-%d").to_string(),
    )
}

/// Parse any of the accepted date shapes into epoch milliseconds.
///
/// # Errors
///
/// Only wrapped forms (`{"$date": ...}`) can fail; bare strings that do not
/// look like dates quietly parse to `-1`.
pub fn parse_epoch_ms(value: Option<&Value>) -> Result<i64, DateParseError> {
    let Some(value) = value else {
        return Ok(MISSING_TIME);
    };
    match value {
        Value::Null => Ok(MISSING_TIME),
        Value::Number(n) => n.as_i64().ok_or_else(|| DateParseError(n.to_string())),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(MISSING_TIME);
            }
            Ok(parse_iso(s)
                .or_else(|| s.parse::<i64>().ok())
                .unwrap_or(MISSING_TIME))
        }
        Value::Object(map) => {
            let Some(wrapped) = map.get("$date") else {
                return Err(DateParseError(value.to_string()));
            };
            parse_wrapped(wrapped)
        }
        Value::Array(_) | Value::Bool(_) => Err(DateParseError(value.to_string())),
    }
}

fn parse_wrapped(wrapped: &Value) -> Result<i64, DateParseError> {
    match wrapped {
        Value::String(s) => parse_iso(s).ok_or_else(|| DateParseError(s.clone())),
        Value::Number(n) => n.as_i64().ok_or_else(|| DateParseError(n.to_string())),
        Value::Object(map) => {
            let Some(number_long) = map.get("$numberLong") else {
                return Err(DateParseError(wrapped.to_string()));
            };
            match number_long {
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| DateParseError(s.clone())),
                Value::Number(n) => n.as_i64().ok_or_else(|| DateParseError(n.to_string())),
                other => Err(DateParseError(other.to_string())),
            }
        }
        other => Err(DateParseError(other.to_string())),
    }
}

fn parse_iso(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc().timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(
            date.and_hms_opt(0, 0, 0)
                .unwrap_or_default()
                .and_utc()
                .timestamp_millis(),
        );
    }
    None
}
