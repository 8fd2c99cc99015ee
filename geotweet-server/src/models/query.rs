//! Tweet search parameters

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Maximum tweets returned per request
pub const PAGE_SIZE: i64 = 1000;

const NORTH: f64 = 90.0;
const SOUTH: f64 = -90.0;
const EAST: f64 = 180.0;
const WEST: f64 = -180.0;

/// Raw `GET /tweet` query string. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TweetParams {
    pub north: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub west: Option<f64>,
    pub mindate: Option<String>,
    pub maxdate: Option<String>,
    pub offset: Option<i64>,
}

/// A fully specified search: bounds are ordered and every field is set.
///
/// Matching is strict on every side: a tweet exactly on a boundary is
/// excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct TweetQuery {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub min_time: DateTime<Utc>,
    pub max_time: DateTime<Utc>,
    pub offset: i64,
}

impl TweetParams {
    /// Fill defaults and order each pair so `south <= north`,
    /// `west <= east` and `min_time <= max_time`.
    ///
    /// Missing bounds cover the whole globe; a missing `mindate` is the Unix
    /// epoch and a missing `maxdate` is `now`.
    pub fn normalize(self, now: DateTime<Utc>) -> Result<TweetQuery, ValidationError> {
        let north = finite("north", self.north.unwrap_or(NORTH))?;
        let south = finite("south", self.south.unwrap_or(SOUTH))?;
        let east = finite("east", self.east.unwrap_or(EAST))?;
        let west = finite("west", self.west.unwrap_or(WEST))?;

        let min_time = match self.mindate.as_deref() {
            Some(value) => parse_date("mindate", value)?,
            None => DateTime::<Utc>::UNIX_EPOCH,
        };
        let max_time = match self.maxdate.as_deref() {
            Some(value) => parse_date("maxdate", value)?,
            None => now,
        };

        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ValidationError::NegativeOffset { value: offset });
        }

        let (south, north) = ordered(south, north);
        let (west, east) = ordered(west, east);
        let (min_time, max_time) = if min_time > max_time {
            (max_time, min_time)
        } else {
            (min_time, max_time)
        };

        Ok(TweetQuery {
            north,
            south,
            east,
            west,
            min_time,
            max_time,
            offset,
        })
    }
}

fn finite(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::NotFinite { field })
    }
}

fn ordered(low: f64, high: f64) -> (f64, f64) {
    if low > high {
        (high, low)
    } else {
        (low, high)
    }
}

/// Accepts RFC 3339 timestamps, plain `YYYY-MM-DD` dates (midnight UTC) and
/// epoch milliseconds, which is what the map page's time slider sends.
pub fn parse_date(field: &'static str, value: &str) -> Result<DateTime<Utc>, ValidationError> {
    let value = value.trim();
    let invalid = || ValidationError::InvalidDate {
        field,
        value: value.to_owned(),
    };

    if let Ok(millis) = value.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single().ok_or_else(invalid);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(invalid)
}
