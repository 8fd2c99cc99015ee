//! Response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of the `twitterstream` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Tweet {
    pub tweetid: String,
    pub time: DateTime<Utc>,
    pub lat: f64,
    #[sqlx(rename = "long")]
    pub lon: f64,
    pub text: String,
    pub userid: String,
    pub boundingbox: Option<String>,
}

/// One page of a tweet search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweets {
    /// Index of the first tweet in this page
    pub offset: i64,
    /// Matches across all pages
    pub total: i64,
    pub tweet: Vec<Tweet>,
}

/// Geographic extent, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub east: f64,
    pub west: f64,
    pub south: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub min_time: DateTime<Utc>,
    pub max_time: DateTime<Utc>,
}
