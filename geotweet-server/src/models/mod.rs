//! Query parameters and response bodies for the tweet endpoints
//!
//! Raw query strings are normalized into a [`TweetQuery`] before any SQL is
//! built. Invalid input returns ValidationError, not panic.

pub mod query;
pub mod tweet;
pub mod validation;

pub use query::{TweetParams, TweetQuery, PAGE_SIZE};
pub use tweet::{BoundingBox, TimeRange, Tweet, Tweets};
pub use validation::ValidationError;
