//! Command implementations for the geotweet CLI

pub mod client;
pub mod range;
pub mod serve;
pub mod tweets;
pub mod version;

pub use range::run_range;
pub use serve::run_serve;
pub use tweets::run_tweets;
pub use version::run_version;
