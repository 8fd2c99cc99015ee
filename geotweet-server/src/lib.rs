//! geotweet-server: HTTP surface for the geotweet map
//!
//! Serves tweet searches and data ranges out of PostgreSQL through a pool of
//! database sessions, a plain-text version report, and the static map
//! front-end.

pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use db::{ensure_schema, session_pool, TweetRepo};
pub use error::ApiError;
pub use server::{build_router, run_server, ServerConfig, ServerError, DEFAULT_PORT};
pub use state::{AppState, VersionInfo};
