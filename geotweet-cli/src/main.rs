//! geotweet CLI - tweet map server and client
//!
//! This is the main entry point for the geotweet command-line tool, which provides:
//! - The HTTP server (`serve`): tweet search, data ranges, version, static map page
//! - Query commands against a running server (`tweets`, `range`, `version`)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod tracing_setup;

use config::GeotweetConfig;
use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "geotweet",
    author,
    version,
    about = "Serve and query geolocated tweets",
    long_about = "Run the geotweet HTTP server over a PostgreSQL tweet table, or query a \
                  running server for tweets inside a bounding box and time window."
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file [default: ~/.geotweet/config.toml]
    #[arg(long, global = true, env = "GEOTWEET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (tweet queries, version, static files)
    Serve(commands::serve::ServeArgs),
    /// Search tweets by bounding box and time window
    Tweets(commands::tweets::TweetsArgs),
    /// Show the time or map extent of the stored tweets
    Range(commands::range::RangeArgs),
    /// Show a running server's version
    Version(commands::version::VersionArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env();
    let cli = Cli::parse();
    tracing_setup::init(&TracingConfig { debug: cli.debug }).ok();

    let config = GeotweetConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args, &config).await?,
        Commands::Tweets(args) => commands::run_tweets(args, &config).await?,
        Commands::Range(args) => commands::run_range(args, &config).await?,
        Commands::Version(args) => commands::run_version(args, &config).await?,
    }
    Ok(())
}
