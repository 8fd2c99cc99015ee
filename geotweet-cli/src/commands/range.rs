//! Data extent queries against a running server

use anyhow::Result;
use clap::{Args, ValueEnum};
use geotweet_server::models::{BoundingBox, TimeRange};

use super::client::{ServerArgs, ServerClient};
use crate::config::GeotweetConfig;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    /// Earliest and latest tweet times
    Time,
    /// Geographic bounding box of all tweets
    Map,
}

/// Arguments for the range command
#[derive(Args, Debug)]
pub struct RangeArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Which range to fetch
    #[arg(value_enum, default_value = "time")]
    pub kind: RangeKind,
}

pub async fn run_range(args: RangeArgs, config: &GeotweetConfig) -> Result<()> {
    let client = ServerClient::new(config, &args.server)?;
    let output = match args.kind {
        RangeKind::Time => client
            .get_json::<TimeRange>("tweet/timerange", &[])
            .await
            .and_then(|range| Ok(serde_json::to_string_pretty(&range)?)),
        RangeKind::Map => client
            .get_json::<BoundingBox>("tweet/maprange", &[])
            .await
            .and_then(|range| Ok(serde_json::to_string_pretty(&range)?)),
    };
    client.close().await;

    println!("{}", output?);
    Ok(())
}
