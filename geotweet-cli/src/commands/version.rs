//! Report a running server's version

use anyhow::Result;
use clap::Args;

use super::client::{ServerArgs, ServerClient};
use crate::config::GeotweetConfig;

/// Arguments for the version command
#[derive(Args, Debug)]
pub struct VersionArgs {
    #[command(flatten)]
    pub server: ServerArgs,
}

pub async fn run_version(args: VersionArgs, config: &GeotweetConfig) -> Result<()> {
    let client = ServerClient::new(config, &args.server)?;
    let text = client.get_text("version").await;
    client.close().await;

    print!("{}", text?);
    Ok(())
}
