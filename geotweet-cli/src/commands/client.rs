//! Shared plumbing for commands that query a running server
//!
//! Every query command borrows its HTTP client from one keyed pool under
//! [`client_key`], so `[clients."<key>"]` config sections and `--timeout`
//! apply to all of them.

use anyhow::{bail, Context, Result};
use clap::Args;
use geotweet_pool::client::{TIMEOUT, USER_AGENT};
use geotweet_pool::{namespace_key, ClientPool, DefaultHeader};
use serde::de::DeserializeOwned;

use crate::config::GeotweetConfig;

/// Where to find the server
#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Base URL of a running geotweet server
    #[arg(long, env = "GEOTWEET_SERVER", default_value = "http://localhost:12345")]
    pub server: String,

    /// Request timeout in seconds (overrides config)
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Pool key for the CLI's HTTP clients
pub fn client_key() -> String {
    namespace_key(module_path!())
}

/// A connection to one server through a freshly configured client pool.
pub struct ServerClient {
    pool: ClientPool,
    key: String,
    base: String,
}

impl ServerClient {
    /// Register defaults, then the config file, then command-line overrides.
    pub fn new(config: &GeotweetConfig, args: &ServerArgs) -> Result<Self> {
        let pool = ClientPool::clients("cli-clients");
        let key = client_key();

        pool.set_property(&key, USER_AGENT, concat!("geotweet/", env!("CARGO_PKG_VERSION")));
        pool.add_registrant(
            &key,
            DefaultHeader::new("x-geotweet-client", env!("CARGO_PKG_VERSION"))?,
        );
        config.apply_clients(&pool);
        if let Some(timeout) = args.timeout {
            pool.set_property(&key, TIMEOUT, timeout.to_string());
        }

        Ok(Self {
            pool,
            key,
            base: args.server.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    async fn send(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let url = self.url(path);
        let client = self
            .pool
            .borrow_client(&self.key)
            .await
            .context("Failed to get an HTTP client")?;

        tracing::debug!(%url, key = client.key(), "sending request");
        let response = client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url));
        client.release().await;

        let response = response?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", url, status, body.trim());
        }
        Ok(response)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.send(path, query)
            .await?
            .json()
            .await
            .with_context(|| format!("invalid JSON from {}", self.url(path)))
    }

    pub async fn get_text(&self, path: &str) -> Result<String> {
        self.send(path, &[])
            .await?
            .text()
            .await
            .with_context(|| format!("unreadable response from {}", self.url(path)))
    }

    /// Destroy the pooled clients.
    pub async fn close(self) {
        match self.pool.shutdown().await {
            Ok(destroyed) => tracing::debug!(destroyed, "client pool shut down"),
            Err(e) => tracing::warn!(error = %e, "client pool shutdown failed"),
        }
    }
}
