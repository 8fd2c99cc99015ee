//! HTTP server command
//!
//! Runs the geotweet server until Ctrl+C/SIGTERM, then shuts the session
//! pool down once in-flight requests have drained.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use geotweet_server::{
    ensure_schema, run_server, session_pool, AppState, ServerConfig, VersionInfo, DEFAULT_PORT,
};

use crate::config::GeotweetConfig;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_WEB_ROOT: &str = "resources/WebContent";

/// Arguments for the serve command
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to bind to [default: 0.0.0.0]
    #[arg(long, env = "GEOTWEET_HOST")]
    pub host: Option<String>,

    /// Port to listen on [default: 12345]
    #[arg(long, short = 'p', env = "GEOTWEET_PORT")]
    pub port: Option<u16>,

    /// Database URL (overrides config)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Directory holding index.html and the map front-end [default: resources/WebContent]
    #[arg(long, env = "GEOTWEET_WEB_ROOT")]
    pub web_root: Option<PathBuf>,

    /// Allow permissive CORS (all origins)
    #[arg(long)]
    pub cors_permissive: bool,

    /// Do not create the tweet table at startup
    #[arg(long)]
    pub skip_schema: bool,
}

/// Fully resolved serve settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServeSettings {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub web_root: PathBuf,
}

impl ServeSettings {
    /// Flags and environment (already merged by clap) win over the config
    /// file, which wins over the defaults.
    pub fn resolve(args: &ServeArgs, config: &GeotweetConfig) -> Result<Self> {
        let server = &config.server;

        let host = args
            .host
            .clone()
            .or_else(|| server.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let ip: IpAddr = host
            .parse()
            .with_context(|| format!("Invalid host address: {}", host))?;
        let port = args.port.or(server.port).unwrap_or(DEFAULT_PORT);

        let database_url = args
            .database_url
            .clone()
            .or_else(|| server.database_url.clone())
            .context(
                "DATABASE_URL not set. Set via --database-url, DATABASE_URL env, \
                 ~/.geotweet/.env or [server] database_url in the config file",
            )?;

        let web_root = args
            .web_root
            .clone()
            .or_else(|| server.web_root.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WEB_ROOT));

        Ok(Self {
            bind_addr: SocketAddr::new(ip, port),
            database_url,
            web_root,
        })
    }
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs, config: &GeotweetConfig) -> Result<()> {
    let settings = ServeSettings::resolve(&args, config)?;
    if !settings.web_root.is_dir() {
        tracing::warn!(
            web_root = %settings.web_root.display(),
            "web root is not a directory; static files will 404"
        );
    }

    let sessions = session_pool(settings.database_url);

    if !args.skip_schema {
        let mut session = sessions
            .session()
            .await
            .context("Failed to open a database session")?;
        ensure_schema(session.connection())
            .await
            .context("Failed to prepare the tweet table")?;
        session.release().await;
    }

    let state = AppState::new(
        sessions.clone(),
        settings.web_root,
        VersionInfo {
            application: "geotweet".to_string(),
            ..VersionInfo::default()
        },
    );
    let server_config = ServerConfig {
        bind_addr: settings.bind_addr,
        cors_permissive: args.cors_permissive,
    };

    tracing::info!("Starting geotweet server on {}", settings.bind_addr);

    // Run server (blocks until shutdown)
    let served = run_server(state, server_config).await.context("Server error");

    let destroyed = sessions
        .shutdown()
        .await
        .context("Failed to shut down the session pool")?;
    tracing::info!(destroyed, "session pool closed");

    served
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> GeotweetConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn defaults_fill_the_gaps() {
        let args = ServeArgs {
            database_url: Some("postgres://localhost/geotweet".into()),
            ..ServeArgs::default()
        };
        let settings = ServeSettings::resolve(&args, &GeotweetConfig::default()).unwrap();
        assert_eq!(settings.bind_addr, "0.0.0.0:12345".parse().unwrap());
        assert_eq!(settings.web_root, PathBuf::from("resources/WebContent"));
    }

    #[test]
    fn flags_beat_config_file() {
        let file = config(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            database_url = "postgres://file/geotweet"
            "#,
        );
        let args = ServeArgs {
            port: Some(9090),
            ..ServeArgs::default()
        };
        let settings = ServeSettings::resolve(&args, &file).unwrap();
        assert_eq!(settings.bind_addr, "127.0.0.1:9090".parse().unwrap());
        assert_eq!(settings.database_url, "postgres://file/geotweet");
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = ServeSettings::resolve(&ServeArgs::default(), &GeotweetConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL not set"));
    }

    #[test]
    fn bad_host_is_an_error() {
        let args = ServeArgs {
            host: Some("not an ip".into()),
            database_url: Some("postgres://localhost/geotweet".into()),
            ..ServeArgs::default()
        };
        assert!(ServeSettings::resolve(&args, &GeotweetConfig::default()).is_err());
    }
}
