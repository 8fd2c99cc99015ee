//! Configuration file and environment loading
//!
//! Settings resolve as: command-line flag, then environment variable (both
//! handled by clap), then `~/.geotweet/config.toml` (or `--config`), then the
//! built-in default.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 12345
//! web_root = "resources/WebContent"
//! database_url = "postgres://localhost/geotweet"
//!
//! [clients."http://client.commands.geotweet"]
//! timeout = 30
//! user_agent = "geotweet-cli"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geotweet_pool::client::{CONNECT_TIMEOUT, TIMEOUT, USER_AGENT};
use geotweet_pool::{ClientPool, TlsSettings};
use serde::{Deserialize, Serialize};

/// Contents of `config.toml`. Every section and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeotweetConfig {
    pub server: ServerSection,
    /// Per-key HTTP client settings, keyed by client pool key
    pub clients: BTreeMap<String, ClientSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub web_root: Option<PathBuf>,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// Whole-request timeout in seconds
    pub timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub user_agent: Option<String>,
    pub accept_invalid_certs: Option<bool>,
}

impl GeotweetConfig {
    /// `~/.geotweet`
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".geotweet")
    }

    /// `~/.geotweet/config.toml`
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Load `path`, which must exist, or the default file if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file (invalid TOML): {}", path.display()))?;
        tracing::debug!(path = %path.display(), clients = config.clients.len(), "loaded config");
        Ok(config)
    }

    /// Register every `[clients."<key>"]` section with `pool`.
    pub fn apply_clients(&self, pool: &ClientPool) {
        for (key, section) in &self.clients {
            if let Some(timeout) = section.timeout {
                pool.set_property(key, TIMEOUT, timeout.to_string());
            }
            if let Some(timeout) = section.connect_timeout {
                pool.set_property(key, CONNECT_TIMEOUT, timeout.to_string());
            }
            if let Some(agent) = &section.user_agent {
                pool.set_property(key, USER_AGENT, agent.clone());
            }
            if let Some(accept_invalid_certs) = section.accept_invalid_certs {
                pool.set_tls(
                    key,
                    TlsSettings {
                        accept_invalid_certs,
                        ..TlsSettings::default()
                    },
                );
            }
        }
    }
}

/// Load `.env` from the working directory, then `~/.geotweet/.env`.
/// Variables already set win over both.
pub fn load_env() {
    dotenvy::dotenv().ok();
    dotenvy::from_path(GeotweetConfig::home_dir().join(".env")).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [server]
        port = 8080
        web_root = "/srv/geotweet"

        [clients."http://client.commands.geotweet"]
        timeout = 30
        accept_invalid_certs = true
    "#;

    #[test]
    fn parses_sections() {
        let config: GeotweetConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.server.port, Some(8080));
        assert_eq!(config.server.host, None);
        assert_eq!(config.server.web_root, Some(PathBuf::from("/srv/geotweet")));

        let client = &config.clients["http://client.commands.geotweet"];
        assert_eq!(client.timeout, Some(30));
        assert_eq!(client.accept_invalid_certs, Some(true));
    }

    #[test]
    fn empty_file_is_default() {
        let config: GeotweetConfig = toml::from_str("").unwrap();
        assert_eq!(config, GeotweetConfig::default());
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = GeotweetConfig::load(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = GeotweetConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, Some(8080));
    }

    #[test]
    fn client_sections_reach_the_pool() {
        let config: GeotweetConfig = toml::from_str(SAMPLE).unwrap();
        let pool = ClientPool::clients("clients");
        config.apply_clients(&pool);

        let key = "http://client.commands.geotweet";
        assert_eq!(pool.property(key, TIMEOUT).as_deref(), Some("30"));
        assert!(pool
            .config(key)
            .tls()
            .map_or(false, |tls| tls.accept_invalid_certs));
        assert_eq!(pool.property("other", TIMEOUT), None);
    }
}
