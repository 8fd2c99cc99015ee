//! Application state shared across handlers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use geotweet_pool::{PgSessionSource, SessionPool};

/// Build identity reported by `GET /version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub application: String,
    pub version: String,
    pub build: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            application: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            build: option_env!("GEOTWEET_BUILD").unwrap_or_default().to_string(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    sessions: SessionPool<PgSessionSource>,
    web_root: PathBuf,
    version: VersionInfo,
}

impl AppState {
    pub fn new(
        sessions: SessionPool<PgSessionSource>,
        web_root: impl Into<PathBuf>,
        version: VersionInfo,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                sessions,
                web_root: web_root.into(),
                version,
            }),
        }
    }

    pub fn sessions(&self) -> &SessionPool<PgSessionSource> {
        &self.inner.sessions
    }

    pub fn web_root(&self) -> &Path {
        &self.inner.web_root
    }

    pub fn version(&self) -> &VersionInfo {
        &self.inner.version
    }
}
