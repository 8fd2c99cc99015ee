//! Structured error types for geotweet-pool.
//!
//! Factory and builder failures are boxed so a single `PoolError` covers every
//! resource kind. `SessionError` and `ClientError` belong to the two factory
//! adapters. Binary crates wrap these in `anyhow`.

use thiserror::Error;

/// Error produced by a factory, its builder, or a handle operation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for pool operations
#[derive(Error, Debug)]
pub enum PoolError {
    /// The factory builder failed; the pool stays uninitialized and the next
    /// borrow tries again
    #[error("failed to initialize pool '{pool}': {source}")]
    FactoryInit { pool: String, source: BoxError },

    /// The factory could not construct a handle; pool state is unaffected
    #[error("failed to construct a handle for pool '{pool}': {source}")]
    Construction { pool: String, source: BoxError },

    /// The pool has been shut down
    #[error("pool '{pool}' has been shut down")]
    Closed { pool: String },

    /// Shutdown was requested while another task was building the factory
    #[error("pool '{pool}' is still initializing")]
    Initializing { pool: String },
}

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Create a factory initialization error
    pub fn factory_init(pool: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::FactoryInit {
            pool: pool.into(),
            source: source.into(),
        }
    }

    /// Create a handle construction error
    pub fn construction(pool: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Construction {
            pool: pool.into(),
            source: source.into(),
        }
    }

    /// Create a closed-pool error
    pub fn closed(pool: impl Into<String>) -> Self {
        Self::Closed { pool: pool.into() }
    }

    /// Create an initializing-pool error
    pub fn initializing(pool: impl Into<String>) -> Self {
        Self::Initializing { pool: pool.into() }
    }

    /// True when the underlying resource could not be built, as opposed to a
    /// lifecycle misuse of the pool itself.
    pub fn is_factory_failure(&self) -> bool {
        matches!(self, Self::FactoryInit { .. } | Self::Construction { .. })
    }
}

/// Errors raised by database sessions and their source
#[derive(Error, Debug)]
pub enum SessionError {
    /// Opening a connection failed
    #[error("failed to open database session: {source}")]
    Connect {
        #[source]
        source: sqlx::Error,
    },

    /// A statement on an open session failed
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// `commit` or `rollback` without an active transaction
    #[error("no transaction is active on this session")]
    NoTransaction,

    /// The session source has been closed
    #[error("session source is closed")]
    Closed,
}

impl SessionError {
    pub fn connect(source: sqlx::Error) -> Self {
        Self::Connect { source }
    }
}

/// Errors raised while building HTTP clients
#[derive(Error, Debug)]
pub enum ClientError {
    /// reqwest rejected the client configuration
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),

    /// An interpreted property holds a value that cannot be used
    #[error("invalid value '{value}' for property '{name}' of client '{key}'")]
    InvalidProperty {
        key: String,
        name: String,
        value: String,
    },

    /// A default header name or value is not valid HTTP
    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },
}

impl ClientError {
    pub fn invalid_property(
        key: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidProperty {
            key: key.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}
