//! PostgreSQL sessions over a single `sqlx::PgConnection`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use tracing::{debug, info};

use crate::error::SessionError;
use crate::session::{Session, SessionSource};

/// Opens [`PgSession`]s from a parsed connection URL.
pub struct PgSessionSource {
    options: PgConnectOptions,
    closed: AtomicBool,
}

impl PgSessionSource {
    /// Parse a `postgres://` URL. No connection is made until a session is
    /// opened.
    pub fn from_url(url: &str) -> Result<Self, SessionError> {
        let options = PgConnectOptions::from_str(url).map_err(SessionError::connect)?;
        info!(
            host = %options.get_host(),
            database = options.get_database().unwrap_or("<default>"),
            "configured PostgreSQL session source"
        );
        Ok(Self::with_options(options))
    }

    pub fn with_options(options: PgConnectOptions) -> Self {
        Self {
            options,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SessionSource for PgSessionSource {
    type Session = PgSession;

    async fn open(&self) -> Result<PgSession, SessionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::Closed);
        }
        let conn = self
            .options
            .connect()
            .await
            .map_err(SessionError::connect)?;
        debug!(host = %self.options.get_host(), "opened PostgreSQL session");
        Ok(PgSession::new(conn))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!("PostgreSQL session source closed");
    }
}

type EntityKey = (TypeId, String);

/// A PostgreSQL connection with transaction tracking and an identity map of
/// entities loaded through it.
pub struct PgSession {
    conn: PgConnection,
    in_transaction: bool,
    tracked: HashMap<EntityKey, Box<dyn Any + Send + Sync>>,
}

impl PgSession {
    fn new(conn: PgConnection) -> Self {
        Self {
            conn,
            in_transaction: false,
            tracked: HashMap::new(),
        }
    }

    /// The raw connection, for running queries.
    ///
    /// Open and end transactions with [`begin`](Self::begin) and
    /// [`commit`](Self::commit). A `BEGIN` sent here directly is not tracked,
    /// so releasing the session will not roll it back.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Start a transaction. Beginning while one is active is a no-op.
    pub async fn begin(&mut self) -> Result<(), SessionError> {
        if self.in_transaction {
            return Ok(());
        }
        (&mut self.conn).execute("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), SessionError> {
        if !self.in_transaction {
            return Err(SessionError::NoTransaction);
        }
        // the transaction is over either way
        self.in_transaction = false;
        (&mut self.conn).execute("COMMIT").await?;
        Ok(())
    }

    /// Remember `entity` under `id` until the session is cleared.
    pub fn track<T: Any + Send + Sync>(&mut self, id: impl Into<String>, entity: T) {
        self.tracked
            .insert((TypeId::of::<T>(), id.into()), Box::new(entity));
    }

    pub fn tracked<T: Any + Send + Sync>(&self, id: &str) -> Option<&T> {
        self.tracked
            .get(&(TypeId::of::<T>(), id.to_owned()))
            .and_then(|entity| entity.downcast_ref::<T>())
    }
}

#[async_trait]
impl Session for PgSession {
    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        if !self.in_transaction {
            return Err(SessionError::NoTransaction);
        }
        self.in_transaction = false;
        (&mut self.conn).execute("ROLLBACK").await?;
        Ok(())
    }

    fn clear(&mut self) {
        self.tracked.clear();
    }

    fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    async fn close(self) -> Result<(), SessionError> {
        self.conn.close().await?;
        Ok(())
    }
}
