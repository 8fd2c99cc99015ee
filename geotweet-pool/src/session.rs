//! Database session pooling.
//!
//! A [`SessionSource`] opens sessions; [`SessionFactory`] adapts it to the
//! pool. Before a returned session becomes idle, any transaction still open
//! is rolled back (with a warning) and its tracked entities are cleared, so
//! the next borrower sees a session indistinguishable from a fresh one.

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use tracing::{error, warn};

use crate::error::{Result, SessionError};
use crate::factory::ResourceFactory;
use crate::pool::{Pool, Pooled};

/// A unit-of-work handle against a database.
#[async_trait]
pub trait Session: Send + 'static {
    /// True while a transaction begun on this session is still open.
    fn in_transaction(&self) -> bool;

    /// Roll back the active transaction.
    async fn rollback(&mut self) -> std::result::Result<(), SessionError>;

    /// Forget every tracked entity.
    fn clear(&mut self);

    /// Number of tracked entities.
    fn tracked_len(&self) -> usize;

    /// Close the underlying connection for good.
    async fn close(self) -> std::result::Result<(), SessionError>
    where
        Self: Sized;
}

/// Produces sessions for one database.
#[async_trait]
pub trait SessionSource: Send + Sync + 'static {
    type Session: Session;

    async fn open(&self) -> std::result::Result<Self::Session, SessionError>;

    /// Release the source's own resources. Sessions opened after this fail.
    async fn close(&self);
}

/// [`ResourceFactory`] over a [`SessionSource`].
pub struct SessionFactory<Src> {
    source: Src,
}

impl<Src: SessionSource> SessionFactory<Src> {
    pub fn new(source: Src) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Src {
        &self.source
    }
}

#[async_trait]
impl<Src: SessionSource> ResourceFactory for SessionFactory<Src> {
    type Handle = Src::Session;
    type Error = SessionError;

    async fn create(&self) -> std::result::Result<Src::Session, SessionError> {
        self.source.open().await
    }

    async fn recycle(&self, session: &mut Src::Session) -> std::result::Result<(), SessionError> {
        if session.in_transaction() {
            warn!(
                tracked = session.tracked_len(),
                "session released with an active transaction; rolling back"
            );
            if let Err(e) = session.rollback().await {
                error!(error = %e, "rollback of released session failed");
                return Err(e);
            }
        }
        session.clear();
        Ok(())
    }

    async fn destroy(&self, session: Src::Session) {
        if let Err(e) = session.close().await {
            error!(error = %e, "failed to close session");
        }
    }

    async fn close(&self) {
        self.source.close().await;
    }
}

/// Pool of database sessions.
pub type SessionPool<Src> = Pool<SessionFactory<Src>>;

impl<Src: SessionSource> Pool<SessionFactory<Src>> {
    /// An active session pool around `source`.
    pub fn for_source(name: impl Into<String>, source: Src) -> Self {
        Pool::new(name, SessionFactory::new(source))
    }

    /// Borrow a session wrapped in a [`PooledSession`].
    pub async fn session(&self) -> Result<PooledSession<Src>> {
        self.borrow().await.map(PooledSession)
    }
}

/// A borrowed database session.
///
/// Derefs to the session for queries and transaction control. The session's
/// hard close takes it by value, so it cannot be reached through the guard.
pub struct PooledSession<Src: SessionSource>(Pooled<SessionFactory<Src>>);

impl<Src: SessionSource> PooledSession<Src> {
    /// Give the session back to its pool.
    pub async fn release(self) {
        self.0.release().await;
    }
}

impl<Src: SessionSource> Deref for PooledSession<Src> {
    type Target = Src::Session;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<Src: SessionSource> DerefMut for PooledSession<Src> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counts {
        opened: AtomicUsize,
        closed_sessions: AtomicUsize,
        source_closed: AtomicBool,
        fail_rollback: AtomicBool,
    }

    struct MockSession {
        id: usize,
        in_tx: bool,
        tracked: Vec<String>,
        counts: Arc<Counts>,
    }

    impl MockSession {
        fn begin(&mut self) {
            self.in_tx = true;
        }
    }

    #[async_trait]
    impl Session for MockSession {
        fn in_transaction(&self) -> bool {
            self.in_tx
        }

        async fn rollback(&mut self) -> std::result::Result<(), SessionError> {
            if self.counts.fail_rollback.load(Ordering::SeqCst) {
                return Err(SessionError::Closed);
            }
            self.in_tx = false;
            Ok(())
        }

        fn clear(&mut self) {
            self.tracked.clear();
        }

        fn tracked_len(&self) -> usize {
            self.tracked.len()
        }

        async fn close(self) -> std::result::Result<(), SessionError> {
            self.counts.closed_sessions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockSource(Arc<Counts>);

    #[async_trait]
    impl SessionSource for MockSource {
        type Session = MockSession;

        async fn open(&self) -> std::result::Result<MockSession, SessionError> {
            if self.0.source_closed.load(Ordering::SeqCst) {
                return Err(SessionError::Closed);
            }
            Ok(MockSession {
                id: self.0.opened.fetch_add(1, Ordering::SeqCst),
                in_tx: false,
                tracked: Vec::new(),
                counts: Arc::clone(&self.0),
            })
        }

        async fn close(&self) {
            self.0.source_closed.store(true, Ordering::SeqCst);
        }
    }

    fn sessions() -> (SessionPool<MockSource>, Arc<Counts>) {
        let counts = Arc::new(Counts::default());
        let pool = SessionPool::for_source("sessions", MockSource(Arc::clone(&counts)));
        (pool, counts)
    }

    #[tokio::test]
    async fn released_session_is_cleared() {
        let (pool, _) = sessions();

        let mut session = pool.session().await.unwrap();
        session.tracked.push("tweet:1".into());
        let id = session.id;
        session.release().await;

        let session = pool.session().await.unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.tracked_len(), 0);
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn active_transaction_is_rolled_back_on_release() {
        let (pool, counts) = sessions();

        let mut session = pool.session().await.unwrap();
        session.begin();
        session.tracked.push("tweet:2".into());
        session.release().await;

        let session = pool.session().await.unwrap();
        assert!(!session.in_transaction());
        assert_eq!(session.tracked_len(), 0);
        assert_eq!(counts.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_rollback_closes_session() {
        let (pool, counts) = sessions();

        let mut session = pool.session().await.unwrap();
        session.begin();
        counts.fail_rollback.store(true, Ordering::SeqCst);
        session.release().await;

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(counts.closed_sessions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_sessions_and_source() {
        let (pool, counts) = sessions();

        let a = pool.session().await.unwrap();
        let b = pool.session().await.unwrap();
        a.release().await;
        b.release().await;

        assert_eq!(pool.shutdown().await.unwrap(), 2);
        assert_eq!(counts.closed_sessions.load(Ordering::SeqCst), 2);
        assert!(counts.source_closed.load(Ordering::SeqCst));
    }
}
