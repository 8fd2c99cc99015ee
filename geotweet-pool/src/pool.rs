//! Unkeyed pool: one idle stack of handles built by one lazily created
//! factory.
//!
//! Handles are reused LIFO (the most recently returned handle is handed out
//! first). The pool never bounds its size and never validates handles on
//! borrow. A handle is always in exactly one place: idle on the stack, owned
//! by one [`Pooled`] guard, or destroyed.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::{BoxError, PoolError, Result};
use crate::factory::ResourceFactory;
use crate::lazy::LazyFactory;

/// Async constructor for a pool's factory.
pub(crate) type Builder<F> =
    Box<dyn Fn() -> BoxFuture<'static, std::result::Result<F, BoxError>> + Send + Sync>;

pub(crate) fn boxed_builder<F, B, Fut, E>(builder: B) -> Builder<F>
where
    B: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<F, E>> + Send + 'static,
    E: Into<BoxError>,
{
    Box::new(move || {
        let fut = builder();
        Box::pin(async move { fut.await.map_err(Into::into) })
    })
}

/// A pool of reusable handles of one resource kind.
///
/// Cloning is cheap; every clone refers to the same pool.
pub struct Pool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct PoolInner<F: ResourceFactory> {
    name: String,
    build: Option<Builder<F>>,
    factory: LazyFactory<F>,
    idle: Mutex<Vec<F::Handle>>,
    closed: AtomicBool,
}

impl<F: ResourceFactory> Pool<F> {
    /// Create an uninitialized pool. `builder` runs on the first borrow, once,
    /// even when many tasks borrow concurrently.
    pub fn lazy<B, Fut, E>(name: impl Into<String>, builder: B) -> Self
    where
        B: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<F, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_parts(name.into(), Some(boxed_builder(builder)), LazyFactory::new())
    }

    /// Create a pool around a factory that is already built.
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        Self::from_parts(name.into(), None, LazyFactory::with_value(factory))
    }

    fn from_parts(name: String, build: Option<Builder<F>>, factory: LazyFactory<F>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name,
                build,
                factory,
                idle: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True once the factory has been built.
    pub fn is_initialized(&self) -> bool {
        self.inner.factory.get().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of handles currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Borrow a handle, building the factory on first use.
    ///
    /// Reuses the most recently returned idle handle, otherwise asks the
    /// factory for a new one.
    ///
    /// # Errors
    ///
    /// - [`PoolError::FactoryInit`] if the factory builder fails
    /// - [`PoolError::Construction`] if the factory cannot build a handle
    /// - [`PoolError::Closed`] after [`shutdown`](Self::shutdown)
    pub async fn borrow(&self) -> Result<Pooled<F>> {
        let inner = &self.inner;
        let factory = inner.factory().await?;

        let reused = inner.idle.lock().pop();
        let handle = match reused {
            Some(handle) => {
                trace!(pool = %inner.name, "reusing idle handle");
                handle
            }
            None => {
                let handle = factory
                    .create()
                    .await
                    .map_err(|e| PoolError::construction(&inner.name, e))?;
                debug!(pool = %inner.name, "constructed new handle");
                handle
            }
        };

        Ok(Pooled {
            handle: Some(handle),
            pool: Arc::clone(inner),
        })
    }

    /// Shut the pool down: destroy every idle handle, then close the factory.
    ///
    /// Returns the number of destroyed handles. Later borrows fail with
    /// [`PoolError::Closed`]; handles still checked out are destroyed when
    /// their guards are released. Must not race with borrow/return traffic.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Initializing`] if another task is building the factory
    /// - [`PoolError::Closed`] if the pool was already shut down
    pub async fn shutdown(&self) -> Result<usize> {
        let inner = &self.inner;
        let _init = inner
            .factory
            .try_hold()
            .ok_or_else(|| PoolError::initializing(&inner.name))?;

        if inner.closed.swap(true, Ordering::AcqRel) {
            return Err(PoolError::closed(&inner.name));
        }

        let Some(factory) = inner.factory.get() else {
            debug!(pool = %inner.name, "pool closed before first use");
            return Ok(0);
        };

        let idle = std::mem::take(&mut *inner.idle.lock());
        let destroyed = idle.len();
        for handle in idle {
            factory.destroy(handle).await;
        }
        factory.close().await;

        info!(pool = %inner.name, destroyed, "pool shut down");
        Ok(destroyed)
    }
}

impl<F: ResourceFactory> PoolInner<F> {
    async fn factory(&self) -> Result<&F> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::closed(&self.name));
        }

        self.factory
            .get_or_try_init(|| async {
                // shutdown flips `closed` while holding the init lock
                if self.closed.load(Ordering::Acquire) {
                    return Err(PoolError::closed(&self.name));
                }
                let Some(build) = &self.build else {
                    return Err(PoolError::factory_init(
                        &self.name,
                        "pool has no factory builder",
                    ));
                };
                let factory = build()
                    .await
                    .map_err(|e| PoolError::factory_init(&self.name, e))?;
                debug!(pool = %self.name, "pool initialized");
                Ok(factory)
            })
            .await
    }

    async fn release(&self, mut handle: F::Handle) {
        let Some(factory) = self.factory.get() else {
            return;
        };

        if self.closed.load(Ordering::Acquire) {
            debug!(pool = %self.name, "pool is closed; destroying released handle");
            factory.destroy(handle).await;
            return;
        }

        match factory.recycle(&mut handle).await {
            Ok(()) => {
                // shutdown sets `closed` before it drains the idle stack
                let rejected = {
                    let mut idle = self.idle.lock();
                    if self.closed.load(Ordering::Acquire) {
                        Some(handle)
                    } else {
                        idle.push(handle);
                        None
                    }
                };
                match rejected {
                    Some(handle) => {
                        debug!(pool = %self.name, "pool closed during recycle; destroying handle");
                        factory.destroy(handle).await;
                    }
                    None => trace!(pool = %self.name, "returned handle to pool"),
                }
            }
            Err(e) => {
                warn!(pool = %self.name, error = %e, "could not recycle handle; destroying it");
                factory.destroy(handle).await;
            }
        }
    }
}

const RELEASED: &str = "pooled handle accessed after release";

/// A borrowed handle. Releasing it (explicitly, or by dropping it) returns
/// the handle to its pool instead of destroying it.
///
/// Prefer [`release`](Self::release) on the normal path; `Drop` covers every
/// other exit (`?`, early return, panic) by spawning the release onto the
/// current tokio runtime.
pub struct Pooled<F: ResourceFactory> {
    handle: Option<F::Handle>,
    pool: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Pooled<F> {
    /// Return the handle to the pool.
    pub async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle).await;
        }
    }

    pub fn pool_name(&self) -> &str {
        &self.pool.name
    }
}

impl<F: ResourceFactory> Deref for Pooled<F> {
    type Target = F::Handle;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref().expect(RELEASED)
    }
}

impl<F: ResourceFactory> DerefMut for Pooled<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.handle.as_mut().expect(RELEASED)
    }
}

impl<F: ResourceFactory> Drop for Pooled<F> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pool = Arc::clone(&self.pool);
                runtime.spawn(async move { pool.release(handle).await });
            }
            Err(_) => {
                warn!(pool = %self.pool.name, "guard dropped outside a tokio runtime; handle discarded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug)]
    struct Widget {
        id: usize,
        dirty: bool,
    }

    #[derive(Default)]
    struct Counts {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        closed: AtomicUsize,
        fail_create: AtomicBool,
        fail_recycle: AtomicBool,
        slow_recycle: AtomicBool,
    }

    struct WidgetFactory(Arc<Counts>);

    #[async_trait]
    impl ResourceFactory for WidgetFactory {
        type Handle = Widget;
        type Error = io::Error;

        async fn create(&self) -> std::result::Result<Widget, io::Error> {
            if self.0.fail_create.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "no widgets"));
            }
            let id = self.0.created.fetch_add(1, Ordering::SeqCst);
            Ok(Widget { id, dirty: false })
        }

        async fn recycle(&self, widget: &mut Widget) -> std::result::Result<(), io::Error> {
            if self.0.slow_recycle.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if self.0.fail_recycle.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "stuck"));
            }
            widget.dirty = false;
            Ok(())
        }

        async fn destroy(&self, _widget: Widget) {
            self.0.destroyed.fetch_add(1, Ordering::SeqCst);
        }

        async fn close(&self) {
            self.0.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool() -> (Pool<WidgetFactory>, Arc<Counts>) {
        let counts = Arc::new(Counts::default());
        let factory_counts = Arc::clone(&counts);
        let pool = Pool::lazy("widgets", move || {
            let counts = Arc::clone(&factory_counts);
            async move { Ok::<_, io::Error>(WidgetFactory(counts)) }
        });
        (pool, counts)
    }

    async fn wait_for_idle(pool: &Pool<WidgetFactory>, expected: usize) {
        for _ in 0..100 {
            if pool.idle_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("pool never reached {} idle handles", expected);
    }

    #[tokio::test]
    async fn first_borrow_initializes() {
        let (pool, counts) = pool();
        assert!(!pool.is_initialized());

        let widget = pool.borrow().await.expect("borrow failed");
        assert!(pool.is_initialized());
        assert_eq!(widget.id, 0);
        assert_eq!(counts.created.load(Ordering::SeqCst), 1);
        widget.release().await;
    }

    #[tokio::test]
    async fn release_then_borrow_reuses_same_handle() {
        let (pool, counts) = pool();

        let h1 = pool.borrow().await.unwrap();
        let id = h1.id;
        h1.release().await;

        let again = pool.borrow().await.unwrap();
        assert_eq!(again.id, id);
        assert_eq!(counts.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reuse_is_lifo() {
        let (pool, _) = pool();

        let a = pool.borrow().await.unwrap();
        let b = pool.borrow().await.unwrap();
        let (a_id, b_id) = (a.id, b.id);
        a.release().await;
        b.release().await;

        let first = pool.borrow().await.unwrap();
        let second = pool.borrow().await.unwrap();
        assert_eq!(first.id, b_id);
        assert_eq!(second.id, a_id);
    }

    #[tokio::test]
    async fn recycle_resets_handle() {
        let (pool, _) = pool();

        let mut widget = pool.borrow().await.unwrap();
        widget.dirty = true;
        widget.release().await;

        let widget = pool.borrow().await.unwrap();
        assert!(!widget.dirty);
    }

    #[tokio::test]
    async fn failed_recycle_destroys_handle() {
        let (pool, counts) = pool();

        let widget = pool.borrow().await.unwrap();
        counts.fail_recycle.store(true, Ordering::SeqCst);
        widget.release().await;

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(counts.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn construction_failure_leaves_pool_usable() {
        let (pool, counts) = pool();

        counts.fail_create.store(true, Ordering::SeqCst);
        let err = pool.borrow().await.err().expect("borrow should fail");
        assert!(matches!(err, PoolError::Construction { .. }));

        counts.fail_create.store(false, Ordering::SeqCst);
        let widget = pool.borrow().await.expect("pool should recover");
        assert_eq!(widget.id, 0);
    }

    #[tokio::test]
    async fn builder_failure_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let builder_attempts = Arc::clone(&attempts);
        let pool = Pool::lazy("flaky", move || {
            let attempt = builder_attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(io::Error::new(io::ErrorKind::NotFound, "no config"))
                } else {
                    Ok(WidgetFactory(Arc::new(Counts::default())))
                }
            }
        });

        let err = pool.borrow().await.err().expect("first borrow should fail");
        assert!(matches!(err, PoolError::FactoryInit { .. }));
        assert!(!pool.is_initialized());

        pool.borrow().await.expect("second borrow should succeed");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_destroys_idle_handles_and_closes_factory() {
        let (pool, counts) = pool();

        let handles = vec![
            pool.borrow().await.unwrap(),
            pool.borrow().await.unwrap(),
            pool.borrow().await.unwrap(),
        ];
        for handle in handles {
            handle.release().await;
        }
        assert_eq!(pool.idle_count(), 3);

        let destroyed = pool.shutdown().await.expect("shutdown failed");
        assert_eq!(destroyed, 3);
        assert_eq!(counts.destroyed.load(Ordering::SeqCst), 3);
        assert_eq!(counts.closed.load(Ordering::SeqCst), 1);

        let err = pool.borrow().await.err().expect("borrow after shutdown");
        assert!(matches!(err, PoolError::Closed { .. }));
        assert!(matches!(
            pool.shutdown().await,
            Err(PoolError::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn release_after_shutdown_destroys_handle() {
        let (pool, counts) = pool();

        let widget = pool.borrow().await.unwrap();
        assert_eq!(pool.shutdown().await.unwrap(), 0);

        widget.release().await;
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(counts.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_during_recycle_destroys_handle() {
        let (pool, counts) = pool();

        let widget = pool.borrow().await.unwrap();
        counts.slow_recycle.store(true, Ordering::SeqCst);
        let release = tokio::spawn(widget.release());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(pool.shutdown().await.unwrap(), 0);
        release.await.unwrap();

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(counts.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_before_first_use_never_builds() {
        let built = Arc::new(AtomicUsize::new(0));
        let builder_built = Arc::clone(&built);
        let pool = Pool::lazy("unused", move || {
            builder_built.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, io::Error>(WidgetFactory(Arc::new(Counts::default()))) }
        });

        assert_eq!(pool.shutdown().await.unwrap(), 0);
        assert!(pool.borrow().await.is_err());
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropped_guard_returns_handle() {
        let (pool, counts) = pool();

        {
            let _widget = pool.borrow().await.unwrap();
        }
        wait_for_idle(&pool, 1).await;

        pool.borrow().await.unwrap();
        assert_eq!(counts.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_path_still_returns_handle() {
        let (pool, _) = pool();

        async fn fails(pool: &Pool<WidgetFactory>) -> std::result::Result<(), io::Error> {
            let _widget = pool.borrow().await.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            Err(io::Error::new(io::ErrorKind::Other, "query failed"))
        }

        assert!(fails(&pool).await.is_err());
        wait_for_idle(&pool, 1).await;
    }

    #[tokio::test]
    async fn prebuilt_factory_is_active() {
        let counts = Arc::new(Counts::default());
        let pool = Pool::new("ready", WidgetFactory(Arc::clone(&counts)));
        assert!(pool.is_initialized());
        assert_eq!(pool.name(), "ready");

        let widget = pool.borrow().await.unwrap();
        assert_eq!(widget.pool_name(), "ready");
    }
}
