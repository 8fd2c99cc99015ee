//! Keyed pool: one idle stack and one configuration per string key, all
//! served by a single lazily built factory.
//!
//! Configuration for a key should be registered before the key's first
//! borrow. Registering later is accepted, but only handles constructed from
//! then on see it, and a warning is logged so misordered setup shows up.

use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::{BoxError, PoolError, Result};
use crate::factory::KeyedResourceFactory;
use crate::lazy::LazyFactory;
use crate::pool::{boxed_builder, Builder};

/// Idle handles, configuration and first-borrow flag for one key.
struct KeyState<F: KeyedResourceFactory> {
    config: F::Config,
    idle: Vec<F::Handle>,
    /// Set when a borrow first snapshots `config`, before construction
    /// finishes.
    borrowed: bool,
}

impl<F: KeyedResourceFactory> Default for KeyState<F> {
    fn default() -> Self {
        Self {
            config: F::Config::default(),
            idle: Vec::new(),
            borrowed: false,
        }
    }
}

/// A pool of reusable handles partitioned by key.
///
/// Cloning is cheap; every clone refers to the same pool.
pub struct KeyedPool<F: KeyedResourceFactory> {
    inner: Arc<KeyedInner<F>>,
}

impl<F: KeyedResourceFactory> Clone for KeyedPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct KeyedInner<F: KeyedResourceFactory> {
    name: String,
    build: Option<Builder<F>>,
    factory: LazyFactory<F>,
    keys: Mutex<HashMap<String, KeyState<F>>>,
    closed: AtomicBool,
}

impl<F: KeyedResourceFactory> KeyedPool<F> {
    /// Create an uninitialized pool whose factory is built on first borrow.
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
            inner: Arc::new(KeyedInner {
                name,
                build,
                factory,
                keys: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.factory.get().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of idle handles for `key`.
    pub fn idle_count(&self, key: &str) -> usize {
        self.inner
            .keys
            .lock()
            .get(key)
            .map_or(0, |state| state.idle.len())
    }

    /// Update the configuration used to construct new handles for `key`.
    ///
    /// Handles that already exist keep the configuration they were built
    /// with. Updating a key whose first borrow has started logs a warning,
    /// even while that borrow is still constructing its handle.
    pub fn configure(&self, key: &str, update: impl FnOnce(&mut F::Config)) {
        let mut keys = self.inner.keys.lock();
        let state = keys.entry(key.to_owned()).or_default();
        if state.borrowed {
            warn!(
                pool = %self.inner.name,
                key = %sanitize_key(key),
                "configuring key after its first borrow; existing handles keep their old configuration"
            );
        }
        update(&mut state.config);
    }

    /// Snapshot of the configuration new handles for `key` would get.
    pub fn config(&self, key: &str) -> F::Config {
        self.inner
            .keys
            .lock()
            .get(key)
            .map(|state| state.config.clone())
            .unwrap_or_default()
    }

    /// Borrow a handle for `key`, building the factory on first use.
    ///
    /// # Errors
    ///
    /// Same as [`Pool::borrow`](crate::Pool::borrow).
    pub async fn borrow(&self, key: &str) -> Result<PooledKeyed<F>> {
        let inner = &self.inner;
        let factory = inner.factory().await?;

        let reused = {
            let mut keys = inner.keys.lock();
            let state = keys.entry(key.to_owned()).or_default();
            match state.idle.pop() {
                Some(handle) => Ok(handle),
                None => {
                    state.borrowed = true;
                    Err(state.config.clone())
                }
            }
        };

        let handle = match reused {
            Ok(handle) => {
                trace!(pool = %inner.name, key = %sanitize_key(key), "reusing idle handle");
                handle
            }
            Err(config) => {
                let handle = factory
                    .create(key, &config)
                    .await
                    .map_err(|e| PoolError::construction(&inner.name, e))?;
                debug!(pool = %inner.name, key = %sanitize_key(key), "constructed new handle");
                handle
            }
        };

        Ok(PooledKeyed {
            key: key.to_owned(),
            handle: Some(handle),
            pool: Arc::clone(inner),
        })
    }

    /// Shut the pool down: destroy the idle handles of every key, then close
    /// the factory. Returns the number of destroyed handles.
    ///
    /// # Errors
    ///
    /// Same as [`Pool::shutdown`](crate::Pool::shutdown).
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

        let idle: Vec<(String, Vec<F::Handle>)> = inner
            .keys
            .lock()
            .iter_mut()
            .map(|(key, state)| (key.clone(), std::mem::take(&mut state.idle)))
            .collect();

        let mut destroyed = 0;
        for (key, handles) in idle {
            for handle in handles {
                factory.destroy(&key, handle).await;
                destroyed += 1;
            }
        }
        factory.close().await;

        info!(pool = %inner.name, destroyed, "pool shut down");
        Ok(destroyed)
    }
}

impl<F: KeyedResourceFactory> KeyedInner<F> {
    async fn factory(&self) -> Result<&F> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::closed(&self.name));
        }

        self.factory
            .get_or_try_init(|| async {
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

    async fn release(&self, key: &str, mut handle: F::Handle) {
        let Some(factory) = self.factory.get() else {
            return;
        };

        if self.closed.load(Ordering::Acquire) {
            debug!(pool = %self.name, key = %sanitize_key(key), "pool is closed; destroying released handle");
            factory.destroy(key, handle).await;
            return;
        }

        match factory.recycle(key, &mut handle).await {
            Ok(()) => {
                // shutdown sets `closed` before it drains the idle stacks
                let rejected = {
                    let mut keys = self.keys.lock();
                    if self.closed.load(Ordering::Acquire) {
                        Some(handle)
                    } else {
                        keys.entry(key.to_owned()).or_default().idle.push(handle);
                        None
                    }
                };
                match rejected {
                    Some(handle) => {
                        debug!(pool = %self.name, key = %sanitize_key(key), "pool closed during recycle; destroying handle");
                        factory.destroy(key, handle).await;
                    }
                    None => {
                        trace!(pool = %self.name, key = %sanitize_key(key), "returned handle to pool")
                    }
                }
            }
            Err(e) => {
                warn!(pool = %self.name, key = %sanitize_key(key), error = %e, "could not recycle handle; destroying it");
                factory.destroy(key, handle).await;
            }
        }
    }
}

const RELEASED: &str = "pooled handle accessed after release";

/// A handle borrowed from a [`KeyedPool`]. Releasing it returns the handle
/// to the idle stack of the key it was borrowed under.
pub struct PooledKeyed<F: KeyedResourceFactory> {
    key: String,
    handle: Option<F::Handle>,
    pool: Arc<KeyedInner<F>>,
}

impl<F: KeyedResourceFactory> PooledKeyed<F> {
    /// Return the handle to the pool.
    pub async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(&self.key, handle).await;
        }
    }

    /// The key this handle was borrowed under.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<F: KeyedResourceFactory> Deref for PooledKeyed<F> {
    type Target = F::Handle;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref().expect(RELEASED)
    }
}

impl<F: KeyedResourceFactory> DerefMut for PooledKeyed<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.handle.as_mut().expect(RELEASED)
    }
}

impl<F: KeyedResourceFactory> Drop for PooledKeyed<F> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pool = Arc::clone(&self.pool);
                let key = std::mem::take(&mut self.key);
                runtime.spawn(async move { pool.release(&key, handle).await });
            }
            Err(_) => {
                warn!(pool = %self.pool.name, "guard dropped outside a tokio runtime; handle discarded");
            }
        }
    }
}

/// Derive a URL-like pool key from a namespace such as a module path.
///
/// Segments are split on `.` or `::` and reversed into a host name, with any
/// segments past the third appended as path components:
///
/// ```
/// use geotweet_pool::namespace_key;
///
/// assert_eq!(namespace_key("geotweet"), "http://geotweet");
/// assert_eq!(namespace_key("geotweet::cli"), "http://cli.geotweet");
/// assert_eq!(namespace_key("org.geotweet.cli.query"), "http://cli.geotweet.org/query");
/// ```
pub fn namespace_key(namespace: &str) -> String {
    let segments: Vec<&str> = namespace
        .split(['.', ':'])
        .filter(|segment| !segment.is_empty())
        .collect();

    match segments.as_slice() {
        [] => String::new(),
        [only] => format!("http://{}", only),
        [first, second] => format!("http://{}.{}", second, first),
        [first, second, third, rest @ ..] => {
            let mut key = format!("http://{}.{}.{}", third, second, first);
            for segment in rest {
                key.push('/');
                key.push_str(segment);
            }
            key
        }
    }
}

/// Make a caller-supplied key safe to log on one line.
pub(crate) fn sanitize_key(key: &str) -> Cow<'_, str> {
    if key.contains(['\n', '\r']) {
        let mut clean = key.replace(['\n', '\r'], "_");
        clean.push_str(" (encoded)");
        Cow::Owned(clean)
    } else {
        Cow::Borrowed(key)
    }
}
