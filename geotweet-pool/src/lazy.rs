//! Once-guarded lazy construction of a pool's factory.
//!
//! State machine: uninitialized → initializing → active. The published value
//! lives in a [`OnceLock`], whose release/acquire publication makes the fully
//! built value visible to every thread that observes it. Construction itself
//! is serialized by an async mutex: check, lock, check again, build, publish.

use std::future::Future;
use std::sync::OnceLock;

use tokio::sync::{Mutex, MutexGuard};

/// A value built at most once, on first use, by an async constructor.
pub struct LazyFactory<F> {
    value: OnceLock<F>,
    init: Mutex<()>,
}

impl<F> LazyFactory<F> {
    /// An uninitialized slot.
    pub fn new() -> Self {
        Self {
            value: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// A slot that is already active.
    pub fn with_value(value: F) -> Self {
        Self {
            value: OnceLock::from(value),
            init: Mutex::new(()),
        }
    }

    /// The built value, if construction has completed.
    pub fn get(&self) -> Option<&F> {
        self.value.get()
    }

    /// True while another task holds the construction lock and no value has
    /// been published yet.
    pub fn is_initializing(&self) -> bool {
        self.value.get().is_none() && self.init.try_lock().is_err()
    }

    /// Take the construction lock without waiting. Holding the guard keeps
    /// any construction from starting.
    pub fn try_hold(&self) -> Option<MutexGuard<'_, ()>> {
        self.init.try_lock().ok()
    }

    /// Return the value, building it with `build` if this is the first use.
    ///
    /// Concurrent first callers wait for the single construction and then
    /// observe its result. A failed construction publishes nothing, so the
    /// next caller tries again.
    pub async fn get_or_try_init<E, B, Fut>(&self, build: B) -> Result<&F, E>
    where
        B: FnOnce() -> Fut,
        Fut: Future<Output = Result<F, E>>,
    {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        let _guard = self.init.lock().await;
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        let value = build().await?;
        Ok(self.value.get_or_init(|| value))
    }

    /// Infallible form of [`get_or_try_init`](Self::get_or_try_init).
    pub async fn get_or_init<B, Fut>(&self, build: B) -> &F
    where
        B: FnOnce() -> Fut,
        Fut: Future<Output = F>,
    {
        let built = self
            .get_or_try_init(move || async move {
                Ok::<_, std::convert::Infallible>(build().await)
            })
            .await;
        match built {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<F> Default for LazyFactory<F> {
    fn default() -> Self {
        Self::new()
    }
}
