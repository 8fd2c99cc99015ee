//! Resource factories: the capability a pool needs to build, recycle and
//! tear down its handles.

use async_trait::async_trait;

/// Builds handles for an unkeyed [`Pool`](crate::Pool).
///
/// One factory instance is owned by each pool. `recycle` is the single clear
/// step applied to a returned handle before it becomes idle again; if it
/// fails the pool destroys the handle instead of keeping it.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The pooled resource
    type Handle: Send + 'static;
    /// Error returned by construction and recycling
    type Error: std::error::Error + Send + Sync + 'static;

    /// Construct a fresh handle.
    async fn create(&self) -> Result<Self::Handle, Self::Error>;

    /// Bring a returned handle back to a neutral state.
    async fn recycle(&self, _handle: &mut Self::Handle) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Destroy a handle for real. Only the pool calls this.
    async fn destroy(&self, handle: Self::Handle) {
        drop(handle);
    }

    /// Release the factory's own resources when the pool shuts down.
    async fn close(&self) {}
}

/// Builds handles for a [`KeyedPool`](crate::KeyedPool).
///
/// `create` receives a snapshot of the key's configuration taken at
/// construction time, so later registrations never reach handles that
/// already exist.
#[async_trait]
pub trait KeyedResourceFactory: Send + Sync + 'static {
    /// The pooled resource
    type Handle: Send + 'static;
    /// Per-key construction parameters
    type Config: Clone + Default + Send + Sync + 'static;
    /// Error returned by construction and recycling
    type Error: std::error::Error + Send + Sync + 'static;

    /// Construct a fresh handle for `key`.
    async fn create(&self, key: &str, config: &Self::Config) -> Result<Self::Handle, Self::Error>;

    /// Bring a returned handle back to a neutral state.
    async fn recycle(&self, _key: &str, _handle: &mut Self::Handle) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Destroy a handle for real. Only the pool calls this.
    async fn destroy(&self, _key: &str, handle: Self::Handle) {
        drop(handle);
    }

    /// Release the factory's own resources when the pool shuts down.
    async fn close(&self) {}
}
