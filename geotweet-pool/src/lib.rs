//! Pools of expensive, reusable handles.
//!
//! A pool owns one lazily built factory and a LIFO stack of idle handles.
//! Callers borrow a handle inside a guard, use it exclusively, and release it
//! (explicitly or by dropping the guard); the handle is recycled to a neutral
//! state and stays alive for the next borrower. Two variants are provided:
//!
//! - [`Pool`] for a single resource kind, used for database sessions
//!   ([`SessionPool`], [`PgSessionSource`])
//! - [`KeyedPool`] for per-key configured resources, used for HTTP clients
//!   ([`ClientPool`])

pub mod client;
pub mod error;
pub mod factory;
pub mod keyed;
pub mod lazy;
pub mod pg;
pub mod pool;
pub mod session;

pub use client::{
    ClientConfig, ClientFactory, ClientPool, DefaultHeader, HttpClient, PooledClient, Registrant,
    TlsSettings,
};
pub use error::{BoxError, ClientError, PoolError, Result, SessionError};
pub use factory::{KeyedResourceFactory, ResourceFactory};
pub use keyed::{namespace_key, KeyedPool, PooledKeyed};
pub use lazy::LazyFactory;
pub use pg::{PgSession, PgSessionSource};
pub use pool::{Pool, Pooled};
pub use session::{PooledSession, Session, SessionFactory, SessionPool, SessionSource};
