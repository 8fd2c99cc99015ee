//! HTTP client pooling over `reqwest`.
//!
//! Each key (usually derived with [`namespace_key`](crate::namespace_key))
//! carries its own [`ClientConfig`]: registrants applied to every request,
//! string properties, and TLS settings. The properties `timeout`,
//! `connect_timeout` and `pool_idle_timeout` (whole seconds) and
//! `user_agent` are interpreted when a client is built; every property is
//! kept on the client for inspection.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Certificate, Client, IntoUrl, Method, RequestBuilder};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::factory::KeyedResourceFactory;
use crate::keyed::{KeyedPool, PooledKeyed};

pub const TIMEOUT: &str = "timeout";
pub const CONNECT_TIMEOUT: &str = "connect_timeout";
pub const POOL_IDLE_TIMEOUT: &str = "pool_idle_timeout";
pub const USER_AGENT: &str = "user_agent";

/// Something that customizes every request a client builds, such as a
/// default header or an auth filter.
pub trait Registrant: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, request: RequestBuilder) -> RequestBuilder;
}

/// Adds a fixed header to every request.
#[derive(Debug, Clone)]
pub struct DefaultHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl DefaultHeader {
    pub fn new(name: &str, value: &str) -> std::result::Result<Self, ClientError> {
        let invalid = || ClientError::InvalidHeader {
            name: name.to_owned(),
        };
        Ok(Self {
            name: HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?,
            value: HeaderValue::from_str(value).map_err(|_| invalid())?,
        })
    }
}

impl Registrant for DefaultHeader {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(self.name.clone(), self.value.clone())
    }
}

/// Extra trust configuration for a key's clients.
#[derive(Clone, Default)]
pub struct TlsSettings {
    pub root_certificates: Vec<Certificate>,
    pub accept_invalid_certs: bool,
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("root_certificates", &self.root_certificates.len())
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// Per-key client configuration.
#[derive(Clone, Default)]
pub struct ClientConfig {
    registrants: Vec<Arc<dyn Registrant>>,
    properties: BTreeMap<String, String>,
    tls: Option<TlsSettings>,
}

impl ClientConfig {
    pub fn add_registrant(&mut self, registrant: Arc<dyn Registrant>) {
        self.registrants.push(registrant);
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn set_tls(&mut self, tls: TlsSettings) {
        self.tls = Some(tls);
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn registrants(&self) -> &[Arc<dyn Registrant>] {
        &self.registrants
    }

    pub fn tls(&self) -> Option<&TlsSettings> {
        self.tls.as_ref()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.registrants.iter().map(|r| r.name()).collect();
        f.debug_struct("ClientConfig")
            .field("registrants", &names)
            .field("properties", &self.properties)
            .field("tls", &self.tls)
            .finish()
    }
}

/// A pooled HTTP client and the configuration it was built with.
pub struct HttpClient {
    client: Client,
    key: String,
    config: ClientConfig,
}

impl HttpClient {
    /// Start a request with every registrant applied.
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.config
            .registrants
            .iter()
            .fold(self.client.request(method, url), |request, registrant| {
                registrant.apply(request)
            })
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        self.config.properties()
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.config.property(name)
    }

    pub fn registrants(&self) -> &[Arc<dyn Registrant>] {
        self.config.registrants()
    }

    pub fn tls(&self) -> Option<&TlsSettings> {
        self.config.tls()
    }

    /// Drop the underlying client and its connection pool.
    pub(crate) fn close(self) {
        debug!(key = %self.key, "closing HTTP client");
    }
}

/// Builds a [`HttpClient`] from a key's configuration snapshot.
#[derive(Debug, Default)]
pub struct ClientFactory;

fn seconds(key: &str, config: &ClientConfig, name: &str) -> std::result::Result<Option<Duration>, ClientError> {
    config
        .property(name)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ClientError::invalid_property(key, name, value))
        })
        .transpose()
}

#[async_trait]
impl KeyedResourceFactory for ClientFactory {
    type Handle = HttpClient;
    type Config = ClientConfig;
    type Error = ClientError;

    async fn create(&self, key: &str, config: &ClientConfig) -> std::result::Result<HttpClient, ClientError> {
        let mut builder = Client::builder();

        if let Some(timeout) = seconds(key, config, TIMEOUT)? {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = seconds(key, config, CONNECT_TIMEOUT)? {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = seconds(key, config, POOL_IDLE_TIMEOUT)? {
            builder = builder.pool_idle_timeout(timeout);
        }
        if let Some(agent) = config.property(USER_AGENT) {
            builder = builder.user_agent(agent);
        }
        if let Some(tls) = config.tls() {
            for certificate in &tls.root_certificates {
                builder = builder.add_root_certificate(certificate.clone());
            }
            builder = builder.danger_accept_invalid_certs(tls.accept_invalid_certs);
        }

        let client = builder.build()?;
        debug!(key, properties = config.properties().len(), "built HTTP client");
        Ok(HttpClient {
            client,
            key: key.to_owned(),
            config: config.clone(),
        })
    }

    async fn destroy(&self, _key: &str, client: HttpClient) {
        client.close();
    }
}

/// Keyed pool of HTTP clients.
pub type ClientPool = KeyedPool<ClientFactory>;

impl KeyedPool<ClientFactory> {
    /// An uninitialized client pool.
    pub fn clients(name: impl Into<String>) -> Self {
        KeyedPool::lazy(name, || async { Ok::<_, Infallible>(ClientFactory) })
    }

    pub fn add_registrant(&self, key: &str, registrant: impl Registrant + 'static) {
        let registrant: Arc<dyn Registrant> = Arc::new(registrant);
        self.configure(key, |config| config.add_registrant(registrant));
    }

    pub fn set_property(&self, key: &str, name: impl Into<String>, value: impl Into<String>) {
        self.configure(key, |config| config.set_property(name, value));
    }

    pub fn set_tls(&self, key: &str, tls: TlsSettings) {
        self.configure(key, |config| config.set_tls(tls));
    }

    /// The value new clients for `key` would get for property `name`.
    pub fn property(&self, key: &str, name: &str) -> Option<String> {
        self.config(key).property(name).map(str::to_owned)
    }

    /// Borrow a client wrapped in a [`PooledClient`].
    pub async fn borrow_client(&self, key: &str) -> Result<PooledClient> {
        self.borrow(key).await.map(PooledClient)
    }
}

/// A borrowed HTTP client.
pub struct PooledClient(PooledKeyed<ClientFactory>);

impl PooledClient {
    pub fn key(&self) -> &str {
        self.0.key()
    }

    /// Give the client back to its pool.
    pub async fn release(self) {
        self.0.release().await;
    }
}

impl Deref for PooledClient {
    type Target = HttpClient;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;

    #[tokio::test]
    async fn property_change_reaches_only_new_clients() {
        let pool = ClientPool::clients("clients");
        pool.set_property("svc1", TIMEOUT, "30");

        let h1 = pool.borrow_client("svc1").await.unwrap();
        assert_eq!(h1.property(TIMEOUT), Some("30"));

        pool.set_property("svc1", TIMEOUT, "60");
        assert_eq!(pool.property("svc1", TIMEOUT).as_deref(), Some("60"));

        let h2 = pool.borrow_client("svc1").await.unwrap();
        assert_eq!(h2.property(TIMEOUT), Some("60"));
        assert_eq!(h1.property(TIMEOUT), Some("30"));

        h1.release().await;
        h2.release().await;
    }

    #[tokio::test]
    async fn keys_do_not_share_properties() {
        let pool = ClientPool::clients("clients");
        pool.set_property("A", USER_AGENT, "geotweet-test");

        let b = pool.borrow_client("B").await.unwrap();
        assert!(b.properties().is_empty());
        assert_eq!(b.key(), "B");
        assert!(b.tls().is_none());
    }

    #[tokio::test]
    async fn invalid_timeout_is_a_construction_error() {
        let pool = ClientPool::clients("clients");
        pool.set_property("svc1", TIMEOUT, "soon");

        let err = pool.borrow_client("svc1").await.err().expect("borrow should fail");
        assert!(matches!(err, PoolError::Construction { .. }));
        assert!(err.to_string().contains("soon"));
    }

    #[tokio::test]
    async fn registrants_apply_to_requests() {
        let pool = ClientPool::clients("clients");
        pool.add_registrant("svc1", DefaultHeader::new("x-application", "geotweet").unwrap());

        let client = pool.borrow_client("svc1").await.unwrap();
        assert_eq!(client.registrants().len(), 1);
        assert_eq!(client.registrants()[0].name(), "x-application");

        let request = client.get("http://localhost:12345/version").build().unwrap();
        assert_eq!(request.headers()["x-application"], "geotweet");
        client.release().await;
    }

    #[test]
    fn default_header_rejects_bad_names() {
        assert!(matches!(
            DefaultHeader::new("bad header", "x"),
            Err(ClientError::InvalidHeader { .. })
        ));
    }

    #[tokio::test]
    async fn tls_settings_are_kept() {
        let pool = ClientPool::clients("clients");
        pool.set_tls(
            "svc1",
            TlsSettings {
                accept_invalid_certs: true,
                ..TlsSettings::default()
            },
        );

        let client = pool.borrow_client("svc1").await.unwrap();
        assert!(client.tls().map_or(false, |tls| tls.accept_invalid_certs));
    }
}
