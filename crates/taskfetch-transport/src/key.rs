//! Transport identity and construction.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::CookieStore;
use reqwest::{redirect, Client, Proxy};
use taskfetch_core::FetchError;

/// Proxy sentinel: disables proxying entirely, overriding any proxy
/// configuration inherited from the process environment.
pub const NO_PROXY: &str = "DIRECT";

pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_MAX_IDLE_CONNS: u32 = 100;
pub const DEFAULT_MAX_IDLE_CONNS_PER_HOST: u32 = 100;

/// Proxy behavior baked into a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProxySetting {
    /// Inherit proxies from the process environment.
    Environment,
    /// Direct connections only; environment proxies are ignored.
    Disabled,
    /// Route everything through the given proxy.
    Url(String),
}

impl ProxySetting {
    /// Canonicalizes a configured proxy string. The [`NO_PROXY`] sentinel
    /// and the empty string both canonicalize to the proxy-disabled
    /// setting; an unset value inherits from the environment.
    pub fn from_config(proxy: Option<&str>) -> Self {
        match proxy {
            None => ProxySetting::Environment,
            Some(s) if s.is_empty() || s == NO_PROXY => ProxySetting::Disabled,
            Some(s) => ProxySetting::Url(s.to_string()),
        }
    }

    /// Whether this setting routes through an explicit proxy. Proxy-bearing
    /// entries are the preferred eviction victims.
    pub fn is_proxied(&self) -> bool {
        matches!(self, ProxySetting::Url(_))
    }
}

/// The exact tuple of network settings that determines transport identity.
///
/// Fetchers whose configurations canonicalize to the same key share one
/// client and therefore one set of connection pools. Equality is structural
/// over every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportKey {
    pub proxy: ProxySetting,
    /// Pool-wide idle connection cap. Part of transport identity; the
    /// underlying client pool has no total cap to apply it to.
    pub max_idle_conns: u32,
    /// Per-host idle connection cap; `0` means unlimited.
    pub max_idle_conns_per_host: u32,
    /// Per-host total connection cap. Part of transport identity; the
    /// underlying client pool cannot enforce it.
    pub max_conns_per_host: u32,
    pub tls_handshake_timeout: Duration,
    /// `Duration::ZERO` means unlimited.
    pub response_header_timeout: Duration,
    /// `Duration::ZERO` means idle connections are kept indefinitely.
    pub idle_conn_timeout: Duration,
}

impl Default for TransportKey {
    fn default() -> Self {
        Self {
            proxy: ProxySetting::Environment,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            max_idle_conns_per_host: DEFAULT_MAX_IDLE_CONNS_PER_HOST,
            max_conns_per_host: 0,
            tls_handshake_timeout: DEFAULT_TLS_HANDSHAKE_TIMEOUT,
            response_header_timeout: Duration::ZERO,
            idle_conn_timeout: DEFAULT_IDLE_CONN_TIMEOUT,
        }
    }
}

/// Delegates to a boxed `CookieStore` so it can be passed to reqwest's
/// `cookie_provider`, which requires a `Sized` store type.
struct DynCookieStore(Arc<dyn CookieStore>);

impl CookieStore for DynCookieStore {
    fn set_cookies(
        &self,
        cookie_headers: &mut dyn Iterator<Item = &reqwest::header::HeaderValue>,
        url: &url::Url,
    ) {
        self.0.set_cookies(cookie_headers, url)
    }

    fn cookies(&self, url: &url::Url) -> Option<reqwest::header::HeaderValue> {
        self.0.cookies(url)
    }
}

pub(crate) enum TransportRole {
    Shared,
    Isolated,
}

/// Builds a client for `key`. Runs outside any cache lock: proxy parsing
/// and pool setup are the expensive part of a miss.
pub(crate) fn build_transport(
    key: &TransportKey,
    role: TransportRole,
) -> Result<Client, FetchError> {
    build_transport_with(key, role, None)
}

pub(crate) fn build_transport_with(
    key: &TransportKey,
    role: TransportRole,
    cookie_jar: Option<Arc<dyn CookieStore>>,
) -> Result<Client, FetchError> {
    let per_host = if key.max_idle_conns_per_host == 0 {
        usize::MAX
    } else {
        key.max_idle_conns_per_host as usize
    };

    let mut builder = Client::builder()
        .redirect(redirect::Policy::none())
        .use_rustls_tls()
        .pool_max_idle_per_host(per_host);

    if !key.tls_handshake_timeout.is_zero() {
        builder = builder.connect_timeout(key.tls_handshake_timeout);
    }
    if !key.response_header_timeout.is_zero() {
        builder = builder.read_timeout(key.response_header_timeout);
    }
    builder = builder.pool_idle_timeout(if key.idle_conn_timeout.is_zero() {
        None
    } else {
        Some(key.idle_conn_timeout)
    });

    match &key.proxy {
        ProxySetting::Environment => {}
        ProxySetting::Disabled => builder = builder.no_proxy(),
        ProxySetting::Url(u) => {
            let proxy = Proxy::all(u.as_str()).map_err(|e| FetchError::InvalidProxyUrl {
                url: u.clone(),
                source: e.into(),
            })?;
            builder = builder.proxy(proxy);
        }
    }

    if let Some(jar) = cookie_jar {
        builder = builder.cookie_provider(Arc::new(DynCookieStore(jar)));
    }

    builder.build().map_err(|e| match role {
        TransportRole::Shared => FetchError::SharedTransportCreateFailed { source: e.into() },
        TransportRole::Isolated => FetchError::IsolatedTransportCreateFailed { source: e.into() },
    })
}

/// Builds a transport that never enters the cache. Its lifetime is owned by
/// the fetcher holding it.
pub fn isolated_transport(key: &TransportKey) -> Result<Client, FetchError> {
    build_transport(key, TransportRole::Isolated)
}

/// An isolated transport with a cookie jar attached. Cookie state is
/// per-client, so jar-bearing transports never enter the cache.
pub fn isolated_transport_with_jar(
    key: &TransportKey,
    jar: Arc<dyn CookieStore>,
) -> Result<Client, FetchError> {
    build_transport_with(key, TransportRole::Isolated, Some(jar))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_canonicalization() {
        assert_eq!(ProxySetting::from_config(None), ProxySetting::Environment);
        assert_eq!(ProxySetting::from_config(Some("")), ProxySetting::Disabled);
        assert_eq!(
            ProxySetting::from_config(Some(NO_PROXY)),
            ProxySetting::Disabled
        );
        assert_eq!(
            ProxySetting::from_config(Some("http://proxy.internal:3128")),
            ProxySetting::Url("http://proxy.internal:3128".to_string())
        );
    }

    #[test]
    fn key_equality_is_structural() {
        let a = TransportKey::default();
        let b = TransportKey::default();
        assert_eq!(a, b);

        let c = TransportKey {
            idle_conn_timeout: Duration::from_secs(30),
            ..TransportKey::default()
        };
        assert_ne!(a, c);
    }

    #[test]
    fn invalid_proxy_url_is_reported() {
        let key = TransportKey {
            proxy: ProxySetting::Url("::not a proxy::".to_string()),
            ..TransportKey::default()
        };
        let err = isolated_transport(&key).unwrap_err();
        assert!(matches!(err, FetchError::InvalidProxyUrl { .. }));
    }

    #[test]
    fn default_key_builds() {
        assert!(isolated_transport(&TransportKey::default()).is_ok());
    }
}
