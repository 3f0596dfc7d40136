//! Builder surface for constructing fetchers.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::CookieStore;
use reqwest::Client;

use taskfetch_core::FetchError;
use taskfetch_transport::{
    isolated_transport, isolated_transport_with_jar, TransportCache, NO_PROXY,
};

use crate::config::FetcherConfig;
use crate::{factory, Fetcher};

/// Configures and builds a [`Fetcher`].
///
/// Every setter overrides one [`FetcherConfig`] field; unset fields keep
/// their documented defaults. [`build`](FetcherBuilder::build) normalizes
/// the configuration, acquires a transport (shared via the process-wide
/// cache unless caching is disabled, a client was injected, or a cookie
/// jar demands isolation), and assembles the middleware chain.
#[derive(Default)]
pub struct FetcherBuilder {
    config: FetcherConfig,
    client: Option<Client>,
    cookie_jar: Option<Arc<dyn CookieStore>>,
    /// Set when the caller explicitly configured a network-level setting;
    /// such overrides cannot be applied to an injected client.
    network_overrides: bool,
}

impl FetcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_config(config: FetcherConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn min_retry_delay(mut self, delay: Duration) -> Self {
        self.config.min_retry_delay = delay;
        self
    }

    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.max_retry_delay = delay;
        self
    }

    /// Response size cap in bytes; [`NO_LIMIT`](crate::NO_LIMIT) disables
    /// limiting.
    pub fn max_bytes(mut self, max_bytes: i64) -> Self {
        self.config.max_bytes = max_bytes;
        self
    }

    /// Per-attempt budget. `Duration::ZERO` waits indefinitely.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn tls_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.tls_handshake_timeout = Some(timeout);
        self.network_overrides = true;
        self
    }

    pub fn response_header_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_header_timeout = Some(timeout);
        self.network_overrides = true;
        self
    }

    pub fn idle_conn_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_conn_timeout = Some(timeout);
        self.network_overrides = true;
        self
    }

    /// Routes requests through `proxy`. Use [`no_proxy`](Self::no_proxy) to
    /// disable environment proxies instead.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy_url = Some(proxy.into());
        self.network_overrides = true;
        self
    }

    /// Direct connections only, overriding any environment proxy.
    pub fn no_proxy(mut self) -> Self {
        self.config.proxy_url = Some(NO_PROXY.to_string());
        self.network_overrides = true;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.config.max_redirects = Some(max);
        self
    }

    pub fn max_idle_conns(mut self, max: u32) -> Self {
        self.config.max_idle_conns = Some(max);
        self.network_overrides = true;
        self
    }

    pub fn max_idle_conns_per_host(mut self, max: u32) -> Self {
        self.config.max_idle_conns_per_host = Some(max);
        self.network_overrides = true;
        self
    }

    pub fn max_conns_per_host(mut self, max: u32) -> Self {
        self.config.max_conns_per_host = Some(max);
        self.network_overrides = true;
        self
    }

    /// Sets a single fixed `User-Agent`.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agents = vec![agent.into()];
        self
    }

    /// Candidate `User-Agent` values, one picked per call.
    pub fn user_agents<I, T>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.config.user_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    /// Picks a random `User-Agent` per call even without a caller list
    /// (the package default list is used).
    pub fn user_agent_randomization(mut self) -> Self {
        self.config.enable_user_agent_randomization = true;
        self
    }

    pub fn allowed_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.config.allowed_status_codes = codes.into_iter().collect();
        self
    }

    pub fn allowed_mime_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.config.allowed_mime_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_missing_content_type(mut self) -> Self {
        self.config.allow_missing_content_type = true;
        self
    }

    pub fn disable_status_code_validation(mut self) -> Self {
        self.config.disable_status_code_validation = true;
        self
    }

    pub fn disable_logging(mut self) -> Self {
        self.config.disable_logging = true;
        self
    }

    /// Always build a private transport instead of sharing via the cache.
    pub fn disable_transport_caching(mut self) -> Self {
        self.config.disable_transport_caching = true;
        self
    }

    /// Injects an externally owned client. The fetcher is isolated (no
    /// cache participation) and the client is used as-is: combining
    /// injection with network-setting overrides fails at build time,
    /// because a built client can neither be inspected nor re-configured.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Attaches a cookie jar. Cookie state is per-client, so this forces an
    /// isolated transport.
    pub fn cookie_jar(mut self, jar: Arc<dyn CookieStore>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    pub fn build(self) -> Result<Fetcher, FetchError> {
        let config = self.config.normalized();

        let client = match self.client {
            Some(client) => {
                if self.network_overrides || self.cookie_jar.is_some() {
                    return Err(FetchError::UnsupportedTransport);
                }
                client
            }
            None => {
                let key = config.transport_key();
                if let Some(jar) = self.cookie_jar {
                    isolated_transport_with_jar(&key, jar)?
                } else if config.disable_transport_caching {
                    isolated_transport(&key)?
                } else {
                    TransportCache::global().lookup_or_create(&key)?
                }
            }
        };

        Ok(Fetcher::from_service(factory::assemble(&config, client)))
    }
}
