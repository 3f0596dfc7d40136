//! Fetcher configuration and normalization.

use std::time::Duration;

use taskfetch_guard::DEFAULT_MAX_BODY_BYTES;
use taskfetch_retry::{RetryPolicy, DEFAULT_MIN_RETRY_DELAY, MAX_RETRIES_CAP};
use taskfetch_transport::{
    ProxySetting, TransportKey, DEFAULT_IDLE_CONN_TIMEOUT, DEFAULT_MAX_IDLE_CONNS,
    DEFAULT_MAX_IDLE_CONNS_PER_HOST, DEFAULT_TIMEOUT, DEFAULT_TLS_HANDSHAKE_TIMEOUT,
};

/// Sentinel for `max_bytes`: disables response size limiting entirely.
pub const NO_LIMIT: i64 = -1;

/// Default backoff ceiling applied when `max_retry_delay` is unset.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = taskfetch_retry::DEFAULT_MAX_RETRY_DELAY;

/// Validated input to the fetcher factory.
///
/// Unset optional fields mean "use the default"; the invariants the rest of
/// the pipeline relies on are established by [`normalized`]:
///
/// - `max_retries ∈ [0, 10]`
/// - `min_retry_delay >= 1s` and `max_retry_delay >= min_retry_delay`
/// - `max_bytes > 0` or `max_bytes == NO_LIMIT`
///
/// [`normalized`]: FetcherConfig::normalized
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Retry attempts after the first; `0` disables retrying.
    pub max_retries: u32,
    /// Backoff base. Zero means unset.
    pub min_retry_delay: Duration,
    /// Backoff ceiling. Zero means unset.
    pub max_retry_delay: Duration,
    /// Response size cap in bytes. [`NO_LIMIT`] removes the cap; zero
    /// normalizes to the 10 MiB default.
    pub max_bytes: i64,
    /// Per-attempt budget. `None` means the 30 s default; an explicit zero
    /// waits indefinitely.
    pub timeout: Option<Duration>,
    pub tls_handshake_timeout: Option<Duration>,
    /// `None` means unlimited.
    pub response_header_timeout: Option<Duration>,
    pub idle_conn_timeout: Option<Duration>,
    /// Proxy URL; [`NO_PROXY`](crate::NO_PROXY) disables environment
    /// proxies, `None` inherits them.
    pub proxy_url: Option<String>,
    /// `Some(0)` means unlimited. Part of transport identity; the pool
    /// cannot enforce a total cap.
    pub max_idle_conns: Option<u32>,
    /// `Some(0)` means unlimited.
    pub max_idle_conns_per_host: Option<u32>,
    /// `Some(0)` means unlimited. Part of transport identity only.
    pub max_conns_per_host: Option<u32>,
    pub max_redirects: Option<u32>,
    /// Candidate `User-Agent` values; empty means the package default list.
    pub user_agents: Vec<String>,
    /// Pick a User-Agent uniformly at random when the caller set none.
    pub enable_user_agent_randomization: bool,
    /// Statuses that pass validation; empty means `{200}`.
    pub allowed_status_codes: Vec<u16>,
    /// Media types that pass validation; empty disables MIME validation
    /// entirely (the layer is absent from the chain).
    pub allowed_mime_types: Vec<String>,
    /// Let responses without a `Content-Type` header pass MIME validation.
    pub allow_missing_content_type: bool,
    pub disable_status_code_validation: bool,
    pub disable_logging: bool,
    pub disable_transport_caching: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            min_retry_delay: Duration::ZERO,
            max_retry_delay: Duration::ZERO,
            max_bytes: 0,
            timeout: None,
            tls_handshake_timeout: None,
            response_header_timeout: None,
            idle_conn_timeout: None,
            proxy_url: None,
            max_idle_conns: None,
            max_idle_conns_per_host: None,
            max_conns_per_host: None,
            max_redirects: None,
            user_agents: Vec::new(),
            enable_user_agent_randomization: false,
            allowed_status_codes: Vec::new(),
            allowed_mime_types: Vec::new(),
            allow_missing_content_type: false,
            disable_status_code_validation: false,
            disable_logging: false,
            disable_transport_caching: false,
        }
    }
}

impl FetcherConfig {
    /// Applies defaults and clamps so the documented invariants hold.
    pub fn normalized(mut self) -> Self {
        self.max_retries = self.max_retries.min(MAX_RETRIES_CAP);
        if self.min_retry_delay < DEFAULT_MIN_RETRY_DELAY {
            self.min_retry_delay = DEFAULT_MIN_RETRY_DELAY;
        }
        if self.max_retry_delay.is_zero() {
            self.max_retry_delay = DEFAULT_MAX_RETRY_DELAY;
        }
        self.max_retry_delay = self.max_retry_delay.max(self.min_retry_delay);
        if self.max_bytes <= 0 && self.max_bytes != NO_LIMIT {
            self.max_bytes = DEFAULT_MAX_BODY_BYTES as i64;
        }
        self
    }

    /// The transport identity this configuration canonicalizes to.
    pub(crate) fn transport_key(&self) -> TransportKey {
        TransportKey {
            proxy: ProxySetting::from_config(self.proxy_url.as_deref()),
            max_idle_conns: self.max_idle_conns.unwrap_or(DEFAULT_MAX_IDLE_CONNS),
            max_idle_conns_per_host: self
                .max_idle_conns_per_host
                .unwrap_or(DEFAULT_MAX_IDLE_CONNS_PER_HOST),
            max_conns_per_host: self.max_conns_per_host.unwrap_or(0),
            tls_handshake_timeout: self
                .tls_handshake_timeout
                .unwrap_or(DEFAULT_TLS_HANDSHAKE_TIMEOUT),
            response_header_timeout: self.response_header_timeout.unwrap_or(Duration::ZERO),
            idle_conn_timeout: self.idle_conn_timeout.unwrap_or(DEFAULT_IDLE_CONN_TIMEOUT),
        }
    }

    /// The per-attempt budget handed to the raw fetcher. `None` waits
    /// indefinitely.
    pub(crate) fn effective_timeout(&self) -> Option<Duration> {
        match self.timeout {
            None => Some(DEFAULT_TIMEOUT),
            Some(d) if d.is_zero() => None,
            Some(d) => Some(d),
        }
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.min_retry_delay, self.max_retry_delay)
    }

    /// The resolved size cap; `None` when limiting is disabled. Call after
    /// [`normalized`](Self::normalized).
    pub(crate) fn resolved_max_bytes(&self) -> Option<u64> {
        if self.max_bytes == NO_LIMIT {
            None
        } else {
            Some(self.max_bytes.max(0) as u64)
        }
    }
}
