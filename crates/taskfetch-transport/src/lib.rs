//! Transport construction, sharing, and raw HTTP execution.
//!
//! A *transport* is a [`reqwest::Client`]: the TCP/TLS connection pools plus
//! the network settings baked into them. Building one is comparatively
//! expensive and every distinct client fragments the pool, so fetchers with
//! identical network parameters share one via the process-wide
//! [`TransportCache`], keyed by [`TransportKey`].
//!
//! [`RawFetcher`] executes a single request attempt on a transport: default
//! header injection, the redirect chain (clients are built with redirects
//! disabled so a pooled client can serve fetchers with different redirect
//! caps), per-attempt timeout, and cancellation.

mod cache;
mod key;
mod raw;

pub use cache::{TransportCache, MAX_CACHED_TRANSPORTS};
pub use key::{
    isolated_transport, isolated_transport_with_jar, ProxySetting, TransportKey,
    DEFAULT_IDLE_CONN_TIMEOUT, DEFAULT_MAX_IDLE_CONNS, DEFAULT_MAX_IDLE_CONNS_PER_HOST,
    DEFAULT_TLS_HANDSHAKE_TIMEOUT, NO_PROXY,
};
pub use raw::{RawFetcher, DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT};
