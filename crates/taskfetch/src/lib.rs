//! Composable HTTP fetch pipeline for crawling and ingestion workloads.
//!
//! A [`Fetcher`] is a stack of middleware wrapping raw HTTP execution, each
//! layer enforcing one concern. Data flows outer → inner through
//! **Logging → UserAgent → Retry → MimeType → StatusCode → SizeLimit →
//! Raw**; an error at any depth unwinds outward with every layer
//! guaranteeing body cleanup for partial responses.
//!
//! Beneath the stack, fetchers with identical network settings share one
//! transport (TCP/TLS connection pools) through a process-wide LRU cache.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use taskfetch::{CancellationToken, Fetcher};
//!
//! # async fn example() -> Result<(), taskfetch::FetchError> {
//! let fetcher = Fetcher::builder()
//!     .max_retries(3)
//!     .min_retry_delay(Duration::from_secs(1))
//!     .timeout(Duration::from_secs(20))
//!     .allowed_mime_types(["text/html", "application/xhtml+xml"])
//!     .user_agent_randomization()
//!     .build()?;
//!
//! let resp = taskfetch::get(&fetcher, CancellationToken::new(), "https://example.com/").await?;
//! let page = resp.bytes().await?;
//! # let _ = page;
//! # Ok(())
//! # }
//! ```
//!
//! On the success path the caller owns the response body and closes it by
//! dropping it. On every error path the failing layer has already drained
//! or closed the body.

mod builder;
mod config;
mod factory;
mod logging;
mod useragent;

pub use builder::FetcherBuilder;
pub use config::{FetcherConfig, DEFAULT_MAX_RETRY_DELAY, NO_LIMIT};
pub use logging::{Logging, LoggingLayer};
pub use useragent::{UserAgent, UserAgentLayer, DEFAULT_USER_AGENTS};

pub use taskfetch_core::{
    body, redact, CancellationToken, ErrorKind, FetchError, FetchRequest, FetchResponse,
    HttpStatusError, RequestBody, ResponseBody, COMPONENT,
};
pub use taskfetch_guard::DEFAULT_MAX_BODY_BYTES;
pub use taskfetch_retry::{RetryPolicy, DEFAULT_MIN_RETRY_DELAY, MAX_RETRIES_CAP};
pub use taskfetch_transport::{TransportCache, TransportKey, NO_PROXY};

use std::sync::Mutex;
use std::time::Duration;

use tower::ServiceExt;
use url::Url;

use crate::factory::FetchService;

/// A fully assembled fetch pipeline.
///
/// Cheap to share: any number of concurrent callers may invoke
/// [`fetch`](Fetcher::fetch) on one instance.
pub struct Fetcher {
    service: Mutex<FetchService>,
}

impl Fetcher {
    /// Starts a builder with all defaults.
    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::new()
    }

    /// Convenience constructor for the three settings almost every caller
    /// tunes; everything else starts at its default.
    pub fn new(max_retries: u32, min_retry_delay: Duration, max_bytes: i64) -> FetcherBuilder {
        FetcherBuilder::new()
            .max_retries(max_retries)
            .min_retry_delay(min_retry_delay)
            .max_bytes(max_bytes)
    }

    /// Builds a fetcher from a prepared configuration.
    pub fn from_config(config: FetcherConfig) -> Result<Fetcher, FetchError> {
        FetcherBuilder::from_config(config).build()
    }

    pub(crate) fn from_service(service: FetchService) -> Self {
        Self {
            service: Mutex::new(service),
        }
    }

    /// Runs one request through the pipeline.
    pub async fn fetch(&self, req: FetchRequest) -> Result<FetchResponse, FetchError> {
        let service = self.service.lock().unwrap().clone();
        service.oneshot(req).await
    }

    /// Releases the fetcher. Shared transports stay owned by the cache;
    /// an isolated transport's pools close once its last clone drops.
    pub fn close(self) {}
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").finish_non_exhaustive()
    }
}

/// Fetches `url` with a GET request under `cancel`.
pub async fn get(
    fetcher: &Fetcher,
    cancel: CancellationToken,
    url: &str,
) -> Result<FetchResponse, FetchError> {
    let url = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    fetcher
        .fetch(FetchRequest::get(url).with_cancellation(cancel))
        .await
}
