//! Retry middleware for the taskfetch pipeline.
//!
//! Wraps a delegate fetcher and re-runs failed attempts under an
//! exponential-backoff-with-full-jitter schedule:
//!
//! - **Idempotency gating**: POST and PATCH are never retried; a request
//!   whose body has no restart mechanism is demoted to one attempt (with a
//!   warning), because an arbitrary stream can only be sent once.
//! - **`Retry-After` honoring**: a parseable server-supplied delay replaces
//!   the computed backoff. A delay above the configured ceiling abandons the
//!   retry entirely — the middleware may not retry more aggressively than
//!   the server asked, nor wait longer than the caller allowed.
//! - **Cancellation-aware sleeps**: the backoff timer races the request's
//!   cancellation token and the token always wins.
//! - **Body discipline**: every non-final failed response is drained before
//!   the next attempt so its connection can return to the pool.
//!
//! Which failures are retriable is decided by [`is_retriable`]; statuses
//! observed on successful (unvalidated) responses by
//! [`should_retry_status`]. The two must agree, and the predicate is
//! authoritative.

mod backoff;
mod classify;
mod config;
mod layer;
mod retry_after;

pub use backoff::{backoff_delay, exponential_delay, full_jitter};
pub use classify::{is_idempotent, is_retriable, should_retry_status};
pub use config::{
    RetryPolicy, DEFAULT_MAX_RETRY_DELAY, DEFAULT_MIN_RETRY_DELAY, MAX_RETRIES_CAP,
};
pub use layer::RetryLayer;
pub use retry_after::parse_retry_after;

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use http::header::RETRY_AFTER;
use tower::Service;

use taskfetch_core::body::snippet_from;
use taskfetch_core::{redact, FetchError, FetchRequest, FetchResponse, HttpStatusError, COMPONENT};

/// A fetcher that retries its delegate according to a [`RetryPolicy`].
pub struct Retry<S> {
    inner: S,
    policy: Arc<RetryPolicy>,
}

impl<S> Retry<S> {
    pub fn new(inner: S, policy: Arc<RetryPolicy>) -> Self {
        Self { inner, policy }
    }
}

impl<S: Clone> Clone for Retry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<S> Service<FetchRequest> for Retry<S>
where
    S: Service<FetchRequest, Response = FetchResponse, Error = FetchError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = FetchResponse;
    type Error = FetchError;
    type Future = BoxFuture<'static, Result<FetchResponse, FetchError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: FetchRequest) -> Self::Future {
        let service = self.inner.clone();
        let policy = Arc::clone(&self.policy);
        Box::pin(run(service, policy, req))
    }
}

async fn run<S>(
    mut service: S,
    policy: Arc<RetryPolicy>,
    req: FetchRequest,
) -> Result<FetchResponse, FetchError>
where
    S: Service<FetchRequest, Response = FetchResponse, Error = FetchError>,
{
    let max_retries = effective_max_retries(&policy, &req);
    let cancel = req.cancellation().clone();
    let url = req.url().clone();

    let mut attempt: u32 = 0;
    let mut retry_after: Option<String> = None;
    let mut retry_reason = String::new();

    loop {
        if attempt > 0 {
            let delay = next_delay(&policy, attempt, retry_after.as_deref())?;
            tracing::debug!(
                component = COMPONENT,
                url = %redact::url(&url),
                retry = attempt,
                max_retries,
                remaining_retries = max_retries - attempt,
                delay = ?delay,
                retry_reason = %retry_reason,
                retry_after_header = retry_after.as_deref().unwrap_or(""),
                "waiting before retry"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Canceled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // The request is cloned per attempt; a fresh body stream is
        // produced by the body's restart mechanism at send time.
        match service.call(req.clone()).await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if !should_retry_status(status) {
                    return Ok(resp);
                }
                if attempt >= max_retries {
                    return Err(exhausted_status_error(resp).await);
                }
                retry_after = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                retry_reason = format!("retriable status {status}");
                resp.drain().await;
            }
            Err(mut err) => {
                if err.is_cancellation() {
                    return Err(err);
                }
                if !is_retriable(&err) {
                    return Err(err);
                }
                retry_after = err
                    .status_error()
                    .and_then(|e| e.retry_after())
                    .map(String::from);
                retry_reason = err.to_string();
                // Retriable failures never carry their body onward, final
                // attempt included; the snippet on the error survives.
                if let Some(body) = err.take_response_body() {
                    body.drain().await;
                }
                if attempt >= max_retries {
                    return Err(FetchError::MaxRetriesExceeded {
                        source: Some(Box::new(err)),
                    });
                }
            }
        }
        attempt += 1;
    }
}

/// The retry count this request actually gets.
///
/// Non-idempotent methods and bodies without a restart mechanism force the
/// count to zero regardless of the policy; the latter is logged because it
/// silently downgrades a configured behavior.
fn effective_max_retries(policy: &RetryPolicy, req: &FetchRequest) -> u32 {
    if policy.max_retries == 0 {
        return 0;
    }
    if !is_idempotent(req.method()) {
        return 0;
    }
    if req.body().map_or(false, |b| !b.is_replayable()) {
        tracing::warn!(
            component = COMPONENT,
            url = %redact::url(req.url()),
            method = %req.method(),
            max_retries = policy.max_retries,
            "request body has no restart mechanism; retries disabled"
        );
        return 0;
    }
    policy.max_retries
}

/// The wait before retry `attempt`: the server's `Retry-After` when present
/// and parseable (zero allowed; above the ceiling aborts the retry), else
/// jittered exponential backoff.
fn next_delay(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<&str>,
) -> Result<Duration, FetchError> {
    if let Some(parsed) = retry_after.and_then(parse_retry_after) {
        if parsed > policy.max_delay {
            return Err(FetchError::RetryAfterExceeded {
                requested: parsed,
                max: policy.max_delay,
            });
        }
        return Ok(parsed);
    }
    Ok(backoff_delay(attempt, policy.min_delay, policy.max_delay))
}

/// Final-attempt error for a purely status-based failure: an
/// [`HttpStatusError`] reflecting the last response, caused by retry
/// exhaustion.
async fn exhausted_status_error(mut resp: FetchResponse) -> FetchError {
    let leading = resp.body_mut().peek_leading().await;
    let snippet = snippet_from(&leading);
    let err = HttpStatusError::new(resp.status(), resp.url(), resp.headers(), snippet)
        .with_cause(FetchError::MaxRetriesExceeded { source: None });
    resp.drain().await;
    err.into()
}
