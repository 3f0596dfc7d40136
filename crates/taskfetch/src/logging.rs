//! Structured logging around an outer fetch.

use std::task::{Context, Poll};
use std::time::Instant;

use futures::future::BoxFuture;
use tower::{Layer, Service};

use taskfetch_core::{redact, FetchError, FetchRequest, FetchResponse, COMPONENT};

/// Emits one structured event per outer call: `debug` on success, `error`
/// on failure, with the request method, redacted URL, status, and elapsed
/// time. Credential material never reaches the log; the URL is redacted
/// here and status errors carry pre-redacted fields.
#[derive(Clone)]
pub struct Logging<S> {
    inner: S,
}

impl<S> Logging<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S> Service<FetchRequest> for Logging<S>
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
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let method = req.method().clone();
            let url = redact::url(req.url());
            let start = Instant::now();
            let result = inner.call(req).await;
            let duration = start.elapsed();

            match &result {
                Ok(resp) => {
                    tracing::debug!(
                        component = COMPONENT,
                        method = %method,
                        url = %url,
                        status = resp.status().canonical_reason().unwrap_or(""),
                        status_code = resp.status().as_u16(),
                        duration = ?duration,
                        "fetch completed"
                    );
                }
                Err(err) => {
                    if let Some(status) = err.status_error() {
                        tracing::error!(
                            component = COMPONENT,
                            method = %method,
                            url = %url,
                            status = %status.status,
                            status_code = status.status_code,
                            duration = ?duration,
                            error = %err,
                            "fetch failed"
                        );
                    } else {
                        tracing::error!(
                            component = COMPONENT,
                            method = %method,
                            url = %url,
                            duration = ?duration,
                            error = %err,
                            "fetch failed"
                        );
                    }
                }
            }
            result
        })
    }
}

/// A [`Layer`] applying [`Logging`].
#[derive(Debug, Clone, Default)]
pub struct LoggingLayer;

impl LoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging::new(inner)
    }
}
