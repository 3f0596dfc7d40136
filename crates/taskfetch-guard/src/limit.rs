use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Layer, Service};

use taskfetch_core::{FetchError, FetchRequest, FetchResponse};

/// Default response size cap: 10 MiB.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// Enforces a maximum response size.
///
/// The check is two-tiered: a response advertising `Content-Length` above
/// the cap fails immediately without reading; otherwise the body is armed
/// with a streaming cap so reader-side overruns fail deterministically.
#[derive(Clone)]
pub struct SizeLimit<S> {
    inner: S,
    limit: u64,
}

impl<S> SizeLimit<S> {
    pub fn new(inner: S, limit: u64) -> Self {
        Self { inner, limit }
    }
}

impl<S> Service<FetchRequest> for SizeLimit<S>
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
        let limit = self.limit;
        Box::pin(async move {
            let resp = inner.call(req).await?;
            if let Some(length) = resp.content_length() {
                if length > limit {
                    resp.drain().await;
                    return Err(FetchError::ResponseBodyTooLargeByContentLength { length, limit });
                }
            }
            Ok(resp.map_body(|b| b.with_limit(limit)))
        })
    }
}

/// A [`Layer`] applying [`SizeLimit`] with a fixed cap.
#[derive(Debug, Clone)]
pub struct SizeLimitLayer {
    limit: u64,
}

impl SizeLimitLayer {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

impl<S> Layer<S> for SizeLimitLayer {
    type Service = SizeLimit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SizeLimit::new(inner, self.limit)
    }
}
