use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Layer, Service};

use taskfetch_core::body::snippet_from;
use taskfetch_core::{FetchError, FetchRequest, FetchResponse, HttpStatusError};

/// Validates response statuses against an allowlist.
///
/// A rejected response becomes a structured [`HttpStatusError`]: redacted
/// URL and headers, a body snippet of at most 4 KiB, and the domain kind
/// the status classifies to. In the default *reconstruct* mode the snippet
/// bytes are spliced back in front of the remaining stream and the whole
/// body rides along on the error, so a downstream owner can still read it
/// in full; in drain mode the middleware consumes the body itself. Either
/// way the caller must not close anything.
#[derive(Clone)]
pub struct StatusValidator<S> {
    inner: S,
    allowed: Arc<HashSet<u16>>,
    reconstruct: bool,
}

impl<S> StatusValidator<S> {
    pub fn new(inner: S, allowed: Arc<HashSet<u16>>, reconstruct: bool) -> Self {
        Self {
            inner,
            allowed,
            reconstruct,
        }
    }
}

impl<S> Service<FetchRequest> for StatusValidator<S>
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
        let allowed = Arc::clone(&self.allowed);
        let reconstruct = self.reconstruct;
        Box::pin(async move {
            let mut resp = inner.call(req).await?;
            if allowed.contains(&resp.status().as_u16()) {
                return Ok(resp);
            }

            let leading = resp.body_mut().peek_leading().await;
            let snippet = snippet_from(&leading);
            let err = HttpStatusError::new(resp.status(), resp.url(), resp.headers(), snippet);
            if reconstruct {
                let mut body = resp.into_body();
                body.prepend(leading);
                Err(err.with_body(body).into())
            } else {
                resp.drain().await;
                Err(err.into())
            }
        })
    }
}

/// A [`Layer`] applying [`StatusValidator`].
///
/// An empty allowlist resolves to `{200}`: validation without enumerated
/// codes means "only OK passes", not "everything passes".
#[derive(Debug, Clone)]
pub struct StatusValidatorLayer {
    allowed: Arc<HashSet<u16>>,
    reconstruct: bool,
}

impl StatusValidatorLayer {
    /// The default, body-reconstructing variant.
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            allowed: Arc::new(Self::resolve(codes)),
            reconstruct: true,
        }
    }

    /// The draining variant: rejected bodies are consumed immediately.
    pub fn without_reconstruct(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            allowed: Arc::new(Self::resolve(codes)),
            reconstruct: false,
        }
    }

    fn resolve(codes: impl IntoIterator<Item = u16>) -> HashSet<u16> {
        let set: HashSet<u16> = codes.into_iter().collect();
        if set.is_empty() {
            HashSet::from([200])
        } else {
            set
        }
    }
}

impl<S> Layer<S> for StatusValidatorLayer {
    type Service = StatusValidator<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StatusValidator::new(inner, Arc::clone(&self.allowed), self.reconstruct)
    }
}
