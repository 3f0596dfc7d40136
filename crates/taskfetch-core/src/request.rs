use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::stream::BoxStream;
use http::{HeaderMap, Method};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{BoxError, FetchError};

/// Streaming request payload as produced for one attempt.
pub type ByteStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// A single fetch request flowing through the middleware chain.
///
/// Requests are cheap to clone: the body is either buffered bytes or a
/// shared handle, and the headers are copied. Middleware never mutates the
/// caller's request — each layer that needs changes clones first.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<RequestBody>,
    cancel: CancellationToken,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A GET request for `url`.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A HEAD request for `url`.
    pub fn head(url: Url) -> Self {
        Self::new(Method::HEAD, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn with_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Replaces the body in place. Used by the retry layer when restoring a
    /// fresh stream on a cloned request.
    pub fn set_body(&mut self, body: Option<RequestBody>) {
        self.body = body;
    }

    /// The cancellation token every waiting primitive in the pipeline
    /// observes. Defaults to a token that never fires.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Request payload with an optional restart mechanism.
///
/// Retrying a request means sending its body again. [`RequestBody::Bytes`]
/// replays trivially and [`RequestBody::Provider`] produces a fresh stream
/// per attempt; a bare [`RequestBody::Stream`] cannot be replayed, so the
/// retry layer demotes such requests to a single attempt.
#[derive(Clone)]
pub enum RequestBody {
    /// Fully buffered payload, replayable on every attempt.
    Bytes(Bytes),
    /// Restart mechanism: invoked once per attempt for a fresh stream.
    Provider(Arc<dyn Fn() -> Result<ByteStream, BoxError> + Send + Sync>),
    /// One-shot stream. The first attempt consumes it.
    Stream(Arc<Mutex<Option<ByteStream>>>),
}

impl RequestBody {
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        RequestBody::Bytes(bytes.into())
    }

    pub fn from_provider<F>(provider: F) -> Self
    where
        F: Fn() -> Result<ByteStream, BoxError> + Send + Sync + 'static,
    {
        RequestBody::Provider(Arc::new(provider))
    }

    pub fn from_stream(stream: ByteStream) -> Self {
        RequestBody::Stream(Arc::new(Mutex::new(Some(stream))))
    }

    /// Whether the payload can be produced again for another attempt.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, RequestBody::Stream(_))
    }

    /// Produces the payload for one attempt.
    pub fn for_attempt(&self) -> Result<AttemptBody, FetchError> {
        match self {
            RequestBody::Bytes(b) => Ok(AttemptBody::Bytes(b.clone())),
            RequestBody::Provider(f) => f()
                .map(AttemptBody::Stream)
                .map_err(|source| FetchError::GetBodyFailed { source }),
            RequestBody::Stream(slot) => slot
                .lock()
                .unwrap()
                .take()
                .map(AttemptBody::Stream)
                .ok_or(FetchError::BodyConsumed),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            RequestBody::Provider(_) => f.write_str("Provider"),
            RequestBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// The concrete payload handed to the transport for one attempt.
pub enum AttemptBody {
    Bytes(Bytes),
    Stream(ByteStream),
}
