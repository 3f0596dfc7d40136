use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use url::Url;

use crate::body::ResponseBody;
use crate::error::FetchError;

/// A fetched HTTP response.
///
/// The body is streaming: the consumer of a successful outer fetch owns it
/// and closes it by dropping it. On every error path the layer returning
/// the error has already drained or closed the body.
pub struct FetchResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    content_length: Option<u64>,
    body: ResponseBody,
}

impl FetchResponse {
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        url: Url,
        content_length: Option<u64>,
        body: ResponseBody,
    ) -> Self {
        Self {
            status,
            headers,
            url,
            content_length,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The final URL of the response, after any redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Advertised `Content-Length`, if the response carried one.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// The `Content-Type` header as a string, if present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Applies `f` to the body in place.
    pub fn map_body(mut self, f: impl FnOnce(ResponseBody) -> ResponseBody) -> Self {
        let body = std::mem::replace(&mut self.body, ResponseBody::empty());
        self.body = f(body);
        self
    }

    /// Collects the remaining body, consuming the response.
    pub async fn bytes(self) -> Result<Bytes, FetchError> {
        self.body.bytes().await
    }

    /// Reads and discards up to the drain cap, then closes the body.
    pub async fn drain(self) {
        self.body.drain().await;
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("content_length", &self.content_length)
            .finish()
    }
}
