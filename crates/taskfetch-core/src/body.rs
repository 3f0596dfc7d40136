//! Response body streaming, draining, snippet capture, and size enforcement.
//!
//! Connection reuse requires a body to be consumed before the connection can
//! return to the pool, but an abandoned body must never be read without
//! bound. [`ResponseBody::drain`] reads at most [`MAX_DRAIN_BYTES`] and then
//! drops the body, deliberately forfeiting reuse for oversized leftovers.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::error::FetchError;

/// Cap on bytes read while draining a body before close. Beyond this the
/// connection is forfeited instead of reused.
pub const MAX_DRAIN_BYTES: u64 = 64 * 1024;

/// Cap on the leading bytes captured for diagnostics snippets.
pub const SNIPPET_MAX_BYTES: usize = 4 * 1024;

type Chunks = BoxStream<'static, Result<Bytes, FetchError>>;

/// Streaming response payload.
///
/// The body is closed by dropping it. Reads go through [`chunk`]; when a
/// size cap has been armed with [`with_limit`], any read that would exceed
/// the cumulative cap fails with [`FetchError::ResponseBodyTooLarge`], and
/// keeps failing on every subsequent read.
///
/// [`chunk`]: ResponseBody::chunk
/// [`with_limit`]: ResponseBody::with_limit
pub struct ResponseBody {
    stream: Chunks,
    limit: Option<SizeLimit>,
}

struct SizeLimit {
    limit: u64,
    seen: u64,
    tripped: bool,
}

impl ResponseBody {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, FetchError>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
            limit: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(stream::empty())
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Self::empty()
        } else {
            Self::new(stream::iter([Ok(bytes)]))
        }
    }

    /// Arms the streaming size cap. Reads past `limit` cumulative bytes
    /// fail deterministically, regardless of what `Content-Length` claimed.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(SizeLimit {
            limit,
            seen: 0,
            tripped: false,
        });
        self
    }

    /// The next chunk of the body, or `None` at the end of the stream.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, FetchError> {
        if let Some(limit) = &self.limit {
            if limit.tripped {
                return Err(FetchError::ResponseBodyTooLarge { limit: limit.limit });
            }
        }
        let next = match self.stream.next().await {
            Some(item) => Some(item?),
            None => None,
        };
        if let (Some(chunk), Some(limit)) = (&next, &mut self.limit) {
            limit.seen += chunk.len() as u64;
            if limit.seen > limit.limit {
                limit.tripped = true;
                return Err(FetchError::ResponseBodyTooLarge { limit: limit.limit });
            }
        }
        Ok(next)
    }

    /// Collects the remaining body into one buffer, still subject to any
    /// armed size cap.
    pub async fn bytes(mut self) -> Result<Bytes, FetchError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Reads body chunks until at least [`SNIPPET_MAX_BYTES`] have been
    /// collected or the stream ends, and returns everything read. Read
    /// errors end the peek early; the capture is best effort.
    pub async fn peek_leading(&mut self) -> Bytes {
        let mut buf = BytesMut::new();
        while buf.len() < SNIPPET_MAX_BYTES {
            match self.chunk().await {
                Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
                Ok(None) | Err(_) => break,
            }
        }
        buf.freeze()
    }

    /// Splices already-read bytes back in front of the remaining stream, so
    /// a downstream consumer still observes the complete body. Bytes pushed
    /// back no longer count against an armed size cap.
    pub fn prepend(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        if let Some(limit) = &mut self.limit {
            limit.seen = limit.seen.saturating_sub(bytes.len() as u64);
        }
        let rest = std::mem::replace(&mut self.stream, Box::pin(stream::empty()));
        self.stream = Box::pin(stream::iter([Ok(bytes)]).chain(rest));
    }

    /// Reads and discards up to [`MAX_DRAIN_BYTES`], then drops the body.
    /// Read errors are swallowed; this is best-effort cleanup.
    pub async fn drain(mut self) {
        let mut seen = 0u64;
        while seen < MAX_DRAIN_BYTES {
            match self.stream.next().await {
                Some(Ok(chunk)) => seen += chunk.len() as u64,
                Some(Err(_)) | None => break,
            }
        }
    }
}

/// Derives the diagnostics snippet from leading body bytes: at most
/// [`SNIPPET_MAX_BYTES`], lossily decoded.
pub fn snippet_from(leading: &Bytes) -> String {
    let cut = leading.len().min(SNIPPET_MAX_BYTES);
    String::from_utf8_lossy(&leading[..cut]).into_owned()
}
