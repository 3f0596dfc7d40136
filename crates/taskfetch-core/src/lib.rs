//! Core types for the taskfetch HTTP fetch pipeline.
//!
//! This crate defines the vocabulary shared by every layer of the pipeline:
//!
//! - [`FetchRequest`] / [`FetchResponse`] — the request/response records that
//!   flow through the middleware chain. Responses carry a streaming
//!   [`ResponseBody`] that the consumer must drive (and which is closed by
//!   dropping it).
//! - [`FetchError`] / [`ErrorKind`] / [`HttpStatusError`] — the error
//!   taxonomy. Every HTTP-derived error carries a domain [`ErrorKind`] that
//!   the retry layer and callers match on.
//! - [`body`] — draining, snippet capture, and streaming size enforcement.
//! - [`redact`] — credential masking for URLs and headers. Nothing that
//!   enters a log line or an error message may contain credential material.
//!
//! Middleware crates build on these types as `tower::Service<FetchRequest>`
//! implementations; this crate itself has no service logic.

pub mod body;
pub mod error;
pub mod redact;

mod request;
mod response;

pub use body::ResponseBody;
pub use error::{BoxError, ErrorKind, FetchError, HttpStatusError};
pub use request::{AttemptBody, ByteStream, FetchRequest, RequestBody};
pub use response::FetchResponse;

// Re-exported so downstream crates agree on one cancellation primitive.
pub use tokio_util::sync::CancellationToken;

/// Log component attached to every structured event the pipeline emits.
pub const COMPONENT: &str = "task.fetcher";
