//! Response validation middleware for the taskfetch pipeline.
//!
//! Three guards, each one `tower::Service` wrapping a delegate:
//!
//! - [`SizeLimit`] rejects oversized responses, first by advertised
//!   `Content-Length` and then by arming a streaming cap on the body, which
//!   defends against missing or lying length headers.
//! - [`StatusValidator`] rejects statuses outside an allowlist, capturing a
//!   body snippet into a structured [`HttpStatusError`].
//! - [`MimeValidator`] rejects responses whose `Content-Type` essence is
//!   not in an allowlist (exact match, case-insensitive).
//!
//! Every guard owns the body of any response it rejects: on each error path
//! the body has been drained (or handed off inside the error) before the
//! error surfaces.
//!
//! [`HttpStatusError`]: taskfetch_core::HttpStatusError

mod limit;
mod mime_type;
mod status;

pub use limit::{SizeLimit, SizeLimitLayer, DEFAULT_MAX_BODY_BYTES};
pub use mime_type::{media_type, MimeValidator, MimeValidatorLayer};
pub use status::{StatusValidator, StatusValidatorLayer};
