//! Retriability classification.

use http::Method;
use taskfetch_core::{ErrorKind, FetchError};

/// Whether `err` is worth another attempt. Rules apply in order; the first
/// match wins. Unknown errors retry — a transient network failure is the
/// common case in a crawl, so the default is conservative-retry.
pub fn is_retriable(err: &FetchError) -> bool {
    match err {
        // Explicit caller cancellation is always terminal.
        FetchError::Canceled => false,
        FetchError::TooManyRedirects(_)
        | FetchError::InvalidUrl { .. }
        | FetchError::UnsupportedScheme { .. } => false,
        FetchError::Certificate { .. } => false,
        FetchError::Network { timeout: true, .. } => true,
        // 501/505/511 are Unavailable by status classification but
        // permanent in practice.
        FetchError::Status(e)
            if e.kind == ErrorKind::Unavailable && matches!(e.status_code, 501 | 505 | 511) =>
        {
            false
        }
        err if err.kind() == ErrorKind::Unavailable => true,
        err if matches!(
            err.kind(),
            ErrorKind::ExecutionFailed
                | ErrorKind::InvalidInput
                | ErrorKind::Forbidden
                | ErrorKind::NotFound
        ) =>
        {
            false
        }
        _ => true,
    }
}

/// Whether a status observed on a *successful* delegate response (one that
/// passed, or never went through, validation) warrants a retry: 408/429
/// and 5xx, minus the permanent 501/505/511.
pub fn should_retry_status(status: u16) -> bool {
    match status {
        408 | 429 => true,
        501 | 505 | 511 => false,
        s => (500..=599).contains(&s),
    }
}

/// Idempotent methods per RFC 7231 §4.2.2.
pub fn is_idempotent(method: &Method) -> bool {
    *method == Method::GET
        || *method == Method::HEAD
        || *method == Method::OPTIONS
        || *method == Method::TRACE
        || *method == Method::PUT
        || *method == Method::DELETE
}
