//! `Retry-After` header interpretation (RFC 7231 §7.1.3).

use std::time::{Duration, SystemTime};

/// Parses a `Retry-After` value: either non-negative delta-seconds or an
/// HTTP-date. Past dates collapse to zero. Unparseable values yield `None`
/// and the caller falls back to computed backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    if let Ok(date) = httpdate::parse_http_date(value) {
        return Some(
            date.duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO),
        );
    }
    None
}
