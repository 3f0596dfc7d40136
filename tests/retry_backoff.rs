//! Backoff timing through the retry layer: exponential envelope growth,
//! the configured ceiling, jitter variance, and `Retry-After` overrides.
//!
//! Timestamps are captured per delegate invocation under paused tokio
//! time, so each gap is exactly the delay the retry layer slept.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{HeaderMap, HeaderValue, StatusCode};
use taskfetch_core::{FetchError, FetchRequest, FetchResponse, ResponseBody};
use taskfetch_retry::{RetryLayer, RetryPolicy};
use tokio::time::Instant;
use tower::{service_fn, Layer, Service, ServiceExt};
use url::Url;

fn target() -> Url {
    Url::parse("https://api.example.com/feed").unwrap()
}

fn response(status: u16, headers: HeaderMap) -> FetchResponse {
    FetchResponse::new(
        StatusCode::from_u16(status).unwrap(),
        headers,
        target(),
        None,
        ResponseBody::empty(),
    )
}

/// Runs an always-`status` delegate under the given policy and returns the
/// delegate invocation instants.
async fn attempt_instants(
    policy: RetryPolicy,
    status: u16,
    retry_after: Option<&'static str>,
) -> Vec<Instant> {
    let timestamps = Arc::new(Mutex::new(Vec::new()));
    let ts = Arc::clone(&timestamps);
    let delegate = service_fn(move |_req: FetchRequest| {
        let ts = Arc::clone(&ts);
        async move {
            ts.lock().unwrap().push(Instant::now());
            let mut headers = HeaderMap::new();
            if let Some(ra) = retry_after {
                headers.insert(http::header::RETRY_AFTER, HeaderValue::from_static(ra));
            }
            Ok::<_, FetchError>(response(status, headers))
        }
    });

    let mut service = RetryLayer::new(policy).layer(delegate);
    let _ = service
        .ready()
        .await
        .unwrap()
        .call(FetchRequest::get(target()))
        .await;

    let times = timestamps.lock().unwrap().clone();
    times
}

#[tokio::test(start_paused = true)]
async fn waits_follow_the_exponential_envelope() {
    let policy = RetryPolicy::new(4, Duration::from_secs(1), Duration::from_secs(60));
    let times = attempt_instants(policy, 503, None).await;
    assert_eq!(times.len(), 5);

    // Wait i is a full-jitter sample from [0, 1s * 2^(i-1)], with sub-1ms
    // samples raised to the 1s base.
    for i in 1..times.len() {
        let gap = times[i].duration_since(times[i - 1]);
        let envelope = Duration::from_secs(1 << (i - 1));
        assert!(
            gap <= envelope,
            "wait {i} was {gap:?}, above its {envelope:?} envelope"
        );
        assert!(
            gap >= Duration::from_millis(1),
            "wait {i} collapsed below the 1ms floor: {gap:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn ceiling_caps_every_wait() {
    let policy = RetryPolicy::new(6, Duration::from_secs(2), Duration::from_secs(3));
    let times = attempt_instants(policy, 503, None).await;
    assert_eq!(times.len(), 7);

    // From the second retry on, the deterministic delay (2s * 2^(i-1))
    // would exceed the 3s ceiling; every sample must still sit under it.
    for i in 1..times.len() {
        let gap = times[i].duration_since(times[i - 1]);
        assert!(gap <= Duration::from_secs(3), "wait {i} was {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn jitter_varies_across_runs() {
    let policy = RetryPolicy::new(1, Duration::from_secs(10), Duration::from_secs(30));

    let mut first_waits = Vec::new();
    for _ in 0..8 {
        let times = attempt_instants(policy.clone(), 503, None).await;
        assert_eq!(times.len(), 2);
        first_waits.push(times[1].duration_since(times[0]));
    }
    first_waits.sort();
    first_waits.dedup();
    assert!(
        first_waits.len() > 1,
        "full jitter produced a constant wait sequence"
    );
}

#[tokio::test(start_paused = true)]
async fn retry_after_replaces_the_computed_backoff() {
    let policy = RetryPolicy::new(2, Duration::from_secs(5), Duration::from_secs(30));
    let times = attempt_instants(policy, 429, Some("3")).await;
    assert_eq!(times.len(), 3);

    // The server-requested 3s wins over the 5s backoff base, exactly and
    // without jitter, on every retry.
    for i in 1..times.len() {
        let gap = times[i].duration_since(times[i - 1]);
        assert_eq!(gap, Duration::from_secs(3), "wait {i} was {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn retry_after_zero_retries_immediately() {
    let policy = RetryPolicy::new(2, Duration::from_secs(5), Duration::from_secs(30));
    let times = attempt_instants(policy, 503, Some("0")).await;
    assert_eq!(times.len(), 3);

    for i in 1..times.len() {
        assert_eq!(times[i].duration_since(times[i - 1]), Duration::ZERO);
    }
}

#[tokio::test(start_paused = true)]
async fn single_retry_budget_sleeps_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let delegate = service_fn(move |_req: FetchRequest| {
        let c = Arc::clone(&c);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FetchError>(response(503, HeaderMap::new()))
        }
    });

    let policy = RetryPolicy::new(1, Duration::from_secs(1), Duration::from_secs(30));
    let mut service = RetryLayer::new(policy).layer(delegate);

    let start = Instant::now();
    let _ = service
        .ready()
        .await
        .unwrap()
        .call(FetchRequest::get(target()))
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() <= Duration::from_secs(1));
}
