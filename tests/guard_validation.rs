//! The validation middleware family composed the way the factory stacks
//! it — MimeType over StatusCode over SizeLimit — exercised end to end
//! over a mock delegate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use futures::StreamExt;
use http::{HeaderMap, HeaderValue, StatusCode};
use taskfetch_core::{ErrorKind, FetchError, FetchRequest, FetchResponse, ResponseBody};
use taskfetch_guard::{MimeValidatorLayer, SizeLimitLayer, StatusValidatorLayer};
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceExt};
use url::Url;

type Delegate = BoxCloneService<FetchRequest, FetchResponse, FetchError>;

fn target() -> Url {
    Url::parse("https://bot:pw@files.example.com/feed.json?api_key=k123").unwrap()
}

#[derive(Clone, Copy)]
struct MockResponse {
    status: u16,
    content_type: Option<&'static str>,
    content_length: Option<u64>,
    payload: &'static [u8],
}

/// Builds the mock response with a body that counts consumed bytes and
/// flags when its stream is dropped (closed).
fn build_response(
    mock: &MockResponse,
    read: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
) -> FetchResponse {
    struct CloseGuard(Arc<AtomicBool>);
    impl Drop for CloseGuard {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let guard = CloseGuard(closed);
    let body = stream::iter([Ok(Bytes::from_static(mock.payload))])
        .map(move |item: Result<Bytes, FetchError>| {
            if let Ok(b) = &item {
                read.fetch_add(b.len(), Ordering::SeqCst);
            }
            item
        })
        .chain(stream::poll_fn(move |_| {
            let _ = &guard;
            std::task::Poll::Ready(None)
        }));

    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::AUTHORIZATION,
        HeaderValue::from_static("Bearer abc"),
    );
    if let Some(ct) = mock.content_type {
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static(ct));
    }
    FetchResponse::new(
        StatusCode::from_u16(mock.status).unwrap(),
        headers,
        target(),
        mock.content_length,
        ResponseBody::new(body),
    )
}

/// MimeType over StatusCode over SizeLimit, the factory's guard order.
fn guard_stack(
    mock: MockResponse,
    limit: u64,
    read: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
) -> Delegate {
    let delegate = BoxCloneService::new(tower::service_fn(move |_req: FetchRequest| {
        let resp = build_response(&mock, Arc::clone(&read), Arc::clone(&closed));
        async move { Ok::<_, FetchError>(resp) }
    }));
    let svc = SizeLimitLayer::new(limit).layer(delegate);
    let svc = StatusValidatorLayer::new([200]).layer(svc);
    BoxCloneService::new(
        MimeValidatorLayer::new(["application/json"])
            .layer(svc),
    )
}

async fn run(stack: &mut Delegate) -> Result<FetchResponse, FetchError> {
    stack
        .ready()
        .await
        .unwrap()
        .call(FetchRequest::get(target()))
        .await
}

#[tokio::test]
async fn conforming_response_passes_all_three_guards() {
    let read = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicBool::new(false));
    let mut stack = guard_stack(
        MockResponse {
            status: 200,
            content_type: Some("application/json; charset=utf-8"),
            content_length: Some(12),
            payload: br#"{"items":[]}"#,
        },
        1000,
        Arc::clone(&read),
        Arc::clone(&closed),
    );

    let resp = run(&mut stack).await.unwrap();
    assert_eq!(&resp.bytes().await.unwrap()[..], br#"{"items":[]}"#);
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn advertised_length_above_the_cap_fails_without_reading() {
    let read = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicBool::new(false));
    let mut stack = guard_stack(
        MockResponse {
            status: 200,
            content_type: Some("application/json"),
            content_length: Some(20_000_000),
            payload: b"never read",
        },
        10_485_760,
        Arc::clone(&read),
        Arc::clone(&closed),
    );

    let err = run(&mut stack).await.unwrap_err();
    match err {
        FetchError::ResponseBodyTooLargeByContentLength { length, limit } => {
            assert_eq!(length, 20_000_000);
            assert_eq!(limit, 10_485_760);
        }
        other => panic!("unexpected error {other:?}"),
    }
    // The payload never reaches the caller; the guard drained and closed it.
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn streaming_overrun_surfaces_while_reading() {
    let payload: &'static [u8] = Box::leak(vec![b'x'; 2000].into_boxed_slice());
    let read = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicBool::new(false));
    let mut stack = guard_stack(
        MockResponse {
            status: 200,
            content_type: Some("application/json"),
            content_length: None,
            payload,
        },
        1000,
        Arc::clone(&read),
        Arc::clone(&closed),
    );

    // The response itself is delivered; the cap trips on the reader side.
    let resp = run(&mut stack).await.unwrap();
    let err = resp.bytes().await.unwrap_err();
    assert!(matches!(
        err,
        FetchError::ResponseBodyTooLarge { limit: 1000 }
    ));
}

#[tokio::test]
async fn rejected_status_is_classified_redacted_and_snippeted() {
    let read = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicBool::new(false));
    let mut stack = guard_stack(
        MockResponse {
            status: 404,
            content_type: Some("text/html"),
            content_length: None,
            payload: b"<html>gone</html>",
        },
        1000,
        Arc::clone(&read),
        Arc::clone(&closed),
    );

    let mut err = run(&mut stack).await.unwrap_err();
    let status = err.status_error().expect("status error");
    assert_eq!(status.status_code, 404);
    assert_eq!(status.kind, ErrorKind::NotFound);
    assert_eq!(status.body_snippet, "<html>gone</html>");
    assert!(!status.url.contains("pw"));
    assert!(!status.url.contains("k123"));
    assert_eq!(status.headers[http::header::AUTHORIZATION], "***");

    // The mime layer drained the reconstructed body on the way out.
    assert!(err.take_response_body().is_none());
    assert_eq!(read.load(Ordering::SeqCst), b"<html>gone</html>".len());
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn wrong_media_type_is_rejected_and_drained() {
    let read = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicBool::new(false));
    let mut stack = guard_stack(
        MockResponse {
            status: 200,
            content_type: Some("application/json-seq"),
            content_length: None,
            payload: b"not quite json",
        },
        1000,
        Arc::clone(&read),
        Arc::clone(&closed),
    );

    let err = run(&mut stack).await.unwrap_err();
    assert!(matches!(
        err,
        FetchError::UnsupportedMediaType { ref content_type } if content_type == "application/json-seq"
    ));
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn missing_content_type_is_rejected() {
    let read = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicBool::new(false));
    let mut stack = guard_stack(
        MockResponse {
            status: 200,
            content_type: None,
            content_length: None,
            payload: b"mystery bytes",
        },
        1000,
        Arc::clone(&read),
        Arc::clone(&closed),
    );

    let err = run(&mut stack).await.unwrap_err();
    assert!(matches!(err, FetchError::MissingResponseContentType));
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn missing_content_type_can_be_allowed_through() {
    let delegate = BoxCloneService::new(tower::service_fn(move |_req: FetchRequest| async move {
        Ok::<_, FetchError>(FetchResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            target(),
            None,
            ResponseBody::from_bytes(Bytes::from_static(b"raw")),
        ))
    }));
    let svc = SizeLimitLayer::new(1000).layer(delegate);
    let svc = StatusValidatorLayer::new([200]).layer(svc);
    let mut stack = BoxCloneService::new(
        MimeValidatorLayer::new(["application/json"])
            .allow_missing_content_type(true)
            .layer(svc),
    );

    let resp = run(&mut stack).await.unwrap();
    assert_eq!(&resp.bytes().await.unwrap()[..], b"raw");
}

#[tokio::test]
async fn status_allowlist_extends_beyond_200() {
    let delegate = BoxCloneService::new(tower::service_fn(move |_req: FetchRequest| async move {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok::<_, FetchError>(FetchResponse::new(
            StatusCode::NOT_FOUND,
            headers,
            target(),
            None,
            ResponseBody::from_bytes(Bytes::from_static(b"null")),
        ))
    }));
    let svc = SizeLimitLayer::new(1000).layer(delegate);
    let svc = StatusValidatorLayer::new([200, 404]).layer(svc);
    let mut stack = BoxCloneService::new(MimeValidatorLayer::new(["application/json"]).layer(svc));

    // A 404 enumerated in the allowlist flows through like a success.
    let resp = run(&mut stack).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(&resp.bytes().await.unwrap()[..], b"null");
}
