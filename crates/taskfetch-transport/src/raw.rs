//! Single-shot HTTP execution on a configured transport.

use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use http::header::{
    HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_LENGTH, COOKIE, LOCATION,
    PROXY_AUTHORIZATION, REFERER, USER_AGENT,
};
use http::{HeaderMap, Method};
use reqwest::Client;
use tower::Service;
use url::Url;

use taskfetch_core::{
    redact, AttemptBody, FetchError, FetchRequest, FetchResponse, ResponseBody,
};

/// Default per-attempt budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default redirect cap.
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Used when no User-Agent layer sits above and the caller set none.
const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Executes one request attempt against the configured transport.
///
/// The transport is built with redirects disabled; this fetcher follows the
/// redirect chain itself, setting `Referer` on each hop (user-info
/// stripped, RFC 7231 §5.5.2) and rewriting methods the way interactive
/// clients do: 301/302/303 become GET (HEAD is preserved) and drop the
/// body, 307/308 replay method and body. Credential headers are not
/// forwarded across hosts.
///
/// The request is never mutated; headers are copied per hop with `Accept`,
/// `Accept-Language`, and `User-Agent` defaults injected only when unset.
#[derive(Clone)]
pub struct RawFetcher {
    client: Client,
    /// Per-attempt budget covering the whole redirect chain. `None` waits
    /// indefinitely.
    timeout: Option<Duration>,
    max_redirects: u32,
}

impl RawFetcher {
    pub fn new(client: Client, timeout: Option<Duration>, max_redirects: u32) -> Self {
        Self {
            client,
            timeout,
            max_redirects,
        }
    }

    async fn execute(self, req: FetchRequest) -> Result<FetchResponse, FetchError> {
        let cancel = req.cancellation().clone();
        let guarded = async {
            tokio::select! {
                _ = cancel.cancelled() => Err(FetchError::Canceled),
                res = self.follow(&req) => res,
            }
        };
        match self.timeout {
            Some(budget) => match tokio::time::timeout(budget, guarded).await {
                Ok(res) => res,
                Err(elapsed) => Err(FetchError::Network {
                    source: Box::new(elapsed),
                    timeout: true,
                }),
            },
            None => guarded.await,
        }
    }

    async fn follow(&self, req: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut method = req.method().clone();
        let mut url = req.url().clone();
        let mut body = req.body().cloned();
        let mut referer: Option<HeaderValue> = None;
        let mut hops: u32 = 0;

        loop {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(FetchError::UnsupportedScheme {
                    scheme: url.scheme().to_string(),
                });
            }

            let mut headers = req.headers().clone();
            if hops > 0 && url.host_str() != req.url().host_str() {
                // Credentials never follow a redirect to another host.
                headers.remove(AUTHORIZATION);
                headers.remove(PROXY_AUTHORIZATION);
                headers.remove(COOKIE);
            }
            if let Some(r) = &referer {
                if !headers.contains_key(REFERER) {
                    headers.insert(REFERER, r.clone());
                }
            }
            inject_default_headers(&mut headers);

            let mut builder = self.client.request(method.clone(), url.clone()).headers(headers);
            if let Some(b) = &body {
                builder = match b.for_attempt()? {
                    AttemptBody::Bytes(bytes) => builder.body(bytes),
                    AttemptBody::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
                };
            }

            let resp = builder.send().await.map_err(classify_reqwest_error)?;
            let status = resp.status().as_u16();
            if !matches!(status, 301 | 302 | 303 | 307 | 308) {
                return Ok(into_response(resp));
            }
            let Some(location) = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
            else {
                // Redirect status without a Location is surfaced as-is.
                return Ok(into_response(resp));
            };

            hops += 1;
            if hops > self.max_redirects {
                return Err(FetchError::TooManyRedirects(self.max_redirects));
            }
            let next = url
                .join(&location)
                .map_err(|source| FetchError::InvalidUrl {
                    url: location.clone(),
                    source,
                })?;

            tracing::debug!(
                component = taskfetch_core::COMPONENT,
                url = %redact::url(&url),
                location = %redact::url(&next),
                status,
                hop = hops,
                "following redirect"
            );

            referer = referer_for(&url, &next);
            let next_method = redirected_method(status, &method);
            if next_method != method || status == 303 {
                body = None;
            }
            method = next_method;
            url = next;
            // The hop response drops here; redirect bodies are tiny.
        }
    }
}

impl Service<FetchRequest> for RawFetcher {
    type Response = FetchResponse;
    type Error = FetchError;
    type Future = BoxFuture<'static, Result<FetchResponse, FetchError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: FetchRequest) -> Self::Future {
        let this = self.clone();
        Box::pin(this.execute(req))
    }
}

fn inject_default_headers(headers: &mut HeaderMap) {
    if !headers.contains_key(ACCEPT) {
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    }
    if !headers.contains_key(ACCEPT_LANGUAGE) {
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE),
        );
    }
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(FALLBACK_USER_AGENT));
    }
}

/// The method to use after a redirect with `status`.
fn redirected_method(status: u16, method: &Method) -> Method {
    match status {
        303 if *method != Method::HEAD => Method::GET,
        301 | 302 if *method != Method::GET && *method != Method::HEAD => Method::GET,
        _ => method.clone(),
    }
}

/// `Referer` value for the hop from `from` to `next`: user-info stripped,
/// and withheld entirely on an https→http downgrade.
fn referer_for(from: &Url, next: &Url) -> Option<HeaderValue> {
    if from.scheme() == "https" && next.scheme() == "http" {
        return None;
    }
    redact::referer(from).parse().ok()
}

fn into_response(resp: reqwest::Response) -> FetchResponse {
    let status = resp.status();
    let headers = resp.headers().clone();
    let url = resp.url().clone();
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = ResponseBody::new(resp.bytes_stream().map(|r| r.map_err(classify_reqwest_error)));
    FetchResponse::new(status, headers, url, content_length, body)
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Network {
            source: err.into(),
            timeout: true,
        };
    }
    if let Some(message) = certificate_message(&err) {
        return FetchError::Certificate { message };
    }
    FetchError::Network {
        source: err.into(),
        timeout: false,
    }
}

/// Walks the source chain looking for a TLS certificate failure; hyper and
/// rustls bury these several levels deep, and they only surface as text.
fn certificate_message(err: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        let text = e.to_string();
        let lower = text.to_ascii_lowercase();
        if lower.contains("certificate")
            || lower.contains("unknownissuer")
            || lower.contains("invalid peer")
            || lower.contains("hostname mismatch")
        {
            return Some(text);
        }
        current = e.source();
    }
    None
}
