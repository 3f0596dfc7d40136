use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Layer, Service};

use taskfetch_core::{FetchError, FetchRequest, FetchResponse};

/// Validates the response `Content-Type` against an allowlist.
///
/// Matching is exact on the lowercased `type/subtype` essence —
/// `text/plain-custom` does not match `text/plain`. A missing header fails
/// with [`FetchError::MissingResponseContentType`] unless the layer was
/// configured to allow it. Rejected bodies are drained here; so are bodies
/// riding along on delegate errors.
#[derive(Clone)]
pub struct MimeValidator<S> {
    inner: S,
    allowed: Arc<HashSet<String>>,
    allow_missing: bool,
}

impl<S> MimeValidator<S> {
    pub fn new(inner: S, allowed: Arc<HashSet<String>>, allow_missing: bool) -> Self {
        Self {
            inner,
            allowed,
            allow_missing,
        }
    }
}

impl<S> Service<FetchRequest> for MimeValidator<S>
where
    S: Service<FetchRequest, Response = FetchResponse, Error = FetchError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = FetchResponse;
    type Error = FetchError;
    type Future = BoxFuture<'static, Result<FetchResponse, FetchError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: FetchRequest) -> Self::Future {
        let mut inner = self.inner.clone();
        let allowed = Arc::clone(&self.allowed);
        let allow_missing = self.allow_missing;
        Box::pin(async move {
            match inner.call(req).await {
                Ok(resp) => {
                    let content_type = resp.content_type().map(str::to_owned);
                    let Some(content_type) = content_type else {
                        if allow_missing {
                            return Ok(resp);
                        }
                        resp.drain().await;
                        return Err(FetchError::MissingResponseContentType);
                    };
                    if allowed.contains(&media_type(&content_type)) {
                        Ok(resp)
                    } else {
                        resp.drain().await;
                        Err(FetchError::UnsupportedMediaType { content_type })
                    }
                }
                Err(mut err) => {
                    if let Some(body) = err.take_response_body() {
                        body.drain().await;
                    }
                    Err(err)
                }
            }
        })
    }
}

/// The lowercased `type/subtype` essence of a `Content-Type` value. Parse
/// failures fall back to the substring before the first `;`, trimmed.
pub fn media_type(content_type: &str) -> String {
    match content_type.parse::<mime::Mime>() {
        Ok(m) => m.essence_str().to_ascii_lowercase(),
        Err(_) => content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase(),
    }
}

/// A [`Layer`] applying [`MimeValidator`]. The allowed types are stored as
/// lowercased essences.
#[derive(Debug, Clone)]
pub struct MimeValidatorLayer {
    allowed: Arc<HashSet<String>>,
    allow_missing: bool,
}

impl MimeValidatorLayer {
    pub fn new<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            allowed: Arc::new(
                types
                    .into_iter()
                    .map(|t| t.as_ref().trim().to_ascii_lowercase())
                    .collect(),
            ),
            allow_missing: false,
        }
    }

    /// Lets responses without a `Content-Type` header through unvalidated.
    pub fn allow_missing_content_type(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }
}

impl<S> Layer<S> for MimeValidatorLayer {
    type Service = MimeValidator<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MimeValidator::new(inner, Arc::clone(&self.allowed), self.allow_missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, StatusCode};
    use taskfetch_core::ResponseBody;
    use tower::{service_fn, ServiceExt};
    use url::Url;

    fn target() -> Url {
        Url::parse("https://api.example.com/doc").unwrap()
    }

    fn response(content_type: Option<&'static str>) -> FetchResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        FetchResponse::new(
            StatusCode::OK,
            headers,
            target(),
            None,
            ResponseBody::from_bytes(Bytes::from_static(b"{}")),
        )
    }

    async fn run(
        layer: MimeValidatorLayer,
        content_type: Option<&'static str>,
    ) -> Result<FetchResponse, FetchError> {
        let service = service_fn(move |_req: FetchRequest| async move {
            Ok::<_, FetchError>(response(content_type))
        });
        let mut service = layer.layer(service);
        service
            .ready()
            .await
            .unwrap()
            .call(FetchRequest::get(target()))
            .await
    }

    #[test]
    fn media_type_normalizes_parameters_and_case() {
        assert_eq!(media_type("Application/JSON"), "application/json");
        assert_eq!(media_type("text/html; charset=utf-8"), "text/html");
        assert_eq!(media_type("  weird stuff ; x"), "weird stuff");
    }

    #[tokio::test]
    async fn exact_match_passes() {
        let layer = MimeValidatorLayer::new(["application/json"]);
        assert!(run(layer, Some("application/json; charset=utf-8"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn near_miss_is_rejected() {
        let layer = MimeValidatorLayer::new(["text/plain"]);
        let err = run(layer, Some("text/plain-custom")).await.unwrap_err();
        match err {
            FetchError::UnsupportedMediaType { content_type } => {
                assert_eq!(content_type, "text/plain-custom");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn case_is_ignored() {
        let layer = MimeValidatorLayer::new(["Application/JSON"]);
        assert!(run(layer, Some("application/json")).await.is_ok());
    }

    #[tokio::test]
    async fn missing_content_type_fails_by_default() {
        let layer = MimeValidatorLayer::new(["application/json"]);
        let err = run(layer, None).await.unwrap_err();
        assert!(matches!(err, FetchError::MissingResponseContentType));
    }

    #[tokio::test]
    async fn missing_content_type_can_be_allowed() {
        let layer =
            MimeValidatorLayer::new(["application/json"]).allow_missing_content_type(true);
        assert!(run(layer, None).await.is_ok());
    }

    #[tokio::test]
    async fn delegate_error_bodies_are_drained() {
        let service = service_fn(move |_req: FetchRequest| async move {
            let err = taskfetch_core::HttpStatusError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                &target(),
                &HeaderMap::new(),
                "boom".into(),
            )
            .with_body(ResponseBody::from_bytes(Bytes::from_static(b"boom")));
            Err::<FetchResponse, FetchError>(err.into())
        });
        let mut service = MimeValidatorLayer::new(["application/json"]).layer(service);
        let mut err = service
            .ready()
            .await
            .unwrap()
            .call(FetchRequest::get(target()))
            .await
            .unwrap_err();
        assert!(err.take_response_body().is_none());
    }
}
