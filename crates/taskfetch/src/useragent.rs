//! User-Agent rotation.

use std::sync::Arc;
use std::task::{Context, Poll};

use http::header::{HeaderValue, USER_AGENT};
use rand::Rng;
use tower::{Layer, Service};

use taskfetch_core::FetchRequest;

/// Realistic desktop browser strings used when the caller supplies none.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.2420.81",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Sets `User-Agent` to a value picked uniformly at random from the
/// effective list, unless the caller already set one — a caller-supplied
/// header always wins.
///
/// Positioned outside the retry layer, so all attempts of one logical call
/// present the same identity.
#[derive(Clone)]
pub struct UserAgent<S> {
    inner: S,
    agents: Arc<Vec<HeaderValue>>,
}

impl<S> UserAgent<S> {
    pub fn new(inner: S, agents: Arc<Vec<HeaderValue>>) -> Self {
        Self { inner, agents }
    }
}

impl<S> Service<FetchRequest> for UserAgent<S>
where
    S: Service<FetchRequest>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: FetchRequest) -> Self::Future {
        if !self.agents.is_empty() && !req.headers().contains_key(USER_AGENT) {
            let pick = rand::rng().random_range(0..self.agents.len());
            req.headers_mut()
                .insert(USER_AGENT, self.agents[pick].clone());
        }
        self.inner.call(req)
    }
}

/// A [`Layer`] applying [`UserAgent`] with an effective candidate list:
/// the caller's list when non-empty, else [`DEFAULT_USER_AGENTS`]. Strings
/// that are not valid header values are discarded.
#[derive(Debug, Clone)]
pub struct UserAgentLayer {
    agents: Arc<Vec<HeaderValue>>,
}

impl UserAgentLayer {
    pub fn new(agents: &[String]) -> Self {
        let effective: Vec<HeaderValue> = if agents.is_empty() {
            DEFAULT_USER_AGENTS
                .iter()
                .map(|s| HeaderValue::from_static(s))
                .collect()
        } else {
            agents
                .iter()
                .filter_map(|s| HeaderValue::from_str(s).ok())
                .collect()
        };
        Self {
            agents: Arc::new(effective),
        }
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgent<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgent::new(inner, Arc::clone(&self.agents))
    }
}
