use std::sync::Arc;

use tower::Layer;

use crate::{Retry, RetryPolicy};

/// A [`Layer`] that applies retry behavior to a fetcher.
///
/// With `max_retries` of zero the wrapped service degrades to a
/// pass-through: the layer stays in the chain but never waits.
#[derive(Debug, Clone)]
pub struct RetryLayer {
    policy: Arc<RetryPolicy>,
}

impl RetryLayer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry::new(inner, Arc::clone(&self.policy))
    }
}
