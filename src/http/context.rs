//! Request-scoped context.
//!
//! Carries the request deadline, the current request, the error injected for
//! the reserved error and not-found handlers, and the application router used
//! for reverse routing.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::WebError;
use crate::http::request::Request;
use crate::routing::Router;

/// Context passed to every stage of request handling.
#[derive(Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    error: Option<Arc<WebError>>,
    router: Option<Arc<Router>>,
    request: Option<Request>,
}

impl Context {
    /// An empty context without deadline or router.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_router(mut self, router: Arc<Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_request(mut self, request: Request) -> Self {
        self.request = Some(request);
        self
    }

    /// Bound the context by `timeout` from now. An earlier existing deadline is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Inject an error, as seen by the reserved error and not-found handlers.
    pub fn with_error(self, error: WebError) -> Self {
        self.with_shared_error(Arc::new(error))
    }

    pub fn with_shared_error(mut self, error: Arc<WebError>) -> Self {
        self.error = Some(error);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn error(&self) -> Option<&WebError> {
        self.error.as_deref()
    }

    pub fn shared_error(&self) -> Option<Arc<WebError>> {
        self.error.clone()
    }

    pub fn router(&self) -> Option<&Arc<Router>> {
        self.router.as_ref()
    }

    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Drive `fut` to completion unless the deadline passes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, WebError> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| WebError::DeadlineExceeded),
            None => Ok(fut.await),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.deadline)
            .field("error", &self.error)
            .field("router", &self.router.is_some())
            .field("request", &self.request.as_ref().map(|r| r.uri().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_respects_deadline() {
        let ctx = Context::new().with_timeout(Duration::from_millis(20));
        let result = ctx.run(tokio::time::sleep(Duration::from_secs(5))).await;
        assert!(matches!(result, Err(WebError::DeadlineExceeded)));

        let ctx = Context::new();
        assert_eq!(ctx.run(async { 7 }).await.unwrap(), 7);
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let ctx = Context::new()
            .with_timeout(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(60));
        let remaining = ctx.deadline().unwrap() - Instant::now();
        assert!(remaining <= Duration::from_secs(1));
    }
}
