//! Per-request dispatcher.
//!
//! # Data Flow
//! ```text
//! http::Request<Bytes>
//!     → strip configured prefix
//!     → load session (failure logged, empty session used)
//!     → match route (no match → reserved not-found handler)
//!     → RequestStarted
//!     → FilterChain → terminal: method action → any action → not-found
//!         (panic → reserved error handler)       → ResponseProduced
//!     → save session, copy Set-Cookie headers
//!     → Reply::apply → ResponseWriter (failure → reserved error handler)
//!     → save session again (writes made while applying)
//!     → post-apply callbacks
//!     → RequestFinished
//!     → axum Response
//! ```
//!
//! # Design Decisions
//! - Every stage that runs application code is panic-guarded
//! - A panic inside the reserved error handler ends in a bare 500
//! - The request deadline bounds the filter chain and session operations

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::uri::PathAndQuery;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::Response;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::{PanicError, WebError};
use crate::events::{Event, EventRouter};
use crate::http::action::Action;
use crate::http::context::Context;
use crate::http::filter::{ApplyOutcome, Filters, TerminalFn};
use crate::http::request::Request;
use crate::http::responder::Responder;
use crate::http::response::{BoxReply, HttpResponse, ResponseWriter};
use crate::observability::metrics;
use crate::routing::registry::RouteMatch;
use crate::routing::router::{Router, ERROR_HANDLER, NOTFOUND_HANDLER};
use crate::session::{Session, SessionError, SessionStore};

/// Entry point turning one request into one response. Cheap to clone.
#[derive(Clone)]
pub struct RequestHandler {
    inner: Arc<Inner>,
}

struct Inner {
    router: Arc<Router>,
    filters: Filters,
    sessions: SessionStore,
    events: Arc<dyn EventRouter>,
    responder: Responder,
    prefix: String,
    timeout: Option<Duration>,
}

impl fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandler")
            .field("filters", &self.inner.filters.len())
            .field("mode", &self.inner.sessions.mode())
            .field("prefix", &self.inner.prefix)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl RequestHandler {
    pub fn new(
        router: Arc<Router>,
        filters: Filters,
        sessions: SessionStore,
        events: Arc<dyn EventRouter>,
        responder: Responder,
        prefix: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                router,
                filters,
                sessions,
                events,
                responder,
                prefix: prefix.into(),
                timeout,
            }),
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.inner.router
    }

    pub fn responder(&self) -> &Responder {
        &self.inner.responder
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Handle one request with a fully buffered body.
    pub async fn handle(&self, request: axum::http::Request<Bytes>) -> Response {
        let inner = &self.inner;
        let (mut parts, body) = request.into_parts();
        parts.uri = strip_prefix(&parts.uri, &inner.prefix);

        let mut ctx = Context::new().with_router(inner.router.clone());
        if let Some(timeout) = inner.timeout {
            ctx = ctx.with_timeout(timeout);
        }

        let session = inner.load_session(&ctx, &parts.headers).await;
        let route = inner
            .router
            .match_request(&parts.method, parts.uri.path(), parts.uri.query());

        let mut request = Request::new(parts, body, Arc::new(session));
        if let Some(m) = &route {
            request = request.with_route(m.handler.clone(), m.params.clone());
        }
        let ctx = ctx.with_request(request.clone());

        inner.events.dispatch(
            &ctx,
            &Event::RequestStarted {
                request: request.clone(),
            },
        );

        let terminal: TerminalFn = {
            let inner = self.inner.clone();
            Box::new(move |ctx: Context, req: Request| -> BoxFuture<'static, BoxReply> {
                Box::pin(async move { inner.invoke(ctx, req, route).await })
            })
        };
        let mut chain = inner.filters.chain(terminal);

        let walked = ctx
            .run(AssertUnwindSafe(chain.next(ctx.clone(), request.clone())).catch_unwind())
            .await;
        let reply = match walked {
            Ok(Ok(reply)) => reply,
            Ok(Err(payload)) => {
                let err = WebError::from(PanicError::from_payload(payload));
                tracing::error!(error = %err, "Filter panic");
                inner.error_reply(&ctx, &request, Arc::new(err)).await
            }
            Err(err) => {
                tracing::debug!(error = %err, "Request deadline exceeded in filter chain");
                inner.error_reply(&ctx, &request, Arc::new(err)).await
            }
        };

        let mut rw = ResponseWriter::new();
        let session_headers = inner.save_session(&ctx, request.session()).await.unwrap_or_default();
        copy_headers(&session_headers, &mut rw);

        let mut finish_error = match apply(reply, &ctx, &mut rw).await {
            Ok(()) => None,
            Err(err) => Some(Arc::new(err)),
        };

        inner.save_session(&ctx, request.session()).await;

        let outcome = ApplyOutcome {
            status: rw.status(),
            bytes_written: rw.bytes_written(),
        };
        for callback in chain.take_post_apply() {
            callback(finish_error.as_deref(), &outcome);
        }

        if let Some(err) = finish_error.clone() {
            log_error(&err, "Applying the reply failed");
            rw.reset();
            copy_headers(&session_headers, &mut rw);

            let reply = inner.error_reply(&ctx, &request, err.clone()).await;
            let error_ctx = ctx.clone().with_shared_error(err);
            if let Err(second) = apply(reply, &error_ctx, &mut rw).await {
                log_error(&second, "Error handler failed");
                rw.reset();
                write_bare_error(&mut rw, &second);
                finish_error = Some(Arc::new(second));
            }
        }

        inner.events.dispatch(
            &ctx,
            &Event::RequestFinished {
                request,
                error: finish_error,
            },
        );

        rw.into_response()
    }
}

impl Inner {
    async fn load_session(&self, ctx: &Context, headers: &HeaderMap) -> Session {
        let result = ctx
            .run(self.sessions.load_by_request(headers))
            .await
            .and_then(|loaded| loaded.map_err(WebError::from));
        match result {
            Ok(session) => session,
            Err(WebError::Session(err @ SessionError::Cookie(_))) => {
                tracing::debug!(error = %err, "Session cookie rejected");
                Session::empty(self.sessions.mode())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Session load failed");
                Session::empty(self.sessions.mode())
            }
        }
    }

    async fn save_session(&self, ctx: &Context, session: &Session) -> Option<HeaderMap> {
        let result = ctx
            .run(self.sessions.save(session))
            .await
            .and_then(|saved| saved.map_err(WebError::from));
        match result {
            Ok(headers) => headers,
            Err(err) => {
                tracing::warn!(session = %session.id_hash(), error = %err, "Session save failed");
                None
            }
        }
    }

    /// Terminal stage of the filter chain.
    async fn invoke(self: Arc<Self>, ctx: Context, req: Request, route: Option<RouteMatch>) -> BoxReply {
        let method = req.method().clone();
        let selected = route.and_then(|m| {
            let action = m.actions.method(&method).or(m.actions.any()).cloned();
            match action {
                Some(action) => Some((m.handler, action)),
                None => {
                    tracing::debug!(handler = %m.handler, method = %method, "No action for method");
                    None
                }
            }
        });

        let (handler, action, ctx) = match selected {
            Some((handler, action)) => (handler, Some(action), ctx),
            None => {
                let err = match req.handler_name() {
                    Some(_) => WebError::ActionNotFound(method.to_string()),
                    None => WebError::RouteNotFound {
                        method: method.to_string(),
                        path: req.uri().path().to_string(),
                    },
                };
                (
                    NOTFOUND_HANDLER.to_string(),
                    self.reserved(NOTFOUND_HANDLER),
                    ctx.with_error(err),
                )
            }
        };

        let start = Instant::now();
        let reply = match action {
            Some(action) => match call_guarded(&action, &ctx, &req).await {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::error!(handler = %handler, error = %err, backtrace = %panic_backtrace(&err), "Controller panic");
                    self.error_reply(&ctx, &req, Arc::new(err)).await
                }
            },
            None => {
                let err = ctx.shared_error().unwrap_or_else(|| Arc::new(WebError::msg("not found")));
                Box::new(self.responder.not_found(&err)) as BoxReply
            }
        };
        metrics::record_controller_duration(&handler, start.elapsed());

        self.events.dispatch(
            &ctx,
            &Event::ResponseProduced {
                request: req,
                handler,
            },
        );
        reply
    }

    fn reserved(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.router.registry().actions(name).and_then(|a| a.any()).cloned()
    }

    /// Reply of the reserved error handler for `err`. A panic in there
    /// yields a bare 500 with the error text.
    async fn error_reply(&self, ctx: &Context, req: &Request, err: Arc<WebError>) -> BoxReply {
        let ctx = ctx.clone().with_shared_error(err.clone());
        let Some(action) = self.reserved(ERROR_HANDLER) else {
            return Box::new(self.responder.server_error(&err));
        };
        match call_guarded(&action, &ctx, req).await {
            Ok(reply) => reply,
            Err(second) => {
                log_error(&second, "Error handler panic");
                let mut response = HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR, second.to_string());
                response
                    .headers
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
                Box::new(response)
            }
        }
    }
}

async fn call_guarded(action: &Arc<dyn Action>, ctx: &Context, req: &Request) -> Result<BoxReply, WebError> {
    let (ctx, req) = (ctx.clone(), req.clone());
    AssertUnwindSafe(async move { action.call(ctx, req).await })
        .catch_unwind()
        .await
        .map_err(|payload| WebError::from(PanicError::from_payload(payload)))
}

/// Apply `reply`, turning both errors and panics into a `WebError`.
async fn apply(reply: BoxReply, ctx: &Context, rw: &mut ResponseWriter) -> Result<(), WebError> {
    match AssertUnwindSafe(reply.apply(ctx, rw)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(PanicError::from_payload(payload).into()),
    }
}

fn write_bare_error(rw: &mut ResponseWriter, err: &WebError) {
    rw.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    rw.write_header(StatusCode::INTERNAL_SERVER_ERROR);
    rw.write(err.chain().as_bytes());
}

fn copy_headers(headers: &HeaderMap, rw: &mut ResponseWriter) {
    for (name, value) in headers {
        rw.headers_mut().append(name, value.clone());
    }
}

fn log_error(err: &WebError, message: &str) {
    if matches!(err, WebError::DeadlineExceeded) {
        tracing::debug!(error = %err, "{}", message);
    } else {
        tracing::error!(error = %err.chain(), "{}", message);
    }
}

fn panic_backtrace(err: &WebError) -> &str {
    match err {
        WebError::Panic(panic) => panic.backtrace(),
        _ => "",
    }
}

/// Remove `prefix` from the request path, keeping the query.
fn strip_prefix(uri: &Uri, prefix: &str) -> Uri {
    let prefix = prefix.trim_end_matches('/');
    let Some(rest) = uri.path().strip_prefix(prefix).filter(|_| !prefix.is_empty()) else {
        return uri.clone();
    };
    let path = match uri.query() {
        Some(query) => format!("/{}?{}", rest.trim_start_matches('/'), query),
        None => format!("/{}", rest.trim_start_matches('/')),
    };

    let mut parts = uri.clone().into_parts();
    match PathAndQuery::try_from(path) {
        Ok(path_and_query) => parts.path_and_query = Some(path_and_query),
        Err(_) => return uri.clone(),
    }
    Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
}
