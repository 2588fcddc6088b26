//! Redirect controllers, usable straight from route configuration:
//!
//! ```text
//! /old-page  → core.redirect(to="page.view", id="3")
//! /legacy    → core.redirectPermanentUrl(url="https://example.com/new")
//! ```

use futures_util::future::BoxFuture;
use url::Url;

use crate::error::WebError;
use crate::http::action::Action;
use crate::http::{BoxReply, Context, Request, Responder};

/// Which redirect a [`Redirect`] controller issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// 303 to the route named by param `to`; remaining params are passed on.
    Route,
    /// Like `Route`, with 301.
    RoutePermanent,
    /// 303 to param `url`.
    Url,
    /// Like `Url`, with 301.
    UrlPermanent,
}

#[derive(Clone)]
pub struct Redirect {
    responder: Responder,
    kind: RedirectKind,
}

impl Redirect {
    pub fn new(responder: Responder, kind: RedirectKind) -> Self {
        Self { responder, kind }
    }

    fn reply(&self, req: &Request) -> BoxReply {
        match self.kind {
            RedirectKind::Route | RedirectKind::RoutePermanent => {
                let mut params = req.params().clone();
                let Some(to) = params.remove("to") else {
                    return Box::new(self.responder.server_error(&WebError::msg("redirect without \"to\" param")));
                };
                let redirect = self.responder.route_redirect(to, params);
                if self.kind == RedirectKind::RoutePermanent {
                    Box::new(redirect.permanent())
                } else {
                    Box::new(redirect)
                }
            }
            RedirectKind::Url | RedirectKind::UrlPermanent => {
                let target = match parse_target(req.param("url").unwrap_or_default()) {
                    Ok(target) => target,
                    Err(err) => return Box::new(self.responder.server_error(&err)),
                };
                let redirect = self.responder.url_redirect(target);
                if self.kind == RedirectKind::UrlPermanent {
                    Box::new(redirect.permanent())
                } else {
                    Box::new(redirect)
                }
            }
        }
    }
}

impl Action for Redirect {
    fn call(&self, _ctx: Context, req: Request) -> BoxFuture<'static, BoxReply> {
        let reply = self.reply(&req);
        Box::pin(async move { reply })
    }
}

/// Absolute URLs must parse; relative references are taken as they are.
fn parse_target(raw: &str) -> Result<String, WebError> {
    if raw.is_empty() {
        return Err(WebError::msg("redirect without \"url\" param"));
    }
    if raw.starts_with('/') || raw.starts_with('?') || raw.starts_with('#') {
        return Ok(raw.to_string());
    }
    Url::parse(raw)
        .map(String::from)
        .map_err(|err| WebError::Other(Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::ResponseWriter;
    use crate::routing::{Params, Router, RouterRegistry};
    use crate::session::{SaveMode, Session};
    use axum::body::Bytes;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use std::sync::Arc;

    fn request(params: &[(&str, &str)]) -> Request {
        let (parts, _) = HttpRequest::builder().uri("/r").body(()).unwrap().into_parts();
        let params: Params = params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Request::new(parts, Bytes::new(), Arc::new(Session::empty(SaveMode::Always))).with_route("r", params)
    }

    async fn run(kind: RedirectKind, params: &[(&str, &str)]) -> ResponseWriter {
        let mut registry = RouterRegistry::new();
        registry.handle_any("page.view", |_ctx: Context, _req: Request| async { Responder::default().todo() });
        registry.route("/page/:id", "page.view").unwrap();
        let router = Router::new(registry, &Default::default()).unwrap();
        let ctx = Context::new().with_router(Arc::new(router));

        let controller = Redirect::new(Responder::default(), kind);
        let reply = controller.call(ctx.clone(), request(params)).await;
        let mut rw = ResponseWriter::new();
        reply.apply(&ctx, &mut rw).await.unwrap();
        rw
    }

    #[tokio::test]
    async fn test_route_redirect_passes_params() {
        let rw = run(RedirectKind::Route, &[("to", "page.view"), ("id", "3")]).await;
        assert_eq!(rw.status(), StatusCode::SEE_OTHER);
        assert_eq!(rw.headers()[header::LOCATION], "/page/3");

        let rw = run(RedirectKind::RoutePermanent, &[("to", "page.view"), ("id", "4")]).await;
        assert_eq!(rw.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(rw.headers()[header::LOCATION], "/page/4");
    }

    #[tokio::test]
    async fn test_url_redirect() {
        let rw = run(RedirectKind::Url, &[("url", "https://example.com/new")]).await;
        assert_eq!(rw.status(), StatusCode::SEE_OTHER);
        assert_eq!(rw.headers()[header::LOCATION], "https://example.com/new");

        let rw = run(RedirectKind::UrlPermanent, &[("url", "/local")]).await;
        assert_eq!(rw.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(rw.headers()[header::LOCATION], "/local");
    }

    #[tokio::test]
    async fn test_missing_target_is_server_error() {
        let rw = run(RedirectKind::Route, &[]).await;
        assert_eq!(rw.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let rw = run(RedirectKind::Url, &[("url", "not a url")]).await;
        assert_eq!(rw.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
