//! Default reserved handlers, used when the application registers none.

use futures_util::future::BoxFuture;

use crate::error::WebError;
use crate::http::action::Action;
use crate::http::{BoxReply, Context, Request, Responder};

/// Renders the error injected into the context.
#[derive(Clone)]
pub struct ErrorController {
    responder: Responder,
}

impl ErrorController {
    pub fn new(responder: Responder) -> Self {
        Self { responder }
    }
}

impl Action for ErrorController {
    fn call(&self, ctx: Context, _req: Request) -> BoxFuture<'static, BoxReply> {
        let err = ctx
            .shared_error()
            .unwrap_or_else(|| WebError::msg("unknown error").into());
        let reply: BoxReply = match err.as_ref() {
            WebError::DeadlineExceeded => Box::new(self.responder.unavailable(&err)),
            _ => Box::new(self.responder.server_error(&err)),
        };
        Box::pin(async move { reply })
    }
}

/// 404 page for unmatched routes and unsupported methods.
#[derive(Clone)]
pub struct NotFoundController {
    responder: Responder,
}

impl NotFoundController {
    pub fn new(responder: Responder) -> Self {
        Self { responder }
    }
}

impl Action for NotFoundController {
    fn call(&self, ctx: Context, req: Request) -> BoxFuture<'static, BoxReply> {
        let err = ctx.shared_error().unwrap_or_else(|| {
            WebError::RouteNotFound {
                method: req.method().to_string(),
                path: req.uri().path().to_string(),
            }
            .into()
        });
        let reply: BoxReply = Box::new(self.responder.not_found(&err));
        Box::pin(async move { reply })
    }
}
