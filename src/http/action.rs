//! Controller action contracts.
//!
//! Any `Fn(Context, Request) -> impl Future<Output = impl Reply>` is an
//! [`Action`]; any `Fn(Context, Request, Params) -> impl Future<Output = Value>`
//! is a [`DataAction`]. Controllers with state implement the traits directly.

use std::future::Future;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::http::context::Context;
use crate::http::request::Request;
use crate::http::response::{BoxReply, Reply};
use crate::routing::path::Params;

/// Produces a reply for a request.
pub trait Action: Send + Sync {
    fn call(&self, ctx: Context, req: Request) -> BoxFuture<'static, BoxReply>;
}

impl<F, Fut, R> Action for F
where
    F: Fn(Context, Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: Reply + 'static,
{
    fn call(&self, ctx: Context, req: Request) -> BoxFuture<'static, BoxReply> {
        let fut = self(ctx, req);
        Box::pin(async move { Box::new(fut.await) as BoxReply })
    }
}

/// Produces raw data instead of a full response.
pub trait DataAction: Send + Sync {
    fn call(&self, ctx: Context, req: Request, params: Params) -> BoxFuture<'static, Value>;
}

impl<F, Fut> DataAction for F
where
    F: Fn(Context, Request, Params) -> Fut + Send + Sync,
    Fut: Future<Output = Value> + Send + 'static,
{
    fn call(&self, ctx: Context, req: Request, params: Params) -> BoxFuture<'static, Value> {
        Box::pin(self(ctx, req, params))
    }
}
