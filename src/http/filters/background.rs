//! Waits for background work spawned through [`Request::spawn`].

use async_trait::async_trait;

use crate::http::filter::{Filter, FilterChain};
use crate::http::{BoxReply, Context, Request};

/// Holds the reply back until every tracked task of the request finished.
/// Bounded by the request deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackgroundWorkFilter;

#[async_trait]
impl Filter for BackgroundWorkFilter {
    async fn filter(&self, ctx: Context, req: Request, chain: &mut FilterChain) -> BoxReply {
        let reply = chain.next(ctx.clone(), req.clone()).await;

        let pending = req.background().pending();
        if pending > 0 {
            tracing::debug!(pending, "Waiting for background work");
        }
        if let Err(err) = ctx.run(req.background().wait()).await {
            tracing::warn!(error = %err, pending = req.background().pending(), "Background work did not finish");
        }
        reply
    }
}
