//! Response counts and bytes by status class.

use async_trait::async_trait;

use crate::http::filter::{Filter, FilterChain};
use crate::http::{BoxReply, Context, Request};
use crate::observability::metrics;

/// Records every applied response once its final status and size are known.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFilter;

#[async_trait]
impl Filter for MetricsFilter {
    async fn filter(&self, ctx: Context, req: Request, chain: &mut FilterChain) -> BoxReply {
        chain.add_post_apply(|_err, outcome| {
            metrics::record_response(outcome.status, outcome.bytes_written);
        });
        chain.next(ctx, req).await
    }
}
