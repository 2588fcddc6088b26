//! Default response headers.

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::http::filter::{Filter, FilterChain};
use crate::http::response::WithDefaultHeaders;
use crate::http::{BoxReply, Context, Request};

/// Adds headers to every response that did not set them itself.
#[derive(Debug, Clone, Default)]
pub struct DefaultHeadersFilter {
    headers: HeaderMap,
}

impl DefaultHeadersFilter {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl Filter for DefaultHeadersFilter {
    async fn filter(&self, ctx: Context, req: Request, chain: &mut FilterChain) -> BoxReply {
        let reply = chain.next(ctx, req).await;
        Box::new(WithDefaultHeaders::new(reply, self.headers.clone()))
    }

    fn priority(&self) -> i32 {
        -100
    }
}
