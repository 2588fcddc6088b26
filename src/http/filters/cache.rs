//! Default cache directive for GET responses.

use async_trait::async_trait;
use axum::http::Method;

use crate::config::CacheStrategyConfig;
use crate::http::cache::{CacheDirective, CacheDirectiveBuilder};
use crate::http::filter::{Filter, FilterChain};
use crate::http::response::WithCacheDirective;
use crate::http::{BoxReply, Context, Request};

/// Gives successful GET responses without `Cache-Control` a configured
/// default directive. Other methods pass through untouched.
#[derive(Debug, Clone)]
pub struct CacheStrategyFilter {
    directive: CacheDirective,
}

impl CacheStrategyFilter {
    pub fn new(directive: CacheDirective) -> Self {
        Self { directive }
    }

    pub fn from_config(config: &CacheStrategyConfig) -> Self {
        let builder = CacheDirectiveBuilder {
            is_reusable: config.is_reusable,
            revalidate_each_time: config.revalidate_each_time,
            allow_intermediate_caches: config.allow_intermediate_caches,
            max_cache_lifetime: config.max_cache_lifetime,
            etag: None,
        };
        Self::new(builder.build())
    }

    pub fn directive(&self) -> &CacheDirective {
        &self.directive
    }
}

#[async_trait]
impl Filter for CacheStrategyFilter {
    async fn filter(&self, ctx: Context, req: Request, chain: &mut FilterChain) -> BoxReply {
        let is_get = *req.method() == Method::GET;
        let reply = chain.next(ctx, req).await;
        if !is_get {
            return reply;
        }
        Box::new(WithCacheDirective::new(reply, self.directive.clone()))
    }
}
