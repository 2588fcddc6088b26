//! Filter pipeline around the resolved action.
//!
//! # Data Flow
//! ```text
//! Filters (sorted once, shared read-only)
//!     → FilterChain (per request: cursor + terminal action)
//!     → filter[0].filter(ctx, req, chain)
//!         → chain.next() → filter[1] ... → terminal action
//!     ← reply flows back out, filters may wrap it
//! ```
//!
//! # Design Decisions
//! - Filters are sorted descending by priority; ties keep registration order
//! - Each request walks its own cursor; the filter list is never mutated
//! - A filter short-circuits by returning without calling `next`
//! - Post-apply callbacks run after the reply was written to the transport

use std::cmp::Reverse;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use futures_util::future::BoxFuture;

use crate::error::WebError;
use crate::http::context::Context;
use crate::http::request::Request;
use crate::http::response::{BoxReply, HttpResponse};

/// Cross-cutting behavior wrapped around every request.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn filter(&self, ctx: Context, req: Request, chain: &mut FilterChain) -> BoxReply;

    /// Higher runs earlier. Filters that do not care keep 0.
    fn priority(&self) -> i32 {
        0
    }
}

/// Final outcome of applying a reply, handed to post-apply callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub status: StatusCode,
    pub bytes_written: usize,
}

pub type PostApplyFn = Box<dyn FnOnce(Option<&WebError>, &ApplyOutcome) + Send>;

/// Terminal stage of a chain.
pub type TerminalFn = Box<dyn FnOnce(Context, Request) -> BoxFuture<'static, BoxReply> + Send>;

/// Priority-sorted, shareable list of filters.
#[derive(Clone)]
pub struct Filters {
    filters: Arc<[Arc<dyn Filter>]>,
}

impl Default for Filters {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Filters {
    pub fn new(mut filters: Vec<Arc<dyn Filter>>) -> Self {
        filters.sort_by_key(|f| Reverse(f.priority()));
        Self {
            filters: filters.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Start a fresh chain for one request.
    pub fn chain(&self, terminal: TerminalFn) -> FilterChain {
        FilterChain {
            filters: self.filters.clone(),
            cursor: 0,
            terminal: Some(terminal),
            post_apply: Vec::new(),
        }
    }
}

/// One request's walk through the filters.
pub struct FilterChain {
    filters: Arc<[Arc<dyn Filter>]>,
    cursor: usize,
    terminal: Option<TerminalFn>,
    post_apply: Vec<PostApplyFn>,
}

impl FilterChain {
    /// Invoke the next filter, or the terminal action once all filters ran.
    pub fn next(&mut self, ctx: Context, req: Request) -> BoxFuture<'_, BoxReply> {
        if let Some(filter) = self.filters.get(self.cursor).cloned() {
            self.cursor += 1;
            return Box::pin(async move { filter.filter(ctx, req, self).await });
        }

        match self.terminal.take() {
            Some(terminal) => terminal(ctx, req),
            None => Box::pin(async {
                tracing::error!("Filter chain continued after the terminal action ran");
                Box::new(HttpResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "filter chain already consumed",
                )) as BoxReply
            }),
        }
    }

    /// Run `callback` once the reply was applied to the transport.
    pub fn add_post_apply<F>(&mut self, callback: F)
    where
        F: FnOnce(Option<&WebError>, &ApplyOutcome) + Send + 'static,
    {
        self.post_apply.push(Box::new(callback));
    }

    pub(crate) fn take_post_apply(&mut self) -> Vec<PostApplyFn> {
        std::mem::take(&mut self.post_apply)
    }
}
