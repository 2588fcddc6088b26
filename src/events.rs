//! Request lifecycle events.
//!
//! The dispatcher fires three events per request. Dispatch is synchronous
//! and fire-and-forget: subscribers cannot fail the request.

use std::sync::Arc;

use crate::error::WebError;
use crate::http::{Context, Request};

#[derive(Debug, Clone)]
pub enum Event {
    /// Before the filter chain runs.
    RequestStarted { request: Request },
    /// The action (or reserved handler) produced its reply.
    ResponseProduced { request: Request, handler: String },
    /// The reply was applied; `error` is set when anything failed on the way.
    RequestFinished {
        request: Request,
        error: Option<Arc<WebError>>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::RequestStarted { .. } => "request_started",
            Event::ResponseProduced { .. } => "response_produced",
            Event::RequestFinished { .. } => "request_finished",
        }
    }

    pub fn request(&self) -> &Request {
        match self {
            Event::RequestStarted { request }
            | Event::ResponseProduced { request, .. }
            | Event::RequestFinished { request, .. } => request,
        }
    }
}

pub trait EventRouter: Send + Sync {
    fn dispatch(&self, ctx: &Context, event: &Event);
}

pub trait Subscriber: Send + Sync {
    fn notify(&self, ctx: &Context, event: &Event);
}

/// Fans every event out to its subscribers in registration order.
#[derive(Clone, Default)]
pub struct DefaultEventRouter {
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl DefaultEventRouter {
    pub fn new(subscribers: Vec<Arc<dyn Subscriber>>) -> Self {
        Self { subscribers }
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.push(subscriber);
    }
}

impl EventRouter for DefaultEventRouter {
    fn dispatch(&self, ctx: &Context, event: &Event) {
        for subscriber in &self.subscribers {
            subscriber.notify(ctx, event);
        }
    }
}

/// Traces every event at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSubscriber;

impl Subscriber for LoggingSubscriber {
    fn notify(&self, _ctx: &Context, event: &Event) {
        let request = event.request();
        match event {
            Event::RequestFinished { error: Some(error), .. } => tracing::debug!(
                event = event.name(),
                method = %request.method(),
                path = %request.uri().path(),
                error = %error,
                "Request event"
            ),
            Event::ResponseProduced { handler, .. } => tracing::debug!(
                event = event.name(),
                method = %request.method(),
                path = %request.uri().path(),
                handler = %handler,
                "Request event"
            ),
            _ => tracing::debug!(
                event = event.name(),
                method = %request.method(),
                path = %request.uri().path(),
                "Request event"
            ),
        }
    }
}
