//! Per-request view handed to filters and actions.
//!
//! # Responsibilities
//! - Expose method, URI, headers and the buffered body
//! - Expose the session, resolved route params and matched handler name
//! - Parse query and url-encoded form values on demand
//! - Track background work spawned while handling the request
//!
//! # Design Decisions
//! - Cheap to clone: one `Arc` around immutable request data
//! - Lookups return `Option`; a missing value is never a panic

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::http::{header, request::Parts, HeaderMap, Method, Uri};
use serde_json::Value;
use tokio::sync::Notify;
use url::form_urlencoded;

use crate::routing::path::Params;
use crate::session::Session;

/// Marker extension for requests that arrived over TLS.
#[derive(Debug, Clone, Copy)]
pub struct Tls;

/// A single inbound request with its session and resolved route.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

#[derive(Clone)]
struct Inner {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    tls: bool,
    session: Arc<Session>,
    handler_name: Option<String>,
    params: Params,
    values: Arc<Mutex<HashMap<String, Value>>>,
    background: BackgroundWork,
}

impl Request {
    /// Build a request from transport parts and the buffered body.
    pub fn new(parts: Parts, body: Bytes, session: Arc<Session>) -> Self {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let tls = parts.extensions.get::<Tls>().is_some();

        Self {
            inner: Arc::new(Inner {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
                remote_addr,
                tls,
                session,
                handler_name: None,
                params: Params::new(),
                values: Arc::default(),
                background: BackgroundWork::default(),
            }),
        }
    }

    /// Attach the matched handler name and its resolved params.
    pub fn with_route(mut self, handler_name: impl Into<String>, params: Params) -> Self {
        let inner = Arc::make_mut(&mut self.inner);
        inner.handler_name = Some(handler_name.into());
        inner.params = params;
        self
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.inner.body
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    /// Name of the matched route handler, if any route matched.
    pub fn handler_name(&self) -> Option<&str> {
        self.inner.handler_name.as_deref()
    }

    /// Whether the request was matched to `name`.
    pub fn has_handler(&self, name: &str) -> bool {
        self.handler_name() == Some(name)
    }

    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name).map(String::as_str)
    }

    /// All query pairs in order of appearance.
    pub fn query(&self) -> Vec<(String, String)> {
        self.inner
            .uri
            .query()
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn query_all(&self, name: &str) -> Vec<String> {
        select(self.query(), name)
    }

    /// First query value for `name`.
    pub fn query1(&self, name: &str) -> Option<String> {
        self.query_all(name).into_iter().next()
    }

    /// Url-encoded body values followed by query values.
    pub fn form(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = if self.is_form_encoded() {
            form_urlencoded::parse(&self.inner.body).into_owned().collect()
        } else {
            Vec::new()
        };
        pairs.extend(self.query());
        pairs
    }

    pub fn form_all(&self, name: &str) -> Vec<String> {
        select(self.form(), name)
    }

    pub fn form1(&self, name: &str) -> Option<String> {
        self.form_all(name).into_iter().next()
    }

    fn is_form_encoded(&self) -> bool {
        self.inner
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
    }

    /// Client addresses: `X-Forwarded-For` entries first, then the peer address.
    pub fn remote_address(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self
            .inner
            .headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect();
        if let Some(addr) = self.inner.remote_addr {
            addrs.push(addr.ip().to_string());
        }
        addrs
    }

    /// Host from the `Host` header, else the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.inner
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.inner.uri.authority().map(|a| a.as_str()))
    }

    pub fn is_tls(&self) -> bool {
        self.inner.tls
    }

    /// Store a request-scoped value, e.g. data collected for partial rendering.
    pub fn set_value(&self, key: impl Into<String>, value: Value) {
        self.inner
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.inner
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn values(&self) -> HashMap<String, Value> {
        self.inner
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start tracked background work that must finish before the response is sent.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.background.spawn(fut);
    }

    pub fn background(&self) -> &BackgroundWork {
        &self.inner.background
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.inner.method)
            .field("uri", &self.inner.uri)
            .field("handler", &self.inner.handler_name)
            .field("params", &self.inner.params)
            .finish_non_exhaustive()
    }
}

fn select(pairs: Vec<(String, String)>, name: &str) -> Vec<String> {
    pairs
        .into_iter()
        .filter(|(k, _)| k == name)
        .map(|(_, v)| v)
        .collect()
}

/// Counter of in-flight background tasks for one request.
#[derive(Clone, Default)]
pub struct BackgroundWork {
    inner: Arc<Pending>,
}

#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    done: Notify,
}

struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.done.notify_waiters();
        }
    }
}

impl BackgroundWork {
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        let guard = PendingGuard(self.inner.clone());
        tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });
    }

    pub fn pending(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Resolve once every tracked task has finished.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
