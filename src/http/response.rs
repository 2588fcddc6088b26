//! Results produced by actions and their application to the transport.
//!
//! # Responsibilities
//! - Buffer status, headers and body in a [`ResponseWriter`]
//! - Define the [`Reply`] contract: a result knows how to apply itself
//! - Provide the built-in replies (plain, data, render, redirects, errors)
//!
//! # Data Flow
//! ```text
//! action → Box<dyn Reply>
//!     → filters may wrap/decorate it
//!     → session headers written to ResponseWriter
//!     → Reply::apply(ctx, &mut ResponseWriter)
//!     → ResponseWriter::into_response() → axum Response
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use crate::error::WebError;
use crate::http::cache::CacheDirective;
use crate::http::context::Context;
use crate::routing::path::Params;
use crate::template::TemplateEngine;

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";

/// Inbound header requesting partial rendering (comma-separated partial names).
pub const X_PARTIAL: &str = "x-partial";

/// Buffered response transport.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status. The first call wins.
    pub fn write_header(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.write_header(StatusCode::OK);
        self.body.extend_from_slice(bytes);
    }

    /// Status written so far, 200 if none was written.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn status_written(&self) -> bool {
        self.status.is_some()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn bytes_written(&self) -> usize {
        self.body.len()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Drop everything written so far.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

/// A result that can be applied to the transport.
pub trait Reply: Send {
    fn apply<'a>(
        self: Box<Self>,
        ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>>;
}

/// Type-erased reply as returned by actions and filters.
pub type BoxReply = Box<dyn Reply>;

impl Reply for Box<dyn Reply> {
    fn apply<'a>(
        self: Box<Self>,
        ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>> {
        (*self).apply(ctx, rw)
    }
}

/// Status, headers and a fixed body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Caching headers, written over `headers` on apply.
    pub cache_directive: Option<CacheDirective>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::with_headers(status, HeaderMap::new(), body)
    }

    fn with_headers(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            cache_directive: None,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn cache(mut self, directive: CacheDirective) -> Self {
        self.cache_directive = Some(directive);
        self
    }

    fn write_to(mut self, rw: &mut ResponseWriter) {
        if let Some(directive) = &self.cache_directive {
            directive.apply_headers(&mut self.headers);
        }
        for (name, value) in &self.headers {
            rw.headers_mut().append(name, value.clone());
        }
        rw.write_header(self.status);
        if !self.body.is_empty() {
            rw.write(&self.body);
        }
    }
}

impl Reply for HttpResponse {
    fn apply<'a>(
        self: Box<Self>,
        _ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>> {
        Box::pin(async move {
            self.write_to(rw);
            Ok(())
        })
    }
}

/// Serializes its data as JSON.
#[derive(Debug, Clone)]
pub struct DataResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub data: Value,
    pub cache_directive: Option<CacheDirective>,
}

impl DataResponse {
    pub fn new(data: Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            data,
            cache_directive: None,
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn cache(mut self, directive: CacheDirective) -> Self {
        self.cache_directive = Some(directive);
        self
    }

    /// Status, headers and cache directive carried over to a response with `body`.
    fn respond(self, body: impl Into<Bytes>) -> HttpResponse {
        HttpResponse {
            cache_directive: self.cache_directive,
            ..HttpResponse::with_headers(self.status, self.headers, body)
        }
    }

    fn into_http(self) -> Result<HttpResponse, WebError> {
        let body = serde_json::to_vec(&self.data)?;
        let mut response = self.respond(body);
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        Ok(response)
    }
}

impl Reply for DataResponse {
    fn apply<'a>(
        self: Box<Self>,
        _ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>> {
        Box::pin(async move {
            self.into_http()?.write_to(rw);
            Ok(())
        })
    }
}

/// Renders a template, or its data as JSON when no engine is configured.
///
/// When the current request carries `X-Partial` and the engine supports
/// partials, the named partials are rendered and returned in a JSON envelope
/// together with the request's collected values.
#[derive(Clone)]
pub struct RenderResponse {
    pub template: String,
    pub data: DataResponse,
    engine: Option<Arc<dyn TemplateEngine>>,
}

impl RenderResponse {
    pub fn new(template: impl Into<String>, data: Value, engine: Option<Arc<dyn TemplateEngine>>) -> Self {
        Self {
            template: template.into(),
            data: DataResponse::new(data),
            engine,
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.data.status = status;
        self
    }

    async fn render(self, ctx: &Context) -> Result<HttpResponse, WebError> {
        let Some(engine) = self.engine else {
            return self.data.into_http();
        };

        let requested: Vec<String> = ctx
            .request()
            .and_then(|req| req.headers().get(X_PARTIAL))
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if let (false, Some(partial)) = (requested.is_empty(), engine.partials()) {
            let rendered = partial
                .render_partials(ctx, &self.template, &self.data.data, &requested)
                .await?;
            let values: BTreeMap<String, Value> = ctx
                .request()
                .map(|req| req.values().into_iter().collect())
                .unwrap_or_default();
            let body = serde_json::to_vec(&json!({
                "partials": rendered,
                "data": values,
            }))?;
            let mut response = self.data.respond(body);
            response
                .headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
            return Ok(response);
        }

        let body = engine.render(ctx, &self.template, &self.data.data).await?;
        let mut response = self.data.respond(body);
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_HTML));
        Ok(response)
    }
}

impl Reply for RenderResponse {
    fn apply<'a>(
        self: Box<Self>,
        ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>> {
        Box::pin(async move {
            self.render(ctx).await?.write_to(rw);
            Ok(())
        })
    }
}

/// Redirect to a named route, resolved through the context's router at apply time.
#[derive(Debug, Clone)]
pub struct RouteRedirectResponse {
    pub to: String,
    pub params: Params,
    pub status: StatusCode,
    pub headers: HeaderMap,
    fragment: Option<String>,
}

impl RouteRedirectResponse {
    pub fn new(to: impl Into<String>, params: Params) -> Self {
        Self {
            to: to.into(),
            params,
            status: StatusCode::SEE_OTHER,
            headers: HeaderMap::new(),
            fragment: None,
        }
    }

    /// Append `#fragment` to the target URL.
    pub fn fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    pub fn permanent(mut self) -> Self {
        self.status = StatusCode::MOVED_PERMANENTLY;
        self
    }
}

impl Reply for RouteRedirectResponse {
    fn apply<'a>(
        self: Box<Self>,
        ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>> {
        Box::pin(async move {
            let router = ctx
                .router()
                .ok_or_else(|| WebError::msg("no reverse router available"))?;
            let mut location = router.relative(&self.to, &self.params)?;
            if let Some(fragment) = &self.fragment {
                location.push('#');
                location.push_str(fragment);
            }
            write_redirect(rw, self.status, self.headers, &location)
        })
    }
}

/// Redirect to a fixed URL.
#[derive(Debug, Clone)]
pub struct UrlRedirectResponse {
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl UrlRedirectResponse {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: StatusCode::SEE_OTHER,
            headers: HeaderMap::new(),
        }
    }

    pub fn permanent(mut self) -> Self {
        self.status = StatusCode::MOVED_PERMANENTLY;
        self
    }
}

impl Reply for UrlRedirectResponse {
    fn apply<'a>(
        self: Box<Self>,
        _ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>> {
        Box::pin(async move { write_redirect(rw, self.status, self.headers, &self.url) })
    }
}

fn write_redirect(
    rw: &mut ResponseWriter,
    status: StatusCode,
    headers: HeaderMap,
    location: &str,
) -> Result<(), WebError> {
    let location = HeaderValue::from_str(location)
        .map_err(|_| WebError::msg(format!("invalid redirect location {location:?}")))?;
    let mut response = HttpResponse::with_headers(status, headers, Bytes::new());
    response.headers.insert(header::LOCATION, location);
    response.write_to(rw);
    Ok(())
}

/// Error page: renders the error template with `{code, error}` data and
/// falls back to a plain-text body when rendering fails.
#[derive(Clone)]
pub struct ServerErrorResponse {
    pub render: RenderResponse,
    message: String,
}

impl ServerErrorResponse {
    pub fn new(
        message: String,
        template: impl Into<String>,
        status: StatusCode,
        engine: Option<Arc<dyn TemplateEngine>>,
    ) -> Self {
        let data = json!({ "code": status.as_u16(), "error": message });
        Self {
            render: RenderResponse::new(template, data, engine).status(status),
            message,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> StatusCode {
        self.render.data.status
    }
}

impl Reply for ServerErrorResponse {
    fn apply<'a>(
        self: Box<Self>,
        ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>> {
        Box::pin(async move {
            let status = self.status_code();
            match self.render.render(ctx).await {
                Ok(response) => response.write_to(rw),
                Err(err) => {
                    tracing::warn!(error = %err, "Error page rendering failed, writing plain error");
                    HttpResponse::new(status, format!("{}\n", self.message))
                        .header(
                            header::CONTENT_TYPE,
                            HeaderValue::from_static("text/plain; charset=utf-8"),
                        )
                        .write_to(rw);
                }
            }
            Ok(())
        })
    }
}

/// Wraps a reply and sets headers after it was applied, unless already present.
pub struct WithDefaultHeaders {
    inner: BoxReply,
    headers: HeaderMap,
}

impl WithDefaultHeaders {
    pub fn new(inner: BoxReply, headers: HeaderMap) -> Self {
        Self { inner, headers }
    }
}

impl Reply for WithDefaultHeaders {
    fn apply<'a>(
        self: Box<Self>,
        ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>> {
        Box::pin(async move {
            let WithDefaultHeaders { inner, headers } = *self;
            inner.apply(ctx, rw).await?;
            for (name, value) in &headers {
                if !rw.headers().contains_key(name) {
                    rw.headers_mut().insert(name, value.clone());
                }
            }
            Ok(())
        })
    }
}

/// Wraps a reply and adds caching headers to successful responses that did
/// not set `Cache-Control` themselves.
pub struct WithCacheDirective {
    inner: BoxReply,
    directive: CacheDirective,
}

impl WithCacheDirective {
    pub fn new(inner: BoxReply, directive: CacheDirective) -> Self {
        Self { inner, directive }
    }
}

impl Reply for WithCacheDirective {
    fn apply<'a>(
        self: Box<Self>,
        ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>> {
        Box::pin(async move {
            let WithCacheDirective { inner, directive } = *self;
            inner.apply(ctx, rw).await?;
            if rw.status().is_success() && !rw.headers().contains_key(header::CACHE_CONTROL) {
                directive.apply_headers(rw.headers_mut());
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::cache::Visibility;

    #[test]
    fn test_first_status_wins() {
        let mut rw = ResponseWriter::new();
        rw.write(b"hello");
        rw.write_header(StatusCode::NOT_FOUND);
        assert_eq!(rw.status(), StatusCode::OK);
        assert_eq!(rw.bytes_written(), 5);
    }

    #[tokio::test]
    async fn test_data_response_json() {
        let mut rw = ResponseWriter::new();
        let reply: BoxReply = Box::new(DataResponse::new(json!({"a": 1})).status(StatusCode::CREATED));
        reply.apply(&Context::new(), &mut rw).await.unwrap();

        assert_eq!(rw.status(), StatusCode::CREATED);
        assert_eq!(rw.headers()[header::CONTENT_TYPE], CONTENT_TYPE_JSON);
        assert_eq!(rw.body(), br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_render_without_engine_falls_back_to_json() {
        let mut rw = ResponseWriter::new();
        let reply = Box::new(RenderResponse::new("page", json!({"x": "y"}), None));
        reply.apply(&Context::new(), &mut rw).await.unwrap();
        assert_eq!(rw.body(), br#"{"x":"y"}"#);
    }

    #[tokio::test]
    async fn test_server_error_defaults() {
        let mut rw = ResponseWriter::new();
        let reply = Box::new(ServerErrorResponse::new(
            "broken".into(),
            "error/500",
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
        ));
        reply.apply(&Context::new(), &mut rw).await.unwrap();

        assert_eq!(rw.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(rw.body()).unwrap();
        assert_eq!(body, json!({"code": 500, "error": "broken"}));
    }

    #[tokio::test]
    async fn test_url_redirect_and_default_headers() {
        let mut rw = ResponseWriter::new();
        rw.headers_mut()
            .insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));

        let mut defaults = HeaderMap::new();
        defaults.insert("x-frame-options", HeaderValue::from_static("DENY"));
        defaults.insert("x-content-type-options", HeaderValue::from_static("nosniff"));

        let inner: BoxReply = Box::new(UrlRedirectResponse::new("https://example.com/").permanent());
        let reply = Box::new(WithDefaultHeaders::new(inner, defaults));
        reply.apply(&Context::new(), &mut rw).await.unwrap();

        assert_eq!(rw.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(rw.headers()[header::LOCATION], "https://example.com/");
        assert_eq!(rw.headers()["x-frame-options"], "SAMEORIGIN");
        assert_eq!(rw.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_cache_directive_applied() {
        let mut rw = ResponseWriter::new();
        let directive = CacheDirective {
            visibility: Some(Visibility::Public),
            max_age: 60,
            ..CacheDirective::default()
        };
        let reply = Box::new(
            HttpResponse::new(StatusCode::OK, "cached")
                .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .cache(directive),
        );
        reply.apply(&Context::new(), &mut rw).await.unwrap();

        assert_eq!(rw.headers()[header::CACHE_CONTROL], "max-age=60, public");
        assert_eq!(rw.headers().get_all(header::CACHE_CONTROL).iter().count(), 1);
        assert!(rw.headers().contains_key(header::EXPIRES));
    }

    #[tokio::test]
    async fn test_data_response_carries_cache_directive() {
        let mut rw = ResponseWriter::new();
        let reply = Box::new(DataResponse::new(json!([])).cache(CacheDirective::no_store()));
        reply.apply(&Context::new(), &mut rw).await.unwrap();
        assert_eq!(rw.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(rw.headers()[header::CONTENT_TYPE], CONTENT_TYPE_JSON);
    }

    #[tokio::test]
    async fn test_default_cache_directive_only_fills_gaps() {
        let apply = |inner: BoxReply| async move {
            let mut rw = ResponseWriter::new();
            let reply = Box::new(WithCacheDirective::new(inner, CacheDirective::no_store()));
            reply.apply(&Context::new(), &mut rw).await.unwrap();
            rw
        };

        let rw = apply(Box::new(HttpResponse::new(StatusCode::OK, "a"))).await;
        assert_eq!(rw.headers()[header::CACHE_CONTROL], "no-store");

        let own = CacheDirective {
            max_age: 5,
            ..CacheDirective::default()
        };
        let rw = apply(Box::new(HttpResponse::new(StatusCode::OK, "b").cache(own))).await;
        assert_eq!(rw.headers()[header::CACHE_CONTROL], "max-age=5");

        let rw = apply(Box::new(HttpResponse::new(StatusCode::NOT_FOUND, "c"))).await;
        assert!(!rw.headers().contains_key(header::CACHE_CONTROL));
    }

    #[tokio::test]
    async fn test_route_redirect_requires_router() {
        let mut rw = ResponseWriter::new();
        let reply = Box::new(RouteRedirectResponse::new("home", Params::new()));
        assert!(reply.apply(&Context::new(), &mut rw).await.is_err());
    }
}
