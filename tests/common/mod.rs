//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request as HttpRequest, StatusCode};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use webcore::config::{AppConfig, RouteConfig};
use webcore::http::response::HttpResponse;
use webcore::http::{build_router, Context, Reply, Request, ResponseWriter};
use webcore::lifecycle::Shutdown;
use webcore::routing::{Params, PathError, RouterRegistry};
use webcore::session::{MemoryBackend, SessionKey};
use webcore::{AppBuilder, HttpServer, RequestHandler, WebError};

pub const COUNTER: SessionKey<u64> = SessionKey::new("counter");

pub async fn page(_ctx: Context, req: Request) -> HttpResponse {
    HttpResponse::new(StatusCode::OK, format!("page {}", req.param("id").unwrap_or_default()))
}

pub async fn boom(_ctx: Context, _req: Request) -> HttpResponse {
    panic!("kaboom")
}

pub async fn count(_ctx: Context, req: Request) -> HttpResponse {
    let session = req.session();
    let count = session.get(&COUNTER).ok().flatten().unwrap_or(0) + 1;
    if let Err(err) = session.set(&COUNTER, &count) {
        return HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
    }
    HttpResponse::new(StatusCode::OK, count.to_string())
}

pub async fn slow(_ctx: Context, _req: Request) -> HttpResponse {
    tokio::time::sleep(Duration::from_secs(10)).await;
    HttpResponse::new(StatusCode::OK, "too late")
}

/// Writes part of a body, then fails.
pub struct Unserializable;

impl Reply for Unserializable {
    fn apply<'a>(
        self: Box<Self>,
        _ctx: &'a Context,
        rw: &'a mut ResponseWriter,
    ) -> BoxFuture<'a, Result<(), WebError>> {
        Box::pin(async move {
            rw.write_header(StatusCode::OK);
            rw.write(b"partial");
            Err(WebError::msg("cannot serialize"))
        })
    }
}

pub async fn add_flash(_ctx: Context, req: Request) -> HttpResponse {
    req.session().add_flash(json!("hello"), Some("info"));
    HttpResponse::new(StatusCode::NO_CONTENT, "")
}

/// Handlers and routes shared by the integration tests.
pub fn routes(registry: &mut RouterRegistry) -> Result<(), PathError> {
    registry.handle_get("page.view", page);
    registry.route("/page/:id", "page.view")?;

    registry.handle_get("item", |_ctx: Context, _req: Request| async {
        HttpResponse::new(StatusCode::OK, "get")
    });
    registry.handle_any("item", |_ctx: Context, _req: Request| async {
        HttpResponse::new(StatusCode::OK, "any")
    });
    registry.route("/item", "item")?;

    registry.handle_any("boom", boom);
    registry.route("/boom", "boom")?;

    registry.handle_any("session.count", count);
    registry.route("/count", "session.count")?;

    registry.handle_any("slow", slow);
    registry.route("/slow", "slow")?;

    registry.handle_any("broken", |_ctx: Context, _req: Request| async { Unserializable });
    registry.route("/broken", "broken")?;

    registry.handle_post("flash.add", add_flash);
    registry.route("/flash", "flash.add")?;

    registry.handle_data("answer", |_ctx: Context, _req: Request, _params: Params| async {
        json!({"answer": 42})
    });
    Ok(())
}

/// Config with a redirect route declared the way an operator would.
pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.routes.push(RouteConfig {
        path: "/old".into(),
        controller: "core.redirect(to=\"page.view\", id=\"1\")".into(),
        name: None,
    });
    config
}

pub fn app(config: AppConfig) -> AppBuilder {
    AppBuilder::new(config)
        .routes_module(routes)
        .session_backend(Arc::new(MemoryBackend::new()))
}

pub fn handler() -> RequestHandler {
    app(config()).build().unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// `name=value` part of the first `Set-Cookie` header.
    pub fn cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(String::from)
    }
}

/// Send one request through the full middleware stack in-process.
pub async fn send(handler: &RequestHandler, max_body_size: usize, request: HttpRequest<Body>) -> TestResponse {
    let response = build_router(handler.clone(), max_body_size)
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    TestResponse { status, headers, body }
}

pub async fn get(handler: &RequestHandler, uri: &str) -> TestResponse {
    send(handler, 1024, HttpRequest::get(uri).body(Body::empty()).unwrap()).await
}

/// Start a server on an ephemeral port.
pub async fn start_server(handler: RequestHandler) -> (SocketAddr, Shutdown, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(handler, &AppConfig::default().listener);
    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            server.run(listener, shutdown).await.unwrap();
        })
    };
    (addr, shutdown, task)
}
