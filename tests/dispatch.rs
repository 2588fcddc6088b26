//! In-process dispatch tests through the full middleware stack.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request as HttpRequest, StatusCode};
use serde_json::json;

use webcore::events::{Event, Subscriber};
use webcore::http::filter::{Filter, FilterChain};
use webcore::http::response::HttpResponse;
use webcore::http::{BoxReply, Context, Request};
use webcore::routing::{PathError, RouterRegistry, ERROR_HANDLER};

mod common;

#[tokio::test]
async fn test_method_action_beats_any() {
    let handler = common::handler();

    let res = common::get(&handler, "/item").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text(), "get");

    let req = HttpRequest::post("/item").body(Body::empty()).unwrap();
    let res = common::send(&handler, 1024, req).await;
    assert_eq!(res.text(), "any");
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let handler = common::handler();
    let res = common::get(&handler, "/nothing/here").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["code"], 404);
}

#[tokio::test]
async fn test_missing_method_action_is_not_found() {
    let handler = common::handler();
    let req = HttpRequest::delete("/page/1").body(Body::empty()).unwrap();
    let res = common::send(&handler, 1024, req).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_route_params() {
    let handler = common::handler();
    let res = common::get(&handler, "/page/42").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text(), "page 42");
}

#[tokio::test]
async fn test_panic_goes_to_error_handler() {
    let handler = common::handler();
    let res = common::get(&handler, "/boom").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = res.json();
    assert_eq!(body["code"], 500);
    assert!(body["error"].as_str().unwrap().contains("kaboom"));
}

#[tokio::test]
async fn test_panicking_error_handler_yields_plain_500() {
    let handler = common::app(common::config())
        .routes_module(|registry: &mut RouterRegistry| -> Result<(), PathError> {
            registry.handle_any(ERROR_HANDLER, common::boom);
            Ok(())
        })
        .build()
        .unwrap();

    let res = common::get(&handler, "/boom").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
    assert!(res.text().contains("kaboom"));
}

#[tokio::test]
async fn test_apply_failure_goes_to_error_handler() {
    let handler = common::handler();
    let res = common::get(&handler, "/broken").await;

    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json(), json!({"code": 500, "error": "cannot serialize"}));
    assert!(!res.text().contains("partial"));
}

#[tokio::test]
async fn test_deadline_exceeded_is_unavailable() {
    let mut config = common::config();
    config.router.timeout_ms = 50;
    let handler = common::app(config).build().unwrap();

    let started = Instant::now();
    let res = tokio::time::timeout(Duration::from_secs(5), common::get(&handler, "/slow"))
        .await
        .expect("deadline ends the request");

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.json(), json!({"code": 503, "error": "deadline exceeded"}));
}

#[tokio::test]
async fn test_session_cookie_round_trip() {
    let handler = common::handler();

    let first = common::get(&handler, "/count").await;
    assert_eq!(first.text(), "1");
    let cookie = first.cookie().expect("session cookie");

    let req = HttpRequest::get("/count")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let second = common::send(&handler, 1024, req).await;
    assert_eq!(second.text(), "2");

    let fresh = common::get(&handler, "/count").await;
    assert_eq!(fresh.text(), "1");
    assert_ne!(fresh.cookie().unwrap(), cookie);
}

#[tokio::test]
async fn test_flash_messages_via_data_controller() {
    let handler = common::handler();

    let req = HttpRequest::post("/flash").body(Body::empty()).unwrap();
    let res = common::send(&handler, 1024, req).await;
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    let cookie = res.cookie().unwrap();

    let fetch = || {
        HttpRequest::get("/_core/data/core.flash")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap()
    };
    let res = common::send(&handler, 1024, fetch()).await;
    assert_eq!(res.json(), json!([{"type": "info", "message": "hello"}]));

    let res = common::send(&handler, 1024, fetch()).await;
    assert_eq!(res.json(), json!([]));
}

#[tokio::test]
async fn test_data_controller() {
    let handler = common::handler();

    let res = common::get(&handler, "/_core/data/answer").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json(), json!({"answer": 42}));

    let res = common::get(&handler, "/_core/data/page.view").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    let res = common::get(&handler, "/_core/data/unknown").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_config_redirect_route() {
    let handler = common::handler();
    let res = common::get(&handler, "/old").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.headers[header::LOCATION], "/page/1");
}

#[tokio::test]
async fn test_prefix_is_stripped() {
    let mut config = common::config();
    config.router.prefix = "/app".into();
    let handler = common::app(config).build().unwrap();

    let res = common::get(&handler, "/app/page/7").await;
    assert_eq!(res.text(), "page 7");
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let handler = common::handler();
    let req = HttpRequest::post("/item").body(Body::from(vec![b'x'; 64])).unwrap();
    let res = common::send(&handler, 16, req).await;
    assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_request_id_propagated() {
    let handler = common::handler();
    let res = common::get(&handler, "/page/1").await;
    assert!(res.headers.contains_key("x-request-id"));
}

struct Recording {
    name: &'static str,
    priority: i32,
    seen: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Filter for Recording {
    async fn filter(&self, ctx: Context, req: Request, chain: &mut FilterChain) -> BoxReply {
        self.seen.lock().unwrap().push(self.name);
        chain.next(ctx, req).await
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

struct Deny;

#[async_trait]
impl Filter for Deny {
    async fn filter(&self, ctx: Context, req: Request, chain: &mut FilterChain) -> BoxReply {
        if req.uri().path().starts_with("/page") {
            return Box::new(HttpResponse::new(StatusCode::FORBIDDEN, "denied"));
        }
        chain.next(ctx, req).await
    }
}

#[tokio::test]
async fn test_filters_run_by_priority_and_short_circuit() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recording = |name, priority| {
        Arc::new(Recording {
            name,
            priority,
            seen: seen.clone(),
        })
    };

    let handler = common::app(common::config())
        .filter(recording("low", -5))
        .filter(Arc::new(Deny))
        .filter(recording("high", 10))
        .filter(recording("mid", 0))
        .build()
        .unwrap();

    let res = common::get(&handler, "/item").await;
    assert_eq!(res.text(), "get");
    assert_eq!(*seen.lock().unwrap(), ["high", "mid", "low"]);

    seen.lock().unwrap().clear();
    let res = common::get(&handler, "/page/1").await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(*seen.lock().unwrap(), ["high"]);
}

#[tokio::test]
async fn test_cache_strategy_defaults_get_responses() {
    let mut config = common::config();
    config.cache_strategy.enabled = true;
    config.cache_strategy.is_reusable = true;
    config.cache_strategy.max_cache_lifetime = 60;
    let handler = common::app(config).build().unwrap();

    let res = common::get(&handler, "/page/1").await;
    assert_eq!(res.headers[header::CACHE_CONTROL], "max-age=60, private");
    assert!(res.headers.contains_key(header::EXPIRES));

    let req = HttpRequest::post("/item").body(Body::empty()).unwrap();
    let res = common::send(&handler, 1024, req).await;
    assert!(!res.headers.contains_key(header::CACHE_CONTROL));

    let res = common::get(&handler, "/missing").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert!(!res.headers.contains_key(header::CACHE_CONTROL));

    let res = common::get(&common::handler(), "/page/1").await;
    assert!(!res.headers.contains_key(header::CACHE_CONTROL));
}

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    produced: AtomicUsize,
    finished: AtomicUsize,
}

impl Subscriber for Counting {
    fn notify(&self, _ctx: &Context, event: &Event) {
        let counter = match event {
            Event::RequestStarted { .. } => &self.started,
            Event::ResponseProduced { .. } => &self.produced,
            Event::RequestFinished { .. } => &self.finished,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_events_fire_once_per_request() {
    let counting = Arc::new(Counting::default());
    let handler = common::app(common::config())
        .subscriber(counting.clone())
        .build()
        .unwrap();

    common::get(&handler, "/page/1").await;
    common::get(&handler, "/missing").await;

    assert_eq!(counting.started.load(Ordering::SeqCst), 2);
    assert_eq!(counting.produced.load(Ordering::SeqCst), 2);
    assert_eq!(counting.finished.load(Ordering::SeqCst), 2);
}
