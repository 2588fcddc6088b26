//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: one fallback feeding every request to the dispatcher
//! - Wire up middleware (tracing, request ID)
//! - Buffer request bodies up to the configured limit
//! - Bind server to listener, shut down gracefully

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::schema::ListenerConfig;
use crate::http::handler::RequestHandler;
use crate::http::request::Tls;
use crate::lifecycle::Shutdown;

/// State injected into the fallback.
#[derive(Clone)]
struct ServerState {
    handler: RequestHandler,
    max_body_size: usize,
}

/// HTTP server in front of the dispatcher.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(handler: RequestHandler, config: &ListenerConfig) -> Self {
        Self {
            router: build_router(handler, config.max_body_size),
        }
    }

    /// The axum router, e.g. for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` triggers.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(handler: RequestHandler, max_body_size: usize) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(ServerState {
            handler,
            max_body_size,
        })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn dispatch(State(state): State<ServerState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();

    let declared = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > state.max_body_size) {
        return payload_too_large();
    }

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(error = %err, limit = state.max_body_size, "Request body rejected");
            return payload_too_large();
        }
    };

    let forwarded_https = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("https"));
    if forwarded_https {
        parts.extensions.insert(Tls);
    }

    state.handler.handle(Request::from_parts(parts, body)).await
}

fn payload_too_large() -> Response {
    (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response()
}
