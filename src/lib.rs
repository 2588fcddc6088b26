//! webcore: request routing, filtering, dispatch and sessions for web applications.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum fallback, request id, body limit)
//!                         │
//!                         ▼
//!                     http::handler ──── session::SessionStore (load/save)
//!                         │
//!                         ├── routing::Router (match, reverse, data)
//!                         ├── http::filter (FilterChain → action)
//!                         ├── events (RequestStarted → RequestFinished)
//!                         ▼
//!                     Reply::apply → ResponseWriter
//!     ◀────────────── axum Response
//!
//!     Cross-cutting: config, observability (tracing + metrics), lifecycle
//! ```

// Core subsystems
pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod http;
pub mod routing;
pub mod session;
pub mod template;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use app::AppBuilder;
pub use config::AppConfig;
pub use error::WebError;
pub use http::{HttpServer, Request, RequestHandler, Responder};
pub use lifecycle::Shutdown;
pub use routing::{Router, RouterRegistry};
pub use session::{SaveMode, Session, SessionStore};
