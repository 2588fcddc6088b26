//! HTTP request handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum fallback, request ID, body buffering)
//!     → handler.rs (session load, route match, events)
//!     → filter.rs (FilterChain → action.rs)
//!     → response.rs (Reply::apply → ResponseWriter, cache.rs headers)
//!     → handler.rs (session save, post-apply callbacks)
//!     → Send to client
//! ```

pub mod action;
pub mod cache;
pub mod context;
pub mod filter;
pub mod filters;
pub mod handler;
pub mod request;
pub mod responder;
pub mod response;
pub mod server;

pub use action::{Action, DataAction};
pub use cache::{CacheDirective, CacheDirectiveBuilder, Visibility};
pub use context::Context;
pub use filter::{ApplyOutcome, Filter, FilterChain, Filters};
pub use handler::RequestHandler;
pub use request::{Request, Tls};
pub use responder::Responder;
pub use response::{BoxReply, Reply, ResponseWriter};
pub use server::{build_router, HttpServer};
