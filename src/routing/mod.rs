//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     RoutesModule::routes(&mut RouterRegistry)
//!     → path.rs (compile patterns into parts)
//!     → registry.rs (bind handler names, params, aliases)
//!     → Router::new (validate, freeze)
//!
//! Per request:
//!     method + raw path + query
//!     → Router::match_request (first satisfiable route wins)
//!     → RouteMatch { handler, actions, params }
//!
//! Reverse:
//!     name + params → alias → first satisfiable route → Path::render
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Registration order is match and reverse priority
//! - Deterministic: same input always matches same route

pub mod dump;
pub mod path;
pub mod registry;
pub mod router;

pub use path::{url_title, Params, Path, PathError};
pub use registry::{HandlerActions, ReverseError, Route, RouteMatch, RouterRegistry, RoutesModule};
pub use router::{Router, RouterError, ERROR_HANDLER, NOTFOUND_HANDLER};
