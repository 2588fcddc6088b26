//! Built-in controllers.
//!
//! # Data Flow
//! ```text
//! AppBuilder::build
//!     → register_defaults(registry, responder)
//!         → core.error / core.notfound     (only if the application has none)
//!         → core.redirect*, core.data, core.flash
//!         → route /_core/data/:handler → core.data
//! ```
//!
//! # Design Decisions
//! - Application registrations always win; defaults only fill gaps
//! - Controllers receive the `Responder` at construction time

pub mod data;
pub mod error;
pub mod redirect;

pub use data::{flash_messages, DataController, FlashMessage, FLASH_CATEGORIES};
pub use error::{ErrorController, NotFoundController};
pub use redirect::{Redirect, RedirectKind};

use crate::http::Responder;
use crate::routing::{PathError, RouterRegistry, ERROR_HANDLER, NOTFOUND_HANDLER};

pub const REDIRECT_HANDLER: &str = "core.redirect";
pub const REDIRECT_PERMANENT_HANDLER: &str = "core.redirectPermanent";
pub const REDIRECT_URL_HANDLER: &str = "core.redirectUrl";
pub const REDIRECT_PERMANENT_URL_HANDLER: &str = "core.redirectPermanentUrl";
pub const DATA_HANDLER: &str = "core.data";
pub const FLASH_HANDLER: &str = "core.flash";

/// Path serving the data actions.
pub const DATA_ROUTE: &str = "/_core/data/:handler";

/// Register every built-in controller the application did not provide itself.
pub fn register_defaults(registry: &mut RouterRegistry, responder: &Responder) -> Result<(), PathError> {
    if !registry.has_any(ERROR_HANDLER) {
        registry.handle_any(ERROR_HANDLER, ErrorController::new(responder.clone()));
    }
    if !registry.has_any(NOTFOUND_HANDLER) {
        registry.handle_any(NOTFOUND_HANDLER, NotFoundController::new(responder.clone()));
    }

    let redirects = [
        (REDIRECT_HANDLER, RedirectKind::Route),
        (REDIRECT_PERMANENT_HANDLER, RedirectKind::RoutePermanent),
        (REDIRECT_URL_HANDLER, RedirectKind::Url),
        (REDIRECT_PERMANENT_URL_HANDLER, RedirectKind::UrlPermanent),
    ];
    for (name, kind) in redirects {
        if registry.actions(name).is_none() {
            registry.handle_any(name, Redirect::new(responder.clone(), kind));
        }
    }

    if registry.actions(DATA_HANDLER).is_none() {
        registry.handle_get(DATA_HANDLER, DataController::new(responder.clone()));
        registry.route(DATA_ROUTE, DATA_HANDLER)?;
    }
    if !registry.has_data(FLASH_HANDLER) {
        registry.handle_data(FLASH_HANDLER, flash_messages);
    }

    tracing::debug!(handlers = registry.handler_names().len(), "Built-in controllers registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Context, Request};
    use crate::routing::Params;
    use axum::http::Method;

    #[test]
    fn test_defaults_fill_gaps_only() {
        let mut registry = RouterRegistry::new();
        registry.handle_any(ERROR_HANDLER, |_ctx: Context, _req: Request| async { Responder::default().todo() });
        register_defaults(&mut registry, &Responder::default()).unwrap();

        assert!(registry.has_any(NOTFOUND_HANDLER));
        assert!(registry.has_any(REDIRECT_PERMANENT_URL_HANDLER));
        assert!(registry.has(&Method::GET, DATA_HANDLER));
        assert!(registry.has_data(FLASH_HANDLER));
        let params: Params = [("handler".to_string(), "core.flash".to_string())].into();
        assert_eq!(registry.reverse(DATA_HANDLER, &params).unwrap(), "/_core/data/core.flash");

        let before = registry.routes().len();
        register_defaults(&mut registry, &Responder::default()).unwrap();
        assert_eq!(registry.routes().len(), before);
    }
}
