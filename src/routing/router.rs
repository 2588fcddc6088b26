//! Application-scope router.
//!
//! # Responsibilities
//! - Own the frozen registry
//! - Resolve handler names to root-relative or absolute URLs
//! - Call data actions by handler name
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - An explicit external base wins over anything derived from the request

use axum::http::Method;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::schema::RouterConfig;
use crate::http::{Context, Request};
use crate::routing::path::{Params, PathError};
use crate::routing::registry::{ReverseError, RouteMatch, RouterRegistry};

/// Reserved handler invoked with the error injected into the context.
pub const ERROR_HANDLER: &str = "core.error";

/// Reserved handler invoked when no route matched.
pub const NOTFOUND_HANDLER: &str = "core.notfound";

/// Router setup and data lookup failures.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("the handler {handler:?} has no controller, registered for path {path:?}")]
    MissingController { handler: String, path: String },

    #[error("reserved handler {0:?} has no any-action")]
    MissingReservedHandler(String),

    #[error("invalid external base url {url:?}: {source}")]
    InvalidBase {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("data controller {0:?} not found")]
    DataControllerNotFound(String),

    #[error("{0:?} is not a data controller")]
    NotDataController(String),

    #[error("data controller {0:?} exceeded the request deadline")]
    DeadlineExceeded(String),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Frozen registry plus URL base configuration.
#[derive(Debug)]
pub struct Router {
    registry: RouterRegistry,
    scheme: String,
    host: String,
    path: String,
    external: Option<Url>,
}

impl Router {
    /// Freeze `registry`. Every route must point at a registered handler.
    pub fn new(registry: RouterRegistry, config: &RouterConfig) -> Result<Self, RouterError> {
        for route in registry.routes() {
            if registry.actions(route.handler_name()).is_none() {
                return Err(RouterError::MissingController {
                    handler: route.handler_name().to_string(),
                    path: route.path().pattern().to_string(),
                });
            }
        }

        let external = match config.external.trim() {
            "" => None,
            raw => Some(Url::parse(raw).map_err(|source| RouterError::InvalidBase {
                url: raw.to_string(),
                source,
            })?),
        };

        Ok(Self {
            registry,
            scheme: config.scheme.clone(),
            host: config.host.clone(),
            path: config.path.clone(),
            external,
        })
    }

    pub fn registry(&self) -> &RouterRegistry {
        &self.registry
    }

    pub fn match_request(&self, method: &Method, path: &str, query: Option<&str>) -> Option<RouteMatch> {
        self.registry.match_request(method, path, query)
    }

    /// Root-relative URL under the configured base path. An empty name yields the base itself.
    pub fn relative(&self, name: &str, params: &Params) -> Result<String, ReverseError> {
        let base = if self.path.is_empty() { "/" } else { self.path.as_str() };
        if name.is_empty() {
            return Ok(base.to_string());
        }
        let reversed = self.registry.reverse(name, params)?;
        Ok(join(base, &reversed))
    }

    /// Fully qualified URL. Prefers the external base, then the configured
    /// scheme and host, then what the request tells about itself.
    pub fn absolute(&self, req: Option<&Request>, name: &str, params: &Params) -> Result<String, ReverseError> {
        if let Some(external) = &self.external {
            let origin = external.origin().ascii_serialization();
            let reversed = if name.is_empty() {
                String::from("/")
            } else {
                self.registry.reverse(name, params)?
            };
            return Ok(format!("{}{}", origin, join(external.path(), &reversed)));
        }

        let scheme = match (self.scheme.as_str(), req) {
            ("", Some(req)) if req.is_tls() => "https",
            ("", _) => "http",
            (scheme, _) => scheme,
        };
        let host = match (self.host.as_str(), req) {
            ("", Some(req)) => req.host().unwrap_or_default(),
            (host, _) => host,
        };
        let relative = self.relative(name, params)?;
        Ok(format!("{scheme}://{host}{relative}"))
    }

    /// Call the data action registered under `handler`.
    pub async fn data(
        &self,
        ctx: &Context,
        req: &Request,
        handler: &str,
        params: Params,
    ) -> Result<Value, RouterError> {
        let actions = self
            .registry
            .actions(handler)
            .ok_or_else(|| RouterError::DataControllerNotFound(handler.to_string()))?;
        let action = actions
            .data()
            .ok_or_else(|| RouterError::NotDataController(handler.to_string()))?;

        ctx.run(action.call(ctx.clone(), req.clone(), params))
            .await
            .map_err(|_| RouterError::DeadlineExceeded(handler.to_string()))
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::HttpResponse;
    use crate::http::Tls;
    use crate::session::{SaveMode, Session};
    use axum::body::Bytes;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> RouterRegistry {
        let mut registry = RouterRegistry::new();
        registry.handle_any("page.view", |_ctx: Context, _req: Request| async {
            HttpResponse::new(StatusCode::OK, "page")
        });
        registry.handle_data("page.view", |_ctx: Context, _req: Request, params: Params| async move {
            json!({ "page": params.get("page") })
        });
        registry.handle_get("plain", |_ctx: Context, _req: Request| async {
            HttpResponse::new(StatusCode::OK, "plain")
        });
        registry.route("/page/:page", "page.view(page)").unwrap();
        registry
    }

    fn request(host: &str, tls: bool) -> Request {
        let mut builder = axum::http::Request::builder().uri("/").header("host", host);
        if tls {
            builder = builder.extension(Tls);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        Request::new(parts, Bytes::new(), Arc::new(Session::empty(SaveMode::Always)))
    }

    fn params(page: &str) -> Params {
        Params::from([("page".to_string(), page.to_string())])
    }

    #[test]
    fn test_missing_controller_rejected() {
        let mut registry = RouterRegistry::new();
        registry.route("/x", "nobody").unwrap();
        let err = Router::new(registry, &RouterConfig::default()).unwrap_err();
        assert!(matches!(err, RouterError::MissingController { .. }));
    }

    #[test]
    fn test_relative_under_base_path() {
        let config = RouterConfig {
            path: "/shop/".into(),
            ..RouterConfig::default()
        };
        let router = Router::new(registry(), &config).unwrap();
        assert_eq!(router.relative("page.view", &params("a")).unwrap(), "/shop/page/a");
        assert_eq!(router.relative("", &Params::new()).unwrap(), "/shop/");

        let router = Router::new(registry(), &RouterConfig::default()).unwrap();
        assert_eq!(router.relative("page.view", &params("a")).unwrap(), "/page/a");
    }

    #[test]
    fn test_absolute_from_request() {
        let router = Router::new(registry(), &RouterConfig::default()).unwrap();
        let req = request("example.com:8080", true);
        assert_eq!(
            router.absolute(Some(&req), "page.view", &params("a")).unwrap(),
            "https://example.com:8080/page/a"
        );

        let req = request("example.com", false);
        assert_eq!(
            router.absolute(Some(&req), "page.view", &params("a")).unwrap(),
            "http://example.com/page/a"
        );
    }

    #[test]
    fn test_absolute_prefers_configuration() {
        let config = RouterConfig {
            scheme: "https".into(),
            host: "configured.test".into(),
            ..RouterConfig::default()
        };
        let router = Router::new(registry(), &config).unwrap();
        let req = request("example.com", false);
        assert_eq!(
            router.absolute(Some(&req), "page.view", &params("a")).unwrap(),
            "https://configured.test/page/a"
        );

        let config = RouterConfig {
            external: "https://cdn.test/base/".into(),
            ..RouterConfig::default()
        };
        let router = Router::new(registry(), &config).unwrap();
        assert_eq!(
            router.absolute(Some(&req), "page.view", &params("a")).unwrap(),
            "https://cdn.test/base/page/a"
        );
    }

    #[test]
    fn test_invalid_external_base() {
        let config = RouterConfig {
            external: "not a url".into(),
            ..RouterConfig::default()
        };
        assert!(matches!(
            Router::new(registry(), &config),
            Err(RouterError::InvalidBase { .. })
        ));
    }

    #[tokio::test]
    async fn test_data_lookup() {
        let router = Router::new(registry(), &RouterConfig::default()).unwrap();
        let ctx = Context::new();
        let req = request("example.com", false);

        let value = router.data(&ctx, &req, "page.view", params("x")).await.unwrap();
        assert_eq!(value, json!({ "page": "x" }));

        assert!(matches!(
            router.data(&ctx, &req, "missing", Params::new()).await,
            Err(RouterError::DataControllerNotFound(_))
        ));
        assert!(matches!(
            router.data(&ctx, &req, "plain", Params::new()).await,
            Err(RouterError::NotDataController(_))
        ));
    }
}
