//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! application. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};

use crate::session::SaveMode;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// URL base and request handling settings.
    pub router: RouterConfig,

    /// Session cookie and save policy.
    pub session: SessionConfig,

    /// Routes declared in configuration, registered before module routes.
    pub routes: Vec<RouteConfig>,

    /// Templates used by the error responders.
    pub templates: TemplatesConfig,

    /// Default caching headers for GET responses.
    pub cache_strategy: CacheStrategyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Expose error chains in error responses.
    pub debug: bool,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3322").
    pub bind_address: String,

    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3322".to_string(),
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Scheme for absolute URLs; derived from the request when empty.
    pub scheme: String,

    /// Host for absolute URLs; derived from the request when empty.
    pub host: String,

    /// Base path prepended to reversed URLs.
    pub path: String,

    /// Explicit external base URL, wins over scheme/host/path for absolute URLs.
    pub external: String,

    /// Path prefix stripped from inbound requests before matching.
    pub prefix: String,

    /// Request deadline in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            scheme: String::new(),
            host: String::new(),
            path: "/".to_string(),
            external: String::new(),
            prefix: String::new(),
            timeout_ms: 30_000,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name.
    pub name: String,

    pub save_mode: SaveMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "webcore".to_string(),
            save_mode: SaveMode::Always,
        }
    }
}

/// A route declared in configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path pattern, e.g. `/page/:page`.
    pub path: String,

    /// Handler spec, e.g. `page.view(page)`.
    pub controller: String,

    /// Optional alias resolving to `controller`.
    #[serde(default)]
    pub name: Option<String>,
}

/// Templates rendered by the error responders.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub not_found: String,
    pub forbidden: String,
    pub unavailable: String,
    pub error: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            not_found: "error/404".to_string(),
            forbidden: "error/403".to_string(),
            unavailable: "error/503".to_string(),
            error: "error/500".to_string(),
        }
    }
}

/// Cache directive applied to successful GET responses that carry none.
///
/// With `is_reusable` off the default is `no-store`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheStrategyConfig {
    /// Install the cache strategy filter.
    pub enabled: bool,

    pub is_reusable: bool,

    /// Clients must revalidate before reuse (`no-cache`).
    pub revalidate_each_time: bool,

    /// `public` instead of `private`.
    pub allow_intermediate_caches: bool,

    /// Seconds, becomes `max-age`.
    pub max_cache_lifetime: u32,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3322");
        assert_eq!(config.router.path, "/");
        assert_eq!(config.session.save_mode, SaveMode::Always);
        assert!(config.routes.is_empty());
        assert!(!config.cache_strategy.enabled);
    }

    #[test]
    fn test_full_config_parses() {
        let config: AppConfig = toml::from_str(
            r#"
            debug = true

            [router]
            host = "example.com"
            prefix = "/app"
            timeout_ms = 500

            [session]
            name = "sid"
            save_mode = "OnWrite"

            [observability]
            log_format = "json"

            [cache_strategy]
            enabled = true
            is_reusable = true
            max_cache_lifetime = 300

            [[routes]]
            path = "/"
            controller = 'page.view(page="home")'
            name = "home"
            "#,
        )
        .unwrap();

        assert!(config.debug);
        assert_eq!(config.router.timeout_ms, 500);
        assert_eq!(config.session.save_mode, SaveMode::OnWrite);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.routes[0].name.as_deref(), Some("home"));
        assert_eq!(config.templates.error, "error/500");
        assert!(config.cache_strategy.enabled && config.cache_strategy.is_reusable);
        assert_eq!(config.cache_strategy.max_cache_lifetime, 300);
        assert!(!config.cache_strategy.allow_intermediate_caches);
    }
}
