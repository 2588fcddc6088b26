//! Application composition.
//!
//! # Responsibilities
//! - Collect route modules, filters, session backend, event subscribers
//!   and the template engine
//! - Register config routes, module routes and the built-in controllers
//! - Freeze everything into a [`RequestHandler`]
//!
//! # Data Flow
//! ```text
//! AppConfig
//!     → AppBuilder (collect parts)
//!     → build():
//!         config routes + aliases → route modules → built-in controllers
//!         → Router::new (every route has a controller)
//!         → SessionStore, Responder, Filters, EventRouter
//!         → RequestHandler
//! ```
//!
//! # Design Decisions
//! - Registration happens once, before serving; the registry is immutable afterwards
//! - Application handlers registered under reserved names replace the defaults

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::controller;
use crate::events::{DefaultEventRouter, EventRouter, LoggingSubscriber, Subscriber};
use crate::http::filters::{BackgroundWorkFilter, CacheStrategyFilter, MetricsFilter};
use crate::http::{Filter, Filters, RequestHandler, Responder};
use crate::routing::{Router, RouterError, RouterRegistry, RoutesModule, ERROR_HANDLER, NOTFOUND_HANDLER};
use crate::session::{SessionBackend, SessionStore};
use crate::template::TemplateEngine;

/// Builder for the request dispatcher of one application.
pub struct AppBuilder {
    config: AppConfig,
    modules: Vec<Box<dyn RoutesModule>>,
    filters: Vec<Arc<dyn Filter>>,
    session_backend: Option<Arc<dyn SessionBackend>>,
    event_router: Option<Arc<dyn EventRouter>>,
    subscribers: Vec<Arc<dyn Subscriber>>,
    engine: Option<Arc<dyn TemplateEngine>>,
}

impl AppBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            modules: Vec::new(),
            filters: Vec::new(),
            session_backend: None,
            event_router: None,
            subscribers: Vec::new(),
            engine: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Add a module registering handlers and routes.
    pub fn routes_module(mut self, module: impl RoutesModule + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Persist sessions through `backend`. Without one, sessions live for a single request.
    pub fn session_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.session_backend = Some(backend);
        self
    }

    /// Replace the default event router. Subscribers added through
    /// [`AppBuilder::subscriber`] are ignored afterwards.
    pub fn event_router(mut self, router: Arc<dyn EventRouter>) -> Self {
        self.event_router = Some(router);
        self
    }

    pub fn subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn template_engine(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Register everything and freeze it into a dispatcher.
    pub fn build(self) -> Result<RequestHandler, RouterError> {
        let config = self.config;
        let responder = Responder::new(self.engine, config.templates.clone(), config.debug);

        let mut registry = RouterRegistry::new();
        for route in &config.routes {
            registry.route(&route.path, &route.controller)?;
            if let Some(name) = &route.name {
                registry.alias(name, &route.controller);
            }
        }
        for module in &self.modules {
            module.routes(&mut registry)?;
        }
        controller::register_defaults(&mut registry, &responder)?;

        for reserved in [ERROR_HANDLER, NOTFOUND_HANDLER] {
            if !registry.has_any(reserved) {
                return Err(RouterError::MissingReservedHandler(reserved.to_string()));
            }
        }

        let router = Arc::new(Router::new(registry, &config.router)?);
        tracing::info!(
            routes = router.registry().routes().len(),
            handlers = router.registry().handler_names().len(),
            "Router ready"
        );

        let sessions = SessionStore::new(
            self.session_backend,
            config.session.name.clone(),
            config.session.save_mode,
        );
        if !sessions.is_enabled() {
            tracing::info!("No session backend configured, sessions are request-scoped");
        }

        let events = self.event_router.unwrap_or_else(|| {
            let mut subscribers: Vec<Arc<dyn Subscriber>> = vec![Arc::new(LoggingSubscriber)];
            subscribers.extend(self.subscribers);
            Arc::new(DefaultEventRouter::new(subscribers))
        });

        let mut filters: Vec<Arc<dyn Filter>> = vec![Arc::new(MetricsFilter), Arc::new(BackgroundWorkFilter)];
        if config.cache_strategy.enabled {
            let cache = CacheStrategyFilter::from_config(&config.cache_strategy);
            tracing::info!(directive = ?cache.directive().cache_control(), "Default cache directive for GET responses");
            filters.push(Arc::new(cache));
        }
        filters.extend(self.filters);

        let timeout = (config.router.timeout_ms > 0).then(|| Duration::from_millis(config.router.timeout_ms));

        Ok(RequestHandler::new(
            router,
            Filters::new(filters),
            sessions,
            events,
            responder,
            config.router.prefix.clone(),
            timeout,
        ))
    }
}
