//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be greater than 0"));
    }

    let router = &config.router;
    if router.timeout_ms == 0 {
        errors.push(ValidationError::new("router.timeout_ms", "must be greater than 0"));
    }
    if !router.scheme.is_empty() && router.scheme != "http" && router.scheme != "https" {
        errors.push(ValidationError::new(
            "router.scheme",
            format!("{:?} is neither http nor https", router.scheme),
        ));
    }
    if !router.external.is_empty() && Url::parse(&router.external).is_err() {
        errors.push(ValidationError::new(
            "router.external",
            format!("{:?} is not a valid URL", router.external),
        ));
    }
    if !router.prefix.is_empty() && !router.prefix.starts_with('/') {
        errors.push(ValidationError::new("router.prefix", "must start with '/'"));
    }

    if config.session.name.trim().is_empty() {
        errors.push(ValidationError::new("session.name", "must not be empty"));
    }

    for (i, route) in config.routes.iter().enumerate() {
        if !route.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("routes[{i}].path"),
                format!("{:?} must start with '/'", route.path),
            ));
        }
        if route.controller.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("routes[{i}].controller"),
                "must not be empty",
            ));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
