//! Template engine contract.
//!
//! Rendering itself is pluggable; the framework only consumes these traits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::http::Context;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {0:?} not found")]
    NotFound(String),

    #[error("rendering template {name:?} failed: {message}")]
    Render { name: String, message: String },
}

/// Renders a named template with JSON data.
#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn render(&self, ctx: &Context, name: &str, data: &Value) -> Result<String, TemplateError>;

    /// Partial rendering support, if the engine has any.
    fn partials(&self) -> Option<&dyn PartialTemplateEngine> {
        None
    }
}

/// Renders selected partials of a template, keyed by partial name.
#[async_trait]
pub trait PartialTemplateEngine: Send + Sync {
    async fn render_partials(
        &self,
        ctx: &Context,
        name: &str,
        data: &Value,
        partials: &[String],
    ) -> Result<BTreeMap<String, String>, TemplateError>;
}
