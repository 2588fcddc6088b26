//! Factory for the built-in replies.
//!
//! Controllers get a [`Responder`] at construction time; it carries the
//! template engine, the error templates and the debug flag, so error pages
//! look the same everywhere.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderValue, StatusCode};
use serde_json::Value;

use crate::config::schema::TemplatesConfig;
use crate::error::WebError;
use crate::http::response::{
    DataResponse, HttpResponse, RenderResponse, RouteRedirectResponse, ServerErrorResponse,
    UrlRedirectResponse,
};
use crate::routing::path::Params;
use crate::template::TemplateEngine;

#[derive(Clone, Default)]
pub struct Responder {
    engine: Option<Arc<dyn TemplateEngine>>,
    templates: TemplatesConfig,
    debug: bool,
}

impl Responder {
    pub fn new(engine: Option<Arc<dyn TemplateEngine>>, templates: TemplatesConfig, debug: bool) -> Self {
        Self {
            engine,
            templates,
            debug,
        }
    }

    pub fn engine(&self) -> Option<&Arc<dyn TemplateEngine>> {
        self.engine.as_ref()
    }

    pub fn http(&self, status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
        HttpResponse::new(status, body)
    }

    pub fn data(&self, data: Value) -> DataResponse {
        DataResponse::new(data)
    }

    pub fn render(&self, template: impl Into<String>, data: Value) -> RenderResponse {
        RenderResponse::new(template, data, self.engine.clone())
    }

    pub fn route_redirect(&self, to: impl Into<String>, params: Params) -> RouteRedirectResponse {
        RouteRedirectResponse::new(to, params)
    }

    pub fn url_redirect(&self, url: impl Into<String>) -> UrlRedirectResponse {
        UrlRedirectResponse::new(url)
    }

    /// File body, shown inline or forced to download.
    pub fn download(
        &self,
        body: impl Into<Bytes>,
        content_type: &str,
        file_name: &str,
        force_download: bool,
    ) -> HttpResponse {
        let disposition = if force_download { "attachment" } else { "inline" };
        let mut response = HttpResponse::new(StatusCode::OK, body);

        match HeaderValue::from_str(content_type) {
            Ok(value) => {
                response.headers.insert(header::CONTENT_TYPE, value);
            }
            Err(_) => tracing::warn!(content_type, "Invalid download content type"),
        }
        let file_name = file_name.replace(['"', '\r', '\n'], "");
        if let Ok(value) = HeaderValue::from_str(&format!("{disposition}; filename=\"{file_name}\"")) {
            response.headers.insert(header::CONTENT_DISPOSITION, value);
        }
        response
    }

    pub fn server_error_with_code_and_template(
        &self,
        err: &WebError,
        template: &str,
        status: StatusCode,
    ) -> ServerErrorResponse {
        let message = if self.debug { err.chain() } else { err.to_string() };
        ServerErrorResponse::new(message, template, status, self.engine.clone())
    }

    /// 500 with the error template.
    pub fn server_error(&self, err: &WebError) -> ServerErrorResponse {
        if matches!(err, WebError::DeadlineExceeded) {
            tracing::debug!(error = %err, "Request cancelled");
        } else {
            tracing::error!(error = %err.chain(), "Server error");
        }
        self.server_error_with_code_and_template(err, &self.templates.error, StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn unavailable(&self, err: &WebError) -> ServerErrorResponse {
        tracing::error!(error = %err.chain(), "Service unavailable");
        self.server_error_with_code_and_template(err, &self.templates.unavailable, StatusCode::SERVICE_UNAVAILABLE)
    }

    pub fn not_found(&self, err: &WebError) -> ServerErrorResponse {
        tracing::warn!(error = %err, "Not found");
        self.server_error_with_code_and_template(err, &self.templates.not_found, StatusCode::NOT_FOUND)
    }

    pub fn forbidden(&self, err: &WebError) -> ServerErrorResponse {
        tracing::warn!(error = %err, "Forbidden");
        self.server_error_with_code_and_template(err, &self.templates.forbidden, StatusCode::FORBIDDEN)
    }

    /// Placeholder for actions that are not implemented yet.
    pub fn todo(&self) -> HttpResponse {
        HttpResponse::new(StatusCode::NOT_IMPLEMENTED, "TODO")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::{Reply, ResponseWriter};
    use crate::http::Context;
    use crate::routing::path::PathError;
    use serde_json::json;

    async fn apply(reply: impl Reply + 'static) -> ResponseWriter {
        let mut rw = ResponseWriter::new();
        Box::new(reply).apply(&Context::new(), &mut rw).await.unwrap();
        rw
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let responder = Responder::default();
        let err = WebError::msg("nope");

        assert_eq!(apply(responder.not_found(&err)).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(apply(responder.forbidden(&err)).await.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            apply(responder.unavailable(&err)).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            apply(responder.server_error(&err)).await.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(apply(responder.todo()).await.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_debug_exposes_error_chain() {
        let err = WebError::Router(crate::routing::RouterError::Path(PathError::ParamNotFound(
            "id".into(),
        )));

        let quiet = Responder::new(None, TemplatesConfig::default(), false);
        let rw = apply(quiet.server_error(&err)).await;
        let body: Value = serde_json::from_slice(rw.body()).unwrap();
        assert_eq!(body, json!({"code": 500, "error": err.to_string()}));

        let debug = Responder::new(None, TemplatesConfig::default(), true);
        assert_eq!(
            debug.server_error(&err).message(),
            err.chain()
        );
    }

    #[tokio::test]
    async fn test_download_headers() {
        let responder = Responder::default();
        let rw = apply(responder.download("a,b", "text/csv", "report.csv", true)).await;
        assert_eq!(rw.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            rw.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"report.csv\""
        );
        assert_eq!(rw.body(), b"a,b");
    }
}
