//! HTTP caching headers.
//!
//! # Responsibilities
//! - Hold the cache directives of a response ([`CacheDirective`])
//! - Derive a directive from the common reuse options ([`CacheDirectiveBuilder`])
//! - Write `Cache-Control`, `Expires`, `ETag` and `Last-Modified`
//!
//! # Design Decisions
//! - `no-store` overrides every other directive
//! - `no-cache` suppresses `max-age`, `s-maxage` and `Expires`

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Duration, Utc};

/// Who may keep a copy of the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Browser only; intermediate caches must not store it.
    Private,
    /// Any cache, even for authenticated or otherwise uncacheable responses.
    Public,
}

/// Cache directives of one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDirective {
    pub visibility: Option<Visibility>,
    pub no_cache: bool,
    pub no_store: bool,
    pub no_transform: bool,
    pub must_revalidate: bool,
    pub proxy_revalidate: bool,
    /// Seconds the response may be reused; 0 leaves it out.
    pub max_age: u32,
    /// `max-age` for shared caches; 0 leaves it out.
    pub s_max_age: u32,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl CacheDirective {
    /// Forbid storing the response anywhere.
    pub fn no_store() -> Self {
        Self {
            no_store: true,
            ..Self::default()
        }
    }

    /// The `Cache-Control` value, `None` when no directive applies.
    pub fn cache_control(&self) -> Option<String> {
        if self.no_store {
            return Some("no-store".to_string());
        }

        let mut values = Vec::new();
        if self.must_revalidate {
            values.push("must-revalidate".to_string());
        }
        if self.proxy_revalidate {
            values.push("proxy-revalidate".to_string());
        }
        if self.no_cache {
            values.push("no-cache".to_string());
        } else {
            if self.max_age > 0 {
                values.push(format!("max-age={}", self.max_age));
            }
            if self.s_max_age > 0 {
                values.push(format!("s-maxage={}", self.s_max_age));
            }
        }
        if self.no_transform {
            values.push("no-transform".to_string());
        }
        match self.visibility {
            Some(Visibility::Public) => values.push("public".to_string()),
            Some(Visibility::Private) => values.push("private".to_string()),
            None => {}
        }

        (!values.is_empty()).then(|| values.join(", "))
    }

    /// Set the caching headers on `headers`, replacing existing ones.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        if self.no_store {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            return;
        }

        if !self.no_cache && self.max_age > 0 {
            let expires = Utc::now() + Duration::seconds(i64::from(self.max_age));
            set(headers, header::EXPIRES, &http_date(expires));
        }
        if let Some(etag) = &self.etag {
            set(headers, header::ETAG, etag);
        }
        if let Some(modified) = self.last_modified {
            set(headers, header::LAST_MODIFIED, &http_date(modified));
        }
        if let Some(value) = self.cache_control() {
            set(headers, header::CACHE_CONTROL, &value);
        }
    }
}

fn set(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, value, "Skipping invalid cache header"),
    }
}

/// IMF-fixdate as used by `Expires` and `Last-Modified`.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Common caching options turned into a [`CacheDirective`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDirectiveBuilder {
    pub is_reusable: bool,
    pub revalidate_each_time: bool,
    pub allow_intermediate_caches: bool,
    /// Seconds, becomes `max-age`.
    pub max_cache_lifetime: u32,
    pub etag: Option<String>,
}

impl CacheDirectiveBuilder {
    pub fn build(&self) -> CacheDirective {
        if !self.is_reusable {
            return CacheDirective::no_store();
        }
        CacheDirective {
            no_cache: self.revalidate_each_time,
            visibility: Some(if self.allow_intermediate_caches {
                Visibility::Public
            } else {
                Visibility::Private
            }),
            max_age: self.max_cache_lifetime,
            etag: self.etag.clone(),
            ..CacheDirective::default()
        }
    }
}
