//! Session persistence backends.
//!
//! A backend turns request headers into a [`RawSession`] and persists one,
//! emitting response headers (usually `Set-Cookie`). [`MemoryBackend`] keeps
//! records in process memory and identifies them by a plain `name=id` cookie.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue};
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::session::SessionError;

/// Backend-side session record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSession {
    pub id: String,
    pub values: HashMap<String, Value>,
    pub is_new: bool,
}

#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Load the session the request headers point at, or a new one.
    async fn load(&self, headers: &HeaderMap, name: &str) -> Result<RawSession, SessionError>;

    /// Persist `raw`, assigning an id when it has none, and add response headers.
    async fn save(
        &self,
        name: &str,
        raw: &mut RawSession,
        response_headers: &mut HeaderMap,
    ) -> Result<(), SessionError>;

    /// Request `Cookie` header that makes [`SessionBackend::load`] find `id`.
    fn encode_cookie(&self, name: &str, id: &str) -> Result<HeaderValue, SessionError> {
        HeaderValue::from_str(&format!("{name}={id}"))
            .map_err(|_| SessionError::Cookie(format!("cannot encode session id for {name:?}")))
    }
}

/// Value of cookie `name` in the request headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Idle time after which a [`MemoryBackend`] record is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Saves between two sweeps of expired records.
const PURGE_EVERY: u64 = 256;

#[derive(Debug)]
struct Record {
    values: HashMap<String, Value>,
    touched: Instant,
}

/// In-process backend for development and tests.
///
/// Records live only as long as the process and are not shared between
/// instances. A record untouched for longer than the idle timeout counts as
/// gone; expired records are swept every few hundred saves.
#[derive(Debug)]
pub struct MemoryBackend {
    records: DashMap<String, Record>,
    idle_timeout: Duration,
    saves: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            records: DashMap::new(),
            idle_timeout,
            saves: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of the stored record, unless it expired.
    pub fn record(&self, id: &str) -> Option<HashMap<String, Value>> {
        self.records
            .get(id)
            .filter(|r| !self.expired(r.value()))
            .map(|r| r.value().values.clone())
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.touched.elapsed() <= self.idle_timeout);
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.records.len(), "Purged idle sessions");
        }
        removed
    }

    fn expired(&self, record: &Record) -> bool {
        record.touched.elapsed() > self.idle_timeout
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn load(&self, headers: &HeaderMap, name: &str) -> Result<RawSession, SessionError> {
        let Some(id) = cookie_value(headers, name).filter(|id| !id.is_empty()) else {
            return Ok(RawSession {
                is_new: true,
                ..RawSession::default()
            });
        };

        if self.records.get(id).is_some_and(|r| self.expired(r.value())) {
            self.records.remove(id);
        }

        Ok(match self.records.get(id) {
            Some(record) => RawSession {
                id: id.to_string(),
                values: record.value().values.clone(),
                is_new: false,
            },
            None => RawSession {
                id: id.to_string(),
                values: HashMap::new(),
                is_new: true,
            },
        })
    }

    async fn save(
        &self,
        name: &str,
        raw: &mut RawSession,
        response_headers: &mut HeaderMap,
    ) -> Result<(), SessionError> {
        if raw.id.is_empty() {
            raw.id = Uuid::new_v4().to_string();
        }

        let cookie = HeaderValue::from_str(&format!(
            "{name}={}; Path=/; HttpOnly; SameSite=Lax",
            raw.id
        ))
        .map_err(|_| SessionError::Cookie(format!("cannot encode session id for {name:?}")))?;

        self.records.insert(
            raw.id.clone(),
            Record {
                values: raw.values.clone(),
                touched: Instant::now(),
            },
        );
        raw.is_new = false;

        if self.saves.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }
        response_headers.append(header::SET_COOKIE, cookie);
        Ok(())
    }
}
