//! Loading and saving sessions against a backend.
//!
//! # Save Modes
//! ```text
//! Always           → write the full session
//! OnWrite / OnRead → nothing dirty, known id, not cleared → skip
//!                  → otherwise reload backend record by id
//!                  → overlay dirty keys (absent locally → removed)
//!                  → write the merged record
//! ```
//!
//! Concurrent requests of one client writing disjoint keys both survive;
//! writes to the same key race, the last save wins.

use std::sync::Arc;

use axum::http::{header, HeaderMap};

use crate::observability::metrics;
use crate::session::backend::{RawSession, SessionBackend};
use crate::session::data::{SaveMode, Session, Snapshot};
use crate::session::SessionError;

/// Process-wide session persistence settings.
#[derive(Clone)]
pub struct SessionStore {
    backend: Option<Arc<dyn SessionBackend>>,
    name: String,
    mode: SaveMode,
}

impl SessionStore {
    pub fn new(backend: Option<Arc<dyn SessionBackend>>, name: impl Into<String>, mode: SaveMode) -> Self {
        Self {
            backend,
            name: name.into(),
            mode,
        }
    }

    /// A store without backend: sessions start empty and are never persisted.
    pub fn disabled(mode: SaveMode) -> Self {
        Self::new(None, String::new(), mode)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> SaveMode {
        self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn load_by_request(&self, headers: &HeaderMap) -> Result<Session, SessionError> {
        let Some(backend) = &self.backend else {
            return Ok(Session::empty(self.mode));
        };
        let raw = backend.load(headers, &self.name).await?;
        let session = Session::from_parts(raw.id, raw.values, self.mode);
        tracing::debug!(session = %session.id_hash(), is_new = raw.is_new, "Session loaded");
        Ok(session)
    }

    pub async fn load_by_id(&self, id: &str) -> Result<Session, SessionError> {
        let Some(backend) = &self.backend else {
            return Ok(Session::empty(self.mode));
        };
        let headers = self.carrier(backend.as_ref(), id)?;
        self.load_by_request(&headers).await
    }

    fn carrier(&self, backend: &dyn SessionBackend, id: &str) -> Result<HeaderMap, SessionError> {
        let mut headers = HeaderMap::new();
        if !id.is_empty() {
            headers.insert(header::COOKIE, backend.encode_cookie(&self.name, id)?);
        }
        Ok(headers)
    }

    /// Persist `session`. Returns the headers to send along with the response,
    /// or `None` when nothing was written.
    pub async fn save(&self, session: &Session) -> Result<Option<HeaderMap>, SessionError> {
        let Some(backend) = &self.backend else {
            return Ok(None);
        };

        let result = self.save_with(backend.as_ref(), session).await;
        let outcome = match &result {
            Ok(Some(_)) => "saved",
            Ok(None) => "skipped",
            Err(_) => "failed",
        };
        metrics::record_session_save(outcome);
        result
    }

    async fn save_with(
        &self,
        backend: &dyn SessionBackend,
        session: &Session,
    ) -> Result<Option<HeaderMap>, SessionError> {
        let snapshot = session.snapshot();

        let merged = if self.mode != SaveMode::Always && !snapshot.dirty_all && !snapshot.id.is_empty() {
            if snapshot.dirty.is_empty() {
                return Ok(None);
            }
            Some(self.merge(backend, &snapshot).await?)
        } else {
            None
        };

        let mut raw = RawSession {
            id: snapshot.id.clone(),
            values: merged.clone().unwrap_or_else(|| snapshot.values.clone()),
            is_new: snapshot.id.is_empty(),
        };
        let mut headers = HeaderMap::new();
        backend.save(&self.name, &mut raw, &mut headers).await?;

        tracing::debug!(session = %session.id_hash(), mode = ?self.mode, "Session saved");
        session.commit(&snapshot, raw.id, merged);
        Ok(Some(headers))
    }

    async fn merge(
        &self,
        backend: &dyn SessionBackend,
        snapshot: &Snapshot,
    ) -> Result<std::collections::HashMap<String, serde_json::Value>, SessionError> {
        let headers = self.carrier(backend, &snapshot.id)?;
        let mut current = backend.load(&headers, &self.name).await?.values;
        for key in &snapshot.dirty {
            match snapshot.values.get(key) {
                Some(value) => current.insert(key.clone(), value.clone()),
                None => current.remove(key),
            };
        }
        Ok(current)
    }
}
