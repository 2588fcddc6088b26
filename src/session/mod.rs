//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! request headers
//!     → SessionStore::load_by_request → backend.load → Session (per request)
//!     → application code: load / store / delete / flashes / typed keys
//!     → SessionStore::save (before and after the reply is applied)
//!         → backend.save → Set-Cookie headers
//! ```
//!
//! # Design Decisions
//! - The backend record is the durable state, `Session` is discarded after the request
//! - Values are JSON; typed access goes through `SessionKey<T>`
//! - Dirty-key merging is the only concurrency control on the backend record

pub mod backend;
pub mod data;
pub mod store;

use thiserror::Error;

use crate::error::BoxError;

pub use backend::{cookie_value, MemoryBackend, RawSession, SessionBackend};
pub use data::{SaveMode, Session, SessionKey, FLASH_KEY};
pub use store::SessionStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session backend failure: {0}")]
    Backend(BoxError),

    #[error("invalid session cookie: {0}")]
    Cookie(String),

    #[error("session value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
