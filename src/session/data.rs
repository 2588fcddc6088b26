//! Request-scoped session values with dirty tracking.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::session::SessionError;

/// Default key for flash messages without a category.
pub const FLASH_KEY: &str = "_flash";

/// When a session counts as touched, and how it is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveMode {
    /// Write the full session on every save.
    #[default]
    Always,
    /// Merge keys that were read or written into the backend state.
    OnRead,
    /// Merge keys that were written into the backend state.
    OnWrite,
}

impl SaveMode {
    fn dirty_on_read(self) -> bool {
        matches!(self, SaveMode::Always | SaveMode::OnRead)
    }
}

/// Compile-time typed handle on a session key.
///
/// ```ignore
/// const CART: SessionKey<Vec<u64>> = SessionKey::new("cart");
/// session.set(&CART, &vec![1, 2])?;
/// ```
pub struct SessionKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SessionKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for SessionKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SessionKey<T> {}

impl<T> fmt::Debug for SessionKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionKey").field(&self.name).finish()
    }
}

#[derive(Debug, Default)]
struct State {
    id: String,
    values: HashMap<String, Value>,
    dirty: HashSet<String>,
    dirty_all: bool,
}

/// State copied out for a save, so the lock is not held across backend calls.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub id: String,
    pub values: HashMap<String, Value>,
    pub dirty: HashSet<String>,
    pub dirty_all: bool,
}

/// One request's view of the client session.
#[derive(Debug)]
pub struct Session {
    state: Mutex<State>,
    mode: SaveMode,
}

impl Session {
    /// A session without identifier or values.
    pub fn empty(mode: SaveMode) -> Self {
        Self::from_parts(String::new(), HashMap::new(), mode)
    }

    pub(crate) fn from_parts(id: String, values: HashMap<String, Value>, mode: SaveMode) -> Self {
        Self {
            state: Mutex::new(State {
                id,
                values,
                ..State::default()
            }),
            mode,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> SaveMode {
        self.mode
    }

    /// Read a raw value. Counts as a touch unless the mode is `OnWrite`.
    pub fn load(&self, key: &str) -> Option<Value> {
        let mut state = self.lock();
        if self.mode.dirty_on_read() {
            state.dirty.insert(key.to_string());
        }
        state.values.get(key).cloned()
    }

    pub fn store(&self, key: impl Into<String>, value: Value) -> &Self {
        let key = key.into();
        let mut state = self.lock();
        state.dirty.insert(key.clone());
        state.values.insert(key, value);
        self
    }

    pub fn delete(&self, key: &str) {
        let mut state = self.lock();
        state.dirty.insert(key.to_string());
        state.values.remove(key);
    }

    /// Typed read. A stored value of another shape is an error, an absent one is `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &SessionKey<T>) -> Result<Option<T>, SessionError> {
        self.load(key.name)
            .map(serde_json::from_value)
            .transpose()
            .map_err(SessionError::from)
    }

    pub fn set<T: Serialize>(&self, key: &SessionKey<T>, value: &T) -> Result<(), SessionError> {
        self.store(key.name, serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove<T>(&self, key: &SessionKey<T>) {
        self.delete(key.name);
    }

    /// Take all flash messages of a category (default `_flash`).
    pub fn flashes(&self, category: Option<&str>) -> Vec<Value> {
        let key = category.unwrap_or(FLASH_KEY);
        let mut state = self.lock();
        state.dirty.insert(key.to_string());
        match state.values.remove(key) {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        }
    }

    pub fn add_flash(&self, value: Value, category: Option<&str>) {
        let key = category.unwrap_or(FLASH_KEY);
        let mut state = self.lock();
        state.dirty.insert(key.to_string());
        match state.values.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                state.values.insert(key.to_string(), Value::Array(vec![value]));
            }
        }
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    /// SHA-256 of the identifier, safe to log.
    pub fn id_hash(&self) -> String {
        hash_id(&self.id())
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().values.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Drop every value. The next save overwrites the backend record.
    pub fn clear_all(&self) -> &Self {
        let mut state = self.lock();
        state.values.clear();
        state.dirty_all = true;
        self
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            id: state.id.clone(),
            values: state.values.clone(),
            dirty: state.dirty.clone(),
            dirty_all: state.dirty_all,
        }
    }

    /// Adopt the persisted state. Keys touched after `saved` was taken keep
    /// their local value and stay dirty.
    pub(crate) fn commit(&self, saved: &Snapshot, id: String, merged: Option<HashMap<String, Value>>) {
        let mut state = self.lock();
        state.id = id;

        let Some(mut merged) = merged else {
            return;
        };
        let State { values, dirty, .. } = &mut *state;
        dirty.retain(|key| {
            let changed = !saved.dirty.contains(key) || values.get(key) != saved.values.get(key);
            if changed {
                match values.get(key) {
                    Some(value) => merged.insert(key.clone(), value.clone()),
                    None => merged.remove(key),
                };
            }
            changed
        });
        *values = merged;
    }
}

pub(crate) fn hash_id(id: &str) -> String {
    format!("{:x}", Sha256::digest(id.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COUNTER: SessionKey<u32> = SessionKey::new("counter");

    #[test]
    fn test_typed_keys() {
        let session = Session::empty(SaveMode::OnWrite);
        assert_eq!(session.get(&COUNTER).unwrap(), None);

        session.set(&COUNTER, &3).unwrap();
        assert_eq!(session.get(&COUNTER).unwrap(), Some(3));

        session.store("counter", json!("three"));
        assert!(session.get(&COUNTER).is_err());

        session.remove(&COUNTER);
        assert!(session.keys().is_empty());
    }

    #[test]
    fn test_flashes_read_and_clear() {
        let session = Session::empty(SaveMode::Always);
        session.add_flash(json!("one"), None);
        session.add_flash(json!("two"), None);
        session.add_flash(json!("bad"), Some("error"));

        assert_eq!(session.flashes(None), vec![json!("one"), json!("two")]);
        assert!(session.flashes(None).is_empty());
        assert_eq!(session.flashes(Some("error")), vec![json!("bad")]);
    }

    #[test]
    fn test_dirty_tracking_by_mode() {
        let session = Session::empty(SaveMode::OnWrite);
        session.load("a");
        assert!(session.snapshot().dirty.is_empty());
        session.store("b", json!(1));
        assert!(session.snapshot().dirty.contains("b"));

        let session = Session::empty(SaveMode::OnRead);
        session.load("a");
        assert!(session.snapshot().dirty.contains("a"));
    }

    #[test]
    fn test_clear_all_marks_everything() {
        let session = Session::empty(SaveMode::OnWrite);
        session.store("a", json!(1));
        session.clear_all();
        let snapshot = session.snapshot();
        assert!(snapshot.dirty_all);
        assert!(snapshot.values.is_empty());
    }

    #[test]
    fn test_commit_keeps_later_writes() {
        let session = Session::from_parts("id".into(), HashMap::new(), SaveMode::OnWrite);
        session.store("a", json!(1));
        let saved = session.snapshot();
        session.store("b", json!(2));

        let merged = HashMap::from([
            ("a".to_string(), json!(1)),
            ("c".to_string(), json!(3)),
        ]);
        session.commit(&saved, "id".into(), Some(merged));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.dirty, HashSet::from(["b".to_string()]));
        assert_eq!(snapshot.values.len(), 3);
    }

    #[test]
    fn test_id_hash_is_sha256() {
        let session = Session::from_parts("abc".into(), HashMap::new(), SaveMode::Always);
        assert_eq!(
            session.id_hash(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
