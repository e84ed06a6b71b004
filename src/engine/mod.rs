//! The in-memory key/value mapping.
//!
//! Deliberately trivial: a `HashMap<String, String>` behind a
//! reader/writer lock. Get takes a shared lock, Set/Delete take an
//! exclusive one. No TTLs, no size bound, no I/O.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Thread-safe string-to-string mapping.
pub struct Engine {
    data: RwLock<HashMap<String, String>>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the value for `key`, or `Error::KeyNotFound` if absent.
    pub fn get(&self, key: &str) -> Result<String> {
        let data = self.data.read();
        data.get(key).cloned().ok_or(Error::KeyNotFound)
    }

    /// Inserts or overwrites `key` with `value`.
    pub fn set(&self, key: String, value: String) {
        self.data.write().insert(key, value);
    }

    /// Removes `key` if present. Deleting a missing key succeeds silently.
    pub fn delete(&self, key: &str) {
        self.data.write().remove(key);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_on_missing_key_fails() {
        let engine = Engine::new();
        assert!(matches!(engine.get("missing"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn set_then_get_returns_latest_value() {
        let engine = Engine::new();
        engine.set("a".into(), "b".into());
        engine.set("a".into(), "c".into());
        assert_eq!(engine.get("a").unwrap(), "c");
    }

    #[test]
    fn delete_missing_key_is_not_an_error() {
        let engine = Engine::new();
        engine.delete("missing");
    }

    #[test]
    fn delete_then_get_reports_missing() {
        let engine = Engine::new();
        engine.set("k".into(), "v".into());
        engine.delete("k");
        assert!(matches!(engine.get("k"), Err(Error::KeyNotFound)));
    }
}
