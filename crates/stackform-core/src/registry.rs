//! Per-document singleton registry
//!
//! Maps a caller-supplied key to the handle created the first time the key
//! was requested. Each stack owns exactly one registry.

use std::collections::BTreeMap;

use tracing::debug;

/// Dedup map from singleton key to handle.
#[derive(Debug, Clone)]
pub struct SingletonRegistry<H> {
    entries: BTreeMap<String, H>,
}

impl<H> Default for SingletonRegistry<H> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<H: Clone> SingletonRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle stored under `key`, creating it on first request.
    ///
    /// The factory runs at most once per key. On a hit it is dropped
    /// without being called, even if it differs from the first one.
    pub fn get_or_create<E>(
        &mut self,
        key: &str,
        factory: impl FnOnce() -> Result<H, E>,
    ) -> Result<H, E> {
        if let Some(existing) = self.entries.get(key) {
            debug!(key, "singleton hit");
            return Ok(existing.clone());
        }
        let handle = factory()?;
        self.entries.insert(key.to_string(), handle.clone());
        Ok(handle)
    }

    pub fn get(&self, key: &str) -> Option<&H> {
        self.entries.get(key)
    }

    /// Store a handle created outside `get_or_create`.
    ///
    /// Returns the handle already present if the key was taken meanwhile.
    pub fn insert(&mut self, key: &str, handle: H) -> H {
        self.entries
            .entry(key.to_string())
            .or_insert(handle)
            .clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_factory_runs_once() {
        let mut registry: SingletonRegistry<u32> = SingletonRegistry::new();
        let calls = Cell::new(0);

        let first = registry
            .get_or_create::<()>("fn", || {
                calls.set(calls.get() + 1);
                Ok(1)
            })
            .unwrap();
        let second = registry
            .get_or_create::<()>("fn", || {
                calls.set(calls.get() + 1);
                Ok(2)
            })
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(calls.get(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_keys_are_exact() {
        let mut registry: SingletonRegistry<&str> = SingletonRegistry::new();
        registry.get_or_create::<()>("a", || Ok("A")).unwrap();
        registry.get_or_create::<()>("A", || Ok("other")).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_failed_factory_stores_nothing() {
        let mut registry: SingletonRegistry<u32> = SingletonRegistry::new();
        let err = registry.get_or_create("k", || Err("boom"));
        assert_eq!(err, Err("boom"));
        assert!(!registry.contains("k"));
        assert_eq!(registry.get_or_create::<&str>("k", || Ok(7)), Ok(7));
    }

    #[test]
    fn test_insert_keeps_first() {
        let mut registry: SingletonRegistry<u32> = SingletonRegistry::new();
        assert_eq!(registry.insert("k", 1), 1);
        assert_eq!(registry.insert("k", 2), 1);
        assert_eq!(registry.get("k"), Some(&1));
    }
}
