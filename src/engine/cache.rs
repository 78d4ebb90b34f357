//! Resolution cache.
//!
//! Records, for every key defined by at least one layer, which layer currently
//! wins and the value it contributes. All queries are answered from here.
//!
//! Invariant: an entry's `layer` is the lowest index among the layers that
//! define the key; a key with no entry is defined by no layer.

use std::collections::BTreeMap;

use crate::engine::value::Value;

/// The winning layer and value for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub layer: usize,
    pub value: Value,
}

/// Ordered map of key to its current winner.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn winner(&self, key: &str) -> Option<usize> {
        self.entries.get(key).map(|entry| entry.layer)
    }

    /// Install `entry` as the winner for `key`, returning the previous value.
    pub fn replace(&mut self, key: &str, entry: CacheEntry) -> Option<Value> {
        match self.entries.get_mut(key) {
            Some(existing) => Some(std::mem::replace(existing, entry).value),
            None => {
                self.entries.insert(key.to_string(), entry);
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
