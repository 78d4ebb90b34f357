//! Built-in defaults held in memory.

use crate::engine::{Engine, Value};
use crate::loaders::{LoadError, Loader};

const DEFAULT_LOCATION: &str = "default";

/// Loads a fixed list of settings, typically the lowest-priority layer.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    entries: Vec<(String, Value, Option<String>)>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a setting located as `default`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((key.into(), value.into(), None));
        self
    }

    /// Add a setting with an explicit location.
    pub fn with_location(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        location: impl Into<String>,
    ) -> Self {
        self.entries
            .push((key.into(), value.into(), Some(location.into())));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for StaticLoader {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |loader, (key, value)| loader.with(key, value))
    }
}

impl Loader for StaticLoader {
    fn load(&mut self, engine: &mut Engine) -> Result<(), LoadError> {
        for (key, value, location) in &self.entries {
            let location = location.as_deref().unwrap_or(DEFAULT_LOCATION);
            engine.set_value_at(key.as_str(), value.clone(), location)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} built-in defaults", self.entries.len())
    }
}
