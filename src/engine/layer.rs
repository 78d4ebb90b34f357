//! Layers and the layer stack.
//!
//! # Responsibilities
//! - Store one source's settings and where each came from
//! - Keep layers in push order (index 0 = highest priority)
//! - Resolve a layer by name or index
//! - Track the current write target
//!
//! # Design Decisions
//! - Layers are never removed, only cleared; indices stay stable
//! - Name lookup goes through a side map, not a scan

use std::collections::HashMap;
use std::fmt;

use crate::engine::error::EngineError;
use crate::engine::value::Value;

/// Selects a layer either by name or by its stack index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRef<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for LayerRef<'a> {
    fn from(name: &'a str) -> Self {
        LayerRef::Name(name)
    }
}

impl<'a> From<&'a String> for LayerRef<'a> {
    fn from(name: &'a String) -> Self {
        LayerRef::Name(name.as_str())
    }
}

impl From<usize> for LayerRef<'_> {
    fn from(index: usize) -> Self {
        LayerRef::Index(index)
    }
}

impl fmt::Display for LayerRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerRef::Name(name) => f.write_str(name),
            LayerRef::Index(index) => write!(f, "#{}", index),
        }
    }
}

/// A named bag of settings plus their source locations.
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    index: usize,
    settings: HashMap<String, Value>,
    locations: HashMap<String, String>,
}

impl Layer {
    fn new(name: String, index: usize) -> Self {
        Self {
            name,
            index,
            settings: HashMap::new(),
            locations: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the stack, fixed at push time.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }

    pub fn location(&self, key: &str) -> Option<&str> {
        self.locations.get(key).map(String::as_str)
    }

    /// Keys defined by this layer, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.settings.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub(crate) fn insert(&mut self, key: String, value: Value, location: String) {
        self.locations.insert(key.clone(), location);
        self.settings.insert(key, value);
    }

    pub(crate) fn clear(&mut self) {
        self.settings.clear();
        self.locations.clear();
    }
}

/// Ordered collection of layers.
///
/// Always holds at least the root layer, so the current index is always valid.
#[derive(Debug, Clone)]
pub struct LayerStack {
    layers: Vec<Layer>,
    by_name: HashMap<String, usize>,
    current: usize,
}

impl LayerStack {
    /// Create a stack whose first (highest priority) layer is `root`.
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let mut by_name = HashMap::new();
        by_name.insert(root.clone(), 0);
        Self {
            layers: vec![Layer::new(root, 0)],
            by_name,
            current: 0,
        }
    }

    /// Append a new empty layer and make it current.
    pub fn push(&mut self, name: String) -> Result<usize, EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidLayerName);
        }
        if self.by_name.contains_key(&name) {
            return Err(EngineError::duplicate_layer(name));
        }

        let index = self.layers.len();
        self.by_name.insert(name.clone(), index);
        self.layers.push(Layer::new(name, index));
        self.current = index;
        Ok(index)
    }

    /// Map a name or index to a valid index.
    pub fn resolve(&self, layer: LayerRef<'_>) -> Result<usize, EngineError> {
        match layer {
            LayerRef::Name(name) => self
                .by_name
                .get(name)
                .copied()
                .ok_or_else(|| EngineError::missing_layer(name)),
            LayerRef::Index(index) if index < self.layers.len() => Ok(index),
            LayerRef::Index(_) => Err(EngineError::missing_layer(layer.to_string())),
        }
    }

    pub fn set_current(&mut self, index: usize) {
        debug_assert!(index < self.layers.len());
        self.current = index;
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Layer {
        &self.layers[self.current]
    }

    pub(crate) fn current_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.current]
    }

    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// First layer after `index` (lower priority) that defines `key`.
    pub fn find_fallback(&self, index: usize, key: &str) -> Option<&Layer> {
        self.layers
            .iter()
            .skip(index + 1)
            .find(|layer| layer.contains(key))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_indices_and_current() {
        let mut stack = LayerStack::new("runtime");
        assert_eq!(stack.current().name(), "runtime");
        assert_eq!(stack.push("cli".into()).unwrap(), 1);
        assert_eq!(stack.push("defaults".into()).unwrap(), 2);
        assert_eq!(stack.current_index(), 2);
        assert_eq!(stack.get(1).unwrap().name(), "cli");
    }

    #[test]
    fn test_duplicate_push_leaves_stack_untouched() {
        let mut stack = LayerStack::new("runtime");
        stack.push("cli".into()).unwrap();
        stack.set_current(0);

        let err = stack.push("cli".into()).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateLayer { ref name } if name == "cli"));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.current_index(), 0);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut stack = LayerStack::new("runtime");
        assert!(matches!(
            stack.push(String::new()),
            Err(EngineError::InvalidLayerName)
        ));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_resolve() {
        let stack = LayerStack::new("runtime");
        assert_eq!(stack.resolve("runtime".into()).unwrap(), 0);
        assert_eq!(stack.resolve(0usize.into()).unwrap(), 0);
        assert!(matches!(
            stack.resolve("nope".into()),
            Err(EngineError::MissingLayer { .. })
        ));
        assert!(matches!(
            stack.resolve(3usize.into()),
            Err(EngineError::MissingLayer { ref name }) if name == "#3"
        ));
    }

    #[test]
    fn test_fallback_only_searches_lower_priority() {
        let mut stack = LayerStack::new("a");
        for name in ["b", "c"] {
            stack.push(name.into()).unwrap();
        }
        stack
            .get_mut(0)
            .unwrap()
            .insert("k".into(), Value::from(0), "x".into());
        stack
            .get_mut(2)
            .unwrap()
            .insert("k".into(), Value::from(2), "x".into());

        assert_eq!(stack.find_fallback(0, "k").unwrap().name(), "c");
        assert_eq!(stack.find_fallback(1, "k").unwrap().name(), "c");
        assert!(stack.find_fallback(2, "k").is_none());
    }

    #[test]
    fn test_clear_drops_settings_and_locations() {
        let mut stack = LayerStack::new("a");
        let layer = stack.current_mut();
        layer.insert("k".into(), Value::from("v"), "here".into());
        assert_eq!(layer.location("k"), Some("here"));
        layer.clear();
        assert!(layer.is_empty());
        assert_eq!(layer.location("k"), None);
    }
}
