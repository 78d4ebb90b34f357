//! The configuration engine.
//!
//! # Responsibilities
//! - Own the layer stack, resolution cache and observer registry
//! - Keep the cache consistent on every write, reset and reload
//! - Turn effective-value changes into observer notifications
//!
//! # State Transitions (per key)
//! ```text
//! undefined → defined:  first write by any layer
//! defined → defined:    write by the winning or a higher-priority layer,
//!                       or reset of the winner revealing a fallback
//! defined → undefined:  reset of the only defining layer
//! ```
//!
//! # Design Decisions
//! - Index 0 is the highest priority; every later push ranks lower
//! - The cache is updated before observers run, so a failing observer
//!   never leaves the cache out of step with the layers
//! - The engine is single-threaded; callers serialize access

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::engine::cache::{CacheEntry, ResolutionCache};
use crate::engine::dump::format_columns;
use crate::engine::error::EngineError;
use crate::engine::layer::{Layer, LayerRef, LayerStack};
use crate::engine::observer::{Notification, NotificationController, Observer, ObserverRegistry};
use crate::engine::value::Value;
use crate::loaders::Loader;
use crate::observability::metrics;

/// Name of the layer created with every engine.
pub const RUNTIME_LAYER: &str = "runtime";

/// Layered configuration with change notification.
pub struct Engine {
    layers: LayerStack,
    cache: ResolutionCache,
    observers: ObserverRegistry,
    notifications: NotificationController,
    /// Retained loaders, indexed like `layers`.
    loaders: Vec<Option<Box<dyn Loader>>>,
}

impl Engine {
    /// Create an engine holding only the current, top-priority `runtime` layer.
    pub fn new() -> Self {
        Self {
            layers: LayerStack::new(RUNTIME_LAYER),
            cache: ResolutionCache::new(),
            observers: ObserverRegistry::new(),
            notifications: NotificationController::new(),
            loaders: vec![None],
        }
    }

    // --- Layer stack ---

    /// Push an empty layer below all existing ones and make it current.
    pub fn push_layer(&mut self, name: impl Into<String>) -> Result<usize, EngineError> {
        let index = self.layers.push(name.into())?;
        self.loaders.push(None);
        tracing::debug!(layer = %self.layers.current().name(), index, "Layer pushed");
        Ok(index)
    }

    /// Push a layer and populate it with `loader`, which stays attached for reloads.
    ///
    /// If the loader fails the layer remains pushed with whatever it wrote.
    pub fn push_layer_with<L: Loader + 'static>(
        &mut self,
        name: impl Into<String>,
        loader: L,
    ) -> Result<usize, EngineError> {
        let index = self.push_layer(name)?;
        self.run_loader(index, Box::new(loader))?;
        Ok(index)
    }

    /// Select the layer that subsequent writes go to.
    pub fn set_current_layer<'a>(&mut self, layer: impl Into<LayerRef<'a>>) -> Result<(), EngineError> {
        let index = self.layers.resolve(layer.into())?;
        self.layers.set_current(index);
        tracing::debug!(layer = %self.layers.current().name(), "Current layer selected");
        Ok(())
    }

    pub fn current_layer_name(&self) -> &str {
        self.layers.current().name()
    }

    /// Layer names from highest to lowest priority.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(Layer::name).collect()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Read-only view of one layer.
    pub fn layer<'a>(&self, layer: impl Into<LayerRef<'a>>) -> Result<&Layer, EngineError> {
        let layer = layer.into();
        let index = self.layers.resolve(layer)?;
        self.layers
            .get(index)
            .ok_or_else(|| EngineError::missing_layer(layer.to_string()))
    }

    // --- Writes ---

    /// Write `key` into the current layer, recording the caller's `file:line`.
    #[track_caller]
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), EngineError> {
        let caller = std::panic::Location::caller();
        let location = format!("{}:{}", caller.file(), caller.line());
        self.set_value_at(key, value, location)
    }

    /// Write `key` into the current layer with an explicit source location.
    pub fn set_value_at(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        location: impl Into<String>,
    ) -> Result<(), EngineError> {
        let key = key.into();
        let value = value.into();
        let current = self.layers.current_index();

        self.layers
            .current_mut()
            .insert(key.clone(), value.clone(), location.into());

        if let Some(winner) = self.cache.winner(&key) {
            if winner < current {
                tracing::trace!(
                    key = %key,
                    layer = %self.layers.current().name(),
                    winner,
                    "Write shadowed by higher-priority layer"
                );
                metrics::record_write("shadowed");
                return Ok(());
            }
        }

        tracing::trace!(key = %key, layer = %self.layers.current().name(), "Write resolved");
        let old = self.cache.replace(
            &key,
            CacheEntry {
                layer: current,
                value: value.clone(),
            },
        );
        metrics::record_write("resolved");
        metrics::record_resolved_keys(self.cache.len());

        self.notify(Notification::new(key, old, Some(value)))
    }

    /// Clear a layer, letting lower-priority layers show through.
    pub fn reset_layer<'a>(&mut self, layer: impl Into<LayerRef<'a>>) -> Result<(), EngineError> {
        let index = self.layers.resolve(layer.into())?;
        self.reset_index(index)
    }

    pub fn reset_current_layer(&mut self) -> Result<(), EngineError> {
        self.reset_index(self.layers.current_index())
    }

    /// Reset a layer and run its attached loader again.
    ///
    /// Changes are batched so observers only see the net effect per key. The
    /// current layer is restored afterwards. A layer without a loader is only
    /// reset.
    pub fn reload_layer<'a>(&mut self, layer: impl Into<LayerRef<'a>>) -> Result<(), EngineError> {
        self.batched_reload(layer.into(), None)
    }

    /// Reload a layer from `loader` instead of its attached one.
    ///
    /// Batching matches [`Engine::reload_layer`]. The attached loader is kept
    /// for later reloads.
    pub fn reload_layer_using<'a>(
        &mut self,
        layer: impl Into<LayerRef<'a>>,
        loader: &mut dyn Loader,
    ) -> Result<(), EngineError> {
        self.batched_reload(layer.into(), Some(loader))
    }

    fn batched_reload(&mut self, layer: LayerRef<'_>, loader: Option<&mut dyn Loader>) -> Result<(), EngineError> {
        let index = self.layers.resolve(layer)?;
        let previous = self.layers.current_index();
        let nested = self.notifications.is_suppressed();

        if !nested {
            self.stop_notifications();
        }
        let result = self.reload_index(index, loader);
        self.layers.set_current(previous);

        let flushed = if nested {
            Ok(())
        } else {
            self.start_notifications(true)
        };
        result.and(flushed)
    }

    fn reload_index(&mut self, index: usize, supplied: Option<&mut dyn Loader>) -> Result<(), EngineError> {
        self.reset_index(index)?;

        let name = self.layers.get(index).map(|l| l.name().to_string()).unwrap_or_default();
        metrics::record_layer_reload(&name);

        if let Some(loader) = supplied {
            tracing::info!(layer = %name, source = %loader.describe(), "Reloading layer");
            self.layers.set_current(index);
            return self.load_into(index, loader);
        }

        let Some(loader) = self.loaders.get_mut(index).and_then(Option::take) else {
            tracing::debug!(layer = %name, "Layer has no loader, reset only");
            return Ok(());
        };
        tracing::info!(layer = %name, source = %loader.describe(), "Reloading layer");
        self.layers.set_current(index);
        self.run_loader(index, loader)
    }

    /// Run a loader and keep it attached to the layer.
    fn run_loader(&mut self, index: usize, mut loader: Box<dyn Loader>) -> Result<(), EngineError> {
        let result = self.load_into(index, loader.as_mut());
        if let Some(slot) = self.loaders.get_mut(index) {
            *slot = Some(loader);
        }
        result
    }

    fn load_into(&mut self, index: usize, loader: &mut dyn Loader) -> Result<(), EngineError> {
        let result = loader.load(self);
        let name = self.layers.get(index).map(|l| l.name().to_string()).unwrap_or_default();
        match &result {
            Ok(()) => tracing::debug!(
                layer = %name,
                source = %loader.describe(),
                keys = self.layers.get(index).map(Layer::len).unwrap_or(0),
                "Layer loaded"
            ),
            Err(e) => tracing::error!(layer = %name, source = %loader.describe(), error = %e, "Layer load failed"),
        }
        result.map_err(|e| EngineError::load(name, e))
    }

    fn reset_index(&mut self, index: usize) -> Result<(), EngineError> {
        let Some(layer) = self.layers.get(index) else {
            return Err(EngineError::missing_layer(LayerRef::Index(index).to_string()));
        };
        let name = layer.name().to_string();
        let keys: Vec<String> = layer.keys().into_iter().map(str::to_string).collect();

        let mut changes = Vec::new();
        for key in keys {
            // Shadowed here: clearing it changes nothing visible.
            if self.cache.winner(&key) != Some(index) {
                continue;
            }

            let fallback = self.layers.find_fallback(index, &key).and_then(|layer| {
                layer.get(&key).map(|value| CacheEntry {
                    layer: layer.index(),
                    value: value.clone(),
                })
            });
            let old = match fallback {
                Some(entry) => self.cache.replace(&key, entry),
                None => self.cache.remove(&key),
            };
            let new = self.cache.value(&key).cloned();
            changes.push(Notification::new(key, old, new));
        }

        if let Some(layer) = self.layers.get_mut(index) {
            layer.clear();
        }

        tracing::info!(layer = %name, affected = changes.len(), "Layer reset");
        metrics::record_layer_reset(&name);
        metrics::record_resolved_keys(self.cache.len());

        for change in changes {
            self.notify(change)?;
        }
        Ok(())
    }

    // --- Notifications ---

    fn notify(&mut self, notification: Notification) -> Result<(), EngineError> {
        if !notification.is_change() {
            return Ok(());
        }
        if self.notifications.is_suppressed() {
            metrics::record_notification("queued");
            self.notifications.queue(notification);
            return Ok(());
        }
        metrics::record_notification("dispatched");
        self.observers.dispatch(&notification).map(|_| ())
    }

    /// Register `observer` for changes of `key`. The engine keeps no strong reference.
    pub fn add_observer_for_key<O: Observer + 'static>(&mut self, key: impl Into<String>, observer: &Rc<O>) {
        self.observers.add(key, observer);
    }

    pub fn remove_observer_for_key<O: Observer + 'static>(&mut self, key: &str, observer: &Rc<O>) -> bool {
        self.observers.remove(key, observer)
    }

    pub fn remove_all_observers_for_key(&mut self, key: &str) -> usize {
        self.observers.remove_all(key)
    }

    pub fn observer_count(&self, key: &str) -> usize {
        self.observers.count(key)
    }

    /// Queue changes instead of dispatching them.
    pub fn stop_notifications(&mut self) {
        self.notifications.suppress();
    }

    pub fn notifications_suppressed(&self) -> bool {
        self.notifications.is_suppressed()
    }

    /// Resume dispatch, optionally delivering the backlog in key order.
    ///
    /// The backlog is discarded in either case.
    pub fn start_notifications(&mut self, send_backlog: bool) -> Result<(), EngineError> {
        let pending = self.notifications.resume();
        if !send_backlog {
            if !pending.is_empty() {
                tracing::debug!(discarded = pending.len(), "Notification backlog discarded");
            }
            return Ok(());
        }
        for notification in &pending {
            metrics::record_notification("dispatched");
            self.observers.dispatch(notification)?;
        }
        Ok(())
    }

    // --- Queries ---

    pub fn exists(&self, key: &str) -> bool {
        self.cache.get(key).is_some()
    }

    pub fn value_of(&self, key: &str) -> Option<&Value> {
        self.cache.value(key)
    }

    /// Name of the layer whose value is currently visible for `key`.
    pub fn layer_name_of(&self, key: &str) -> Option<&str> {
        let index = self.cache.winner(key)?;
        self.layers.get(index).map(Layer::name)
    }

    /// Where the visible value of `key` was set.
    pub fn location_of(&self, key: &str) -> Option<&str> {
        let index = self.cache.winner(key)?;
        self.layers.get(index)?.location(key)
    }

    /// All defined keys, ascending.
    pub fn setting_names(&self) -> Vec<&str> {
        self.cache.keys().collect()
    }

    /// Effective values keyed by setting name.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.cache
            .iter()
            .map(|(key, entry)| (key.to_string(), entry.value.clone()))
            .collect()
    }

    /// Render the effective configuration, one padded row per key.
    pub fn dump(&self, include_locations: bool) -> String {
        let rows: Vec<Vec<String>> = self
            .cache
            .iter()
            .map(|(key, entry)| {
                let mut row = Vec::with_capacity(4);
                if include_locations {
                    let layer = self.layers.get(entry.layer);
                    row.push(layer.map(Layer::name).unwrap_or_default().to_string());
                    row.push(layer.and_then(|l| l.location(key)).unwrap_or_default().to_string());
                }
                row.push(key.to_string());
                row.push(entry.value.to_string());
                row
            })
            .collect();
        format_columns(&rows)
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
    use std::cell::RefCell;

    use crate::engine::ObserverError;

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<Notification>>,
    }

    impl Observer for Recorder {
        fn on_setting_changed(
            &self,
            key: &str,
            old: Option<&Value>,
            new: Option<&Value>,
        ) -> Result<(), ObserverError> {
            self.seen
                .borrow_mut()
                .push(Notification::new(key, old.cloned(), new.cloned()));
            Ok(())
        }
    }

    #[test]
    fn test_new_engine_has_runtime_layer() {
        let engine = Engine::new();
        assert_eq!(engine.layer_names(), vec![RUNTIME_LAYER]);
        assert_eq!(engine.current_layer_name(), RUNTIME_LAYER);
        assert!(engine.setting_names().is_empty());
    }

    #[test]
    fn test_set_value_records_caller_location() {
        let mut engine = Engine::new();
        engine.set_value("k", 1).unwrap();
        let location = engine.location_of("k").unwrap();
        assert!(location.starts_with(file!()), "unexpected location {location}");
    }

    #[test]
    fn test_lower_priority_write_is_shadowed() {
        let mut engine = Engine::new();
        engine.set_value_at("k", "top", "a").unwrap();
        engine.push_layer("low").unwrap();
        engine.set_value_at("k", "bottom", "b").unwrap();

        assert_eq!(engine.value_of("k"), Some(&Value::from("top")));
        assert_eq!(engine.layer_name_of("k"), Some(RUNTIME_LAYER));
        assert_eq!(engine.location_of("k"), Some("a"));
        assert_eq!(engine.layer("low").unwrap().get("k"), Some(&Value::from("bottom")));
    }

    #[test]
    fn test_higher_priority_write_takes_over() {
        let mut engine = Engine::new();
        engine.push_layer("low").unwrap();
        engine.set_value("k", 1).unwrap();
        engine.set_current_layer(RUNTIME_LAYER).unwrap();
        engine.set_value("k", 2).unwrap();
        assert_eq!(engine.layer_name_of("k"), Some(RUNTIME_LAYER));
        assert_eq!(engine.value_of("k"), Some(&Value::from(2)));
    }

    #[test]
    fn test_same_value_fires_nothing() {
        let mut engine = Engine::new();
        let recorder = Rc::new(Recorder::default());
        engine.add_observer_for_key("k", &recorder);

        engine.set_value("k", "v").unwrap();
        engine.set_value("k", "v").unwrap();
        assert_eq!(recorder.seen.borrow().len(), 1);
        assert_eq!(recorder.seen.borrow()[0].old, None);
    }

    #[test]
    fn test_reset_keeps_shadowed_keys_quiet() {
        let mut engine = Engine::new();
        engine.set_value("k", "top").unwrap();
        engine.push_layer("low").unwrap();
        engine.set_value("k", "bottom").unwrap();

        let recorder = Rc::new(Recorder::default());
        engine.add_observer_for_key("k", &recorder);
        engine.reset_layer("low").unwrap();

        assert!(recorder.seen.borrow().is_empty());
        assert_eq!(engine.value_of("k"), Some(&Value::from("top")));
        assert!(engine.layer("low").unwrap().is_empty());
    }

    #[test]
    fn test_reset_current_layer() {
        let mut engine = Engine::new();
        engine.push_layer("file").unwrap();
        engine.set_value("k", 1).unwrap();
        engine.reset_current_layer().unwrap();
        assert!(!engine.exists("k"));
    }

    #[test]
    fn test_reset_falls_back_past_empty_layers() {
        let mut engine = Engine::new();
        engine.set_value("k", "a").unwrap();
        engine.push_layer("middle").unwrap();
        engine.push_layer("bottom").unwrap();
        engine.set_value("k", "c").unwrap();

        engine.reset_layer(0usize).unwrap();
        assert_eq!(engine.layer_name_of("k"), Some("bottom"));
        assert_eq!(engine.value_of("k"), Some(&Value::from("c")));
    }

    #[test]
    fn test_missing_layer_errors() {
        let mut engine = Engine::new();
        assert!(matches!(
            engine.set_current_layer("nope"),
            Err(EngineError::MissingLayer { .. })
        ));
        assert!(matches!(
            engine.reset_layer(7usize),
            Err(EngineError::MissingLayer { .. })
        ));
        assert!(matches!(
            engine.reload_layer("nope"),
            Err(EngineError::MissingLayer { .. })
        ));
    }

    #[test]
    fn test_stop_without_backlog_discards() {
        let mut engine = Engine::new();
        let recorder = Rc::new(Recorder::default());
        engine.add_observer_for_key("k", &recorder);

        engine.stop_notifications();
        engine.set_value("k", 1).unwrap();
        engine.start_notifications(false).unwrap();
        assert!(recorder.seen.borrow().is_empty());

        // Nothing stale is delivered by a later flush.
        engine.stop_notifications();
        engine.start_notifications(true).unwrap();
        assert!(recorder.seen.borrow().is_empty());
    }

    #[test]
    fn test_observer_error_surfaces_after_cache_update() {
        let mut engine = Engine::new();
        let failing = Rc::new(
            |_: &str, _: Option<&Value>, _: Option<&Value>| -> Result<(), ObserverError> {
                Err("rejected".into())
            },
        );
        engine.add_observer_for_key("k", &failing);

        let err = engine.set_value("k", 1).unwrap_err();
        assert!(matches!(err, EngineError::Observer { ref key, .. } if key == "k"));
        assert_eq!(engine.value_of("k"), Some(&Value::from(1)));
    }

    #[test]
    fn test_reload_without_loader_resets() {
        let mut engine = Engine::new();
        engine.push_layer("plain").unwrap();
        engine.set_value("k", 1).unwrap();
        engine.set_current_layer(RUNTIME_LAYER).unwrap();

        engine.reload_layer("plain").unwrap();
        assert!(!engine.exists("k"));
        assert_eq!(engine.current_layer_name(), RUNTIME_LAYER);
        assert!(!engine.notifications_suppressed());
    }

    #[test]
    fn test_reload_using_keeps_attached_loader() {
        use crate::loaders::StaticLoader;

        let mut engine = Engine::new();
        engine
            .push_layer_with("file", StaticLoader::new().with("k", 1))
            .unwrap();
        engine.set_current_layer(RUNTIME_LAYER).unwrap();
        let recorder = Rc::new(Recorder::default());
        engine.add_observer_for_key("k", &recorder);

        let mut replacement = StaticLoader::new().with("k", 2);
        engine.reload_layer_using("file", &mut replacement).unwrap();
        assert_eq!(engine.value_of("k"), Some(&Value::from(2)));
        assert_eq!(
            *recorder.seen.borrow(),
            vec![Notification::new("k", Some(Value::from(1)), Some(Value::from(2)))]
        );
        assert_eq!(engine.current_layer_name(), RUNTIME_LAYER);

        engine.reload_layer("file").unwrap();
        assert_eq!(engine.value_of("k"), Some(&Value::from(1)));
    }

    #[test]
    fn test_snapshot() {
        let mut engine = Engine::new();
        engine.set_value("b", 2).unwrap();
        engine.set_value("a", "x").unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a"], Value::from("x"));
    }
}
