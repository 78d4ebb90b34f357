//! Layered configuration resolution with change notification.
//!
//! Settings come from several precedence-ordered layers (runtime, command
//! line, environment, user/host/site files, built-in defaults). The engine
//! keeps one effective value per key, lets any layer be reset or reloaded on
//! its own, and tells observers when an effective value changes.
//!
//! ```
//! use confstack::{Engine, StaticLoader, Value};
//!
//! let mut engine = Engine::new();
//! engine.set_value("hello", "world")?;
//! engine.push_layer_with("defaults", StaticLoader::new().with("hello", "boo").with("port", 80))?;
//!
//! assert_eq!(engine.value_of("hello"), Some(&Value::from("world")));
//! assert_eq!(engine.layer_name_of("port"), Some("defaults"));
//! # Ok::<(), confstack::EngineError>(())
//! ```

pub mod engine;
pub mod loaders;
pub mod observability;

pub use engine::{Engine, EngineError, Layer, LayerRef, Notification, Observer, ObserverError, Value, RUNTIME_LAYER};
pub use loaders::{CliLoader, EnvLoader, FileLoader, LayerWatcher, LoadError, Loader, ParsedFile, StaticLoader};
