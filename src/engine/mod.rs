//! Layered configuration engine.
//!
//! # Data Flow
//! ```text
//! loader (cli / env / file / defaults)
//!     → Engine::push_layer_with (new layer becomes current)
//!     → Engine::set_value (layer write + cache update)
//!     → observers notified if the effective value changed
//!
//! On reload (file change, explicit call):
//!     Engine::reload_layer
//!     → reset: cache falls back to lower-priority layers
//!     → loader runs again into the same layer
//!     → net changes flushed to observers in key order
//! ```
//!
//! # Design Decisions
//! - First pushed layer wins; `runtime` is pushed by the engine itself
//! - Queries only read the resolution cache, never scan layers
//! - Observers are non-owning and notified synchronously

pub mod cache;
pub mod core;
pub mod dump;
pub mod error;
pub mod layer;
pub mod observer;
pub mod value;

pub use self::core::{Engine, RUNTIME_LAYER};
pub use error::{EngineError, ObserverError};
pub use layer::{Layer, LayerRef};
pub use observer::{Notification, Observer};
pub use value::Value;
