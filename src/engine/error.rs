//! Engine error definitions.

use thiserror::Error;

use crate::loaders::LoadError;

/// Error returned by an observer callback.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A layer with this name was already pushed.
    #[error("Layer '{name}' already exists")]
    DuplicateLayer { name: String },

    /// No layer matches the given name or index.
    #[error("Layer '{name}' does not exist")]
    MissingLayer { name: String },

    /// Layer names must be non-empty.
    #[error("Layer name must not be empty")]
    InvalidLayerName,

    /// An observer callback failed while a change was being dispatched.
    #[error("Observer failed while handling change of '{key}': {source}")]
    Observer {
        key: String,
        #[source]
        source: ObserverError,
    },

    /// The loader attached to a layer failed.
    #[error("Loading layer '{layer}' failed: {source}")]
    Load {
        layer: String,
        #[source]
        source: Box<LoadError>,
    },
}

impl EngineError {
    pub fn duplicate_layer<S: Into<String>>(name: S) -> Self {
        Self::DuplicateLayer { name: name.into() }
    }

    pub fn missing_layer<S: Into<String>>(name: S) -> Self {
        Self::MissingLayer { name: name.into() }
    }

    pub fn load<S: Into<String>>(layer: S, source: LoadError) -> Self {
        Self::Load {
            layer: layer.into(),
            source: Box::new(source),
        }
    }
}
