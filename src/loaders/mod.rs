//! Layer loaders.
//!
//! # Data Flow
//! ```text
//! source (argv / environment / YAML, TOML, JSON file / in-memory defaults)
//!     → Loader::load (parse, flatten to dotted keys)
//!     → Engine::set_value_at with a source location per key
//!
//! On file change:
//!     watcher.rs sends the layer name
//!     → owner parses the file into a ParsedFile
//!     → Engine::reload_layer_using applies exactly what was parsed
//! ```
//!
//! # Design Decisions
//! - Loaders receive the engine by `&mut`; there is no global instance
//! - A loader only writes to whatever layer is current when it runs
//! - Loaders are retained by the engine so a layer can be reloaded later

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::engine::{Engine, EngineError};

pub mod cli;
pub mod defaults;
pub mod env;
pub mod file;
pub mod watcher;

pub use cli::CliLoader;
pub use defaults::StaticLoader;
pub use env::EnvLoader;
pub use file::{FileFormat, FileLoader, ParsedFile};
pub use watcher::LayerWatcher;

/// Populates the current layer from some source.
pub trait Loader {
    /// Write every discovered setting through `engine.set_value_at`.
    fn load(&mut self, engine: &mut Engine) -> Result<(), LoadError>;

    /// Short human-readable description of the source, for logs.
    fn describe(&self) -> String;
}

/// Errors that can occur while loading a layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid TOML in {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported configuration format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Invalid command-line argument: {0}")]
    Cli(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl LoadError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn cli<S: Into<String>>(msg: S) -> Self {
        Self::Cli(msg.into())
    }
}
