//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Provide an observer that logs effective-value changes
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured default directive
//! - Changes log at info with key, old and new as fields

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::engine::{Observer, ObserverError, Value};

/// Install the global subscriber.
///
/// `default_directive` is used when `RUST_LOG` is unset, e.g. `"confstack=info"`.
pub fn init_logging(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive.into());

    // A second init (tests, embedding hosts) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Logs every change it is notified about.
#[derive(Debug, Default)]
pub struct ChangeLogger;

impl Observer for ChangeLogger {
    fn on_setting_changed(
        &self,
        key: &str,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<(), ObserverError> {
        match (old, new) {
            (None, Some(new)) => tracing::info!(key, new = %new, "Setting defined"),
            (Some(old), None) => tracing::info!(key, old = %old, "Setting removed"),
            (Some(old), Some(new)) => tracing::info!(key, old = %old, new = %new, "Setting changed"),
            (None, None) => {}
        }
        Ok(())
    }
}
