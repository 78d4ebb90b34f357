//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! engine / loaders / watcher produce:
//!     → logging.rs (structured log events, change log observer)
//!     → metrics.rs (write, notification and reset counters)
//!
//! Consumers:
//!     → stderr via tracing-subscriber
//!     → whichever metrics recorder the host installs
//! ```
//!
//! # Design Decisions
//! - Structured fields (layer, key) rather than formatted messages
//! - Metrics go through the `metrics` facade; without a recorder they are no-ops

pub mod logging;
pub mod metrics;
