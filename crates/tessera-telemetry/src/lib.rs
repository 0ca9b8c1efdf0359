//! Logging setup for Tessera hosts.
//!
//! Tessera's library crates emit `tracing` events and spans but never
//! install a subscriber. This crate provides the one-call setup a host uses
//! to route them to stdout as JSON or pretty text, and the field names
//! ([`logging::fields`]) those events are recorded under:
//!
//! | Event | Level | Fields |
//! |-------|-------|--------|
//! | Step disabled by settings | `debug` | `step.id` |
//! | Step replaced / removed | `debug` | `step.id` |
//! | Removal of unknown step ignored | `warn` | `step.id` |
//! | Step order resolved | `debug` | `pipeline.step_count`, `pipeline.steps` |
//! | Pipeline built | `debug` | `pipeline.context`, `pipeline.strategy`, `pipeline.steps` |
//! | `pipeline.invoke` span | `trace` | `message_id`, `pipeline.strategy`, `pipeline.step_count` |
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production())?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
