//! Structured logging for Tessera hosts.
//!
//! The library crates only emit `tracing` events. A host that wants to see
//! them installs a subscriber once at startup with [`init_logging`].
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//!
//! tracing::info!(message_id = %id, "Dispatching message");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directives (e.g. `"info"` or `"info,tessera_pipeline=trace"`).
    pub level: String,

    /// Whether to output JSON format.
    pub json_format: bool,

    /// Whether to log span open/close events. Shows per-invocation spans
    /// when pipelines are built with invocation logging.
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include thread IDs.
    pub thread_ids: bool,

    /// Whether to include target (module path).
    pub include_target: bool,

    /// Whether to emit ANSI colors in pretty output.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            thread_ids: false,
            include_target: true,
            ansi: false,
        }
    }
}

impl LogConfig {
    /// Human-readable output with pipeline construction details.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "info,tessera_pipeline=debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            thread_ids: false,
            include_target: true,
            ansi: true,
        }
    }

    /// JSON output at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self {
            thread_ids: true,
            ..Self::default()
        }
    }

    /// Sets the filter directives.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Checks that the filter directives parse.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfig`] for malformed directives.
    pub fn validate(&self) -> TelemetryResult<()> {
        create_env_filter(&self.level)
            .map(|_| ())
            .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))
    }
}

/// Installs the global `tracing` subscriber.
///
/// Does nothing when `config.enabled` is false.
///
/// # Errors
///
/// Returns [`TelemetryError::LoggingInit`] if the filter is malformed or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(config.ansi)
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::debug!(level = %config.level, json = config.json_format, "Logging initialized");
    Ok(())
}

/// Creates an env filter from a directive string.
///
/// # Errors
///
/// Returns [`TelemetryError::LoggingInit`] if the directives are invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid log filter '{filter}': {e}")))
}

/// Field names used in Tessera's log events.
pub mod fields {
    /// Message id of the invocation context.
    pub const MESSAGE_ID: &str = "message_id";

    /// Step id.
    pub const STEP_ID: &str = "step.id";

    /// Root context type of a pipeline.
    pub const PIPELINE_CONTEXT: &str = "pipeline.context";

    /// Number of steps in a pipeline.
    pub const PIPELINE_STEP_COUNT: &str = "pipeline.step_count";

    /// Ordered step ids of a pipeline.
    pub const PIPELINE_STEPS: &str = "pipeline.steps";

    /// Invocation strategy of a pipeline.
    pub const PIPELINE_STRATEGY: &str = "pipeline.strategy";

    /// Error field name.
    pub const ERROR: &str = "error";
}
