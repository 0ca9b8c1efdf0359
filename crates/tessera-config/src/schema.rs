//! Configuration sections.

use serde::{Deserialize, Serialize};
use tessera_core::{SettingsError, SettingsHolder};
use tessera_pipeline::{InvocationStrategy, PipelineModifications, PipelineOptions};
use tessera_telemetry::LogConfig;

/// Pipeline construction options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// How behaviors are linked at invocation time.
    #[serde(default)]
    pub strategy: InvocationStrategy,

    /// Wrap every invocation in a `trace` span.
    #[serde(default)]
    pub log_invocations: bool,

    /// Step ids removed from every pipeline built with this configuration.
    #[serde(default)]
    pub disabled_steps: Vec<String>,
}

impl PipelineConfig {
    /// Converts to the options a pipeline is built with.
    #[must_use]
    pub fn to_options(&self) -> PipelineOptions {
        PipelineOptions::new(self.strategy).with_log_invocations(self.log_invocations)
    }

    /// Adds a removal for every disabled step.
    pub fn apply_to(&self, modifications: &mut PipelineModifications) {
        for id in &self.disabled_steps {
            modifications.remove(id.as_str());
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directives (e.g. `info` or `info,tessera_pipeline=debug`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,

    /// Log span open and close events.
    #[serde(default)]
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
            span_events: false,
        }
    }
}

impl LoggingConfig {
    /// Converts to the subscriber configuration.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            json_format: self.format == LogFormat::Json,
            span_events: self.span_events,
            file_line_info: self.include_location,
            ansi: self.ansi_enabled,
            ..LogConfig::default()
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// A value in the `[settings]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SettingValue {
    /// A boolean, stored as `bool`.
    Bool(bool),
    /// An integer, stored as `i64`.
    Integer(i64),
    /// A float, stored as `f64`.
    Float(f64),
    /// A string, stored as `String`.
    String(String),
}

impl SettingValue {
    /// Interprets an environment variable value: `true`/`false`, then an
    /// integer, then a float, otherwise a string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            Self::Bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Self::Bool(false)
        } else if let Ok(value) = raw.parse() {
            Self::Integer(value)
        } else if let Ok(value) = raw.parse() {
            Self::Float(value)
        } else {
            Self::String(raw.to_string())
        }
    }

    /// Writes the typed value under `key` as an explicit setting.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Locked`] if the holder is locked.
    pub fn store(&self, settings: &mut SettingsHolder, key: &str) -> Result<(), SettingsError> {
        match self {
            Self::Bool(value) => settings.set(key, *value),
            Self::Integer(value) => settings.set(key, *value),
            Self::Float(value) => settings.set(key, *value),
            Self::String(value) => settings.set(key, value.clone()),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
