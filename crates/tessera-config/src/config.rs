//! Main configuration types.
//!
//! This module provides the top-level [`TesseraConfig`] struct and its builder.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tessera_core::SettingsHolder;
use tessera_pipeline::InvocationStrategy;

use crate::{ConfigError, LogFormat, LoggingConfig, PipelineConfig, SettingValue};

/// Complete Tessera configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use tessera_config::TesseraConfig;
/// use tessera_pipeline::InvocationStrategy;
///
/// let config = TesseraConfig::default();
/// assert_eq!(config.pipeline.strategy, InvocationStrategy::PrecompiledDelegate);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct TesseraConfig {
    /// Pipeline construction options.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Values exposed to step enablement conditions through the settings
    /// store. Keys are case-insensitive.
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,
}

impl TesseraConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_config::TesseraConfig;
    /// use tessera_pipeline::InvocationStrategy;
    ///
    /// let config = TesseraConfig::builder()
    ///     .strategy(InvocationStrategy::ContextSmuggled)
    ///     .setting("audit.enabled", true)
    ///     .build();
    ///
    /// assert_eq!(config.pipeline.strategy, InvocationStrategy::ContextSmuggled);
    /// ```
    #[must_use]
    pub fn builder() -> TesseraConfigBuilder {
        TesseraConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The log filter directives do not parse
    /// - A disabled step id is empty or listed twice
    /// - A settings key is empty or differs from another only by case
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging
            .to_log_config()
            .validate()
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;

        let mut disabled = HashSet::new();
        for id in &self.pipeline.disabled_steps {
            if id.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "pipeline.disabled_steps",
                    "step ids must not be empty",
                ));
            }
            if !disabled.insert(id.as_str()) {
                return Err(ConfigError::invalid_value(
                    "pipeline.disabled_steps",
                    format!("step '{id}' is listed more than once"),
                ));
            }
        }

        let mut keys = HashSet::new();
        for key in self.settings.keys() {
            if key.trim().is_empty() {
                return Err(ConfigError::validation_error("settings keys must not be empty"));
            }
            if !keys.insert(key.to_lowercase()) {
                return Err(ConfigError::validation_error(format!(
                    "settings key '{key}' is defined more than once"
                )));
            }
        }

        Ok(())
    }

    /// Builds a settings store holding every `[settings]` entry as an
    /// explicit value.
    ///
    /// # Errors
    ///
    /// Never fails for a fresh store; the error is propagated from
    /// [`SettingsHolder::set`].
    pub fn to_settings(&self) -> Result<SettingsHolder, ConfigError> {
        let mut settings = SettingsHolder::new();
        self.apply_settings(&mut settings)?;
        Ok(settings)
    }

    /// Writes every `[settings]` entry into an existing store.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Settings` if the store is locked.
    pub fn apply_settings(&self, settings: &mut SettingsHolder) -> Result<(), ConfigError> {
        for (key, value) in &self.settings {
            value.store(settings, key)?;
        }
        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// - Pretty log formatting with ANSI colors
    /// - Debug logging for pipeline construction
    /// - Per-invocation trace spans
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_config::TesseraConfig;
    ///
    /// let config = TesseraConfig::development();
    /// assert!(config.pipeline.log_invocations);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.logging.level = "info,tessera_pipeline=debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.ansi_enabled = true;
        config.logging.include_location = true;
        config.logging.span_events = true;

        config.pipeline.log_invocations = true;

        config
    }

    /// Create a production configuration preset.
    ///
    /// - JSON log formatting at `info`
    /// - Precompiled invocation without per-call spans
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_config::{LogFormat, TesseraConfig};
    ///
    /// let config = TesseraConfig::production();
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.logging.ansi_enabled = false;

        config.pipeline.strategy = InvocationStrategy::PrecompiledDelegate;
        config.pipeline.log_invocations = false;

        config
    }
}

/// Builder for [`TesseraConfig`].
#[derive(Debug, Default)]
pub struct TesseraConfigBuilder {
    pipeline: Option<PipelineConfig>,
    logging: Option<LoggingConfig>,
    settings: BTreeMap<String, SettingValue>,
}

impl TesseraConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pipeline configuration.
    #[must_use]
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Set only the invocation strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: InvocationStrategy) -> Self {
        self.pipeline.get_or_insert_with(PipelineConfig::default).strategy = strategy;
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Add one `[settings]` entry.
    #[must_use]
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections will use their default values.
    #[must_use]
    pub fn build(self) -> TesseraConfig {
        TesseraConfig {
            pipeline: self.pipeline.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            settings: self.settings,
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<TesseraConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
