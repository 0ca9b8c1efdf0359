//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, LogFormat, SettingValue, TesseraConfig};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values or a preset (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// A file only overrides the keys it sets. Tables merge key by key, so a
/// file that sets `pipeline.strategy` on top of
/// [`with_development`](Self::with_development) keeps the preset's logging.
/// Arrays such as `pipeline.disabled_steps` are replaced, not appended to.
///
/// # Example
///
/// ```no_run
/// use tessera_config::ConfigLoader;
///
/// # fn main() -> Result<(), tessera_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("tessera.toml")?
///     .with_env_prefix("TESSERA")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: TesseraConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TesseraConfig::default(),
            env_prefix: None,
            file_loaded: false,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is called automatically by `new()`, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = TesseraConfig::default();
        self
    }

    /// Start with development preset configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_config::{ConfigLoader, LogFormat};
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.logging.format, LogFormat::Pretty);
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = TesseraConfig::development();
        self
    }

    /// Start with production preset configuration.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = TesseraConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats.
    /// The file format is determined by the file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    /// - The file contains unknown fields (strict mode)
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let layer = Self::parse_file(&content, path)?;
        self.merge_layer(layer)?;
        self.file_loaded = true;

        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string.
    ///
    /// # Arguments
    ///
    /// * `content` - Configuration content as a string
    /// * `format` - File format ("toml" or "json")
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_config::ConfigLoader;
    /// use tessera_pipeline::InvocationStrategy;
    ///
    /// let toml = r#"
    ///     [pipeline]
    ///     strategy = "context_smuggled"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.pipeline.strategy, InvocationStrategy::ContextSmuggled);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer = Self::parse_layer(content, &format.to_lowercase()).ok_or_else(|| {
            ConfigError::validation_error(format!("unsupported configuration format: {format}"))
        })??;

        self.merge_layer(layer)?;
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`.
    /// For example, with prefix "TESSERA":
    /// - `TESSERA__PIPELINE__STRATEGY=context_smuggled`
    /// - `TESSERA__LOGGING__LEVEL=debug`
    /// - `TESSERA__SETTINGS__AUDIT__ENABLED=true` sets `audit.enabled`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file for environment variables.
    ///
    /// A missing `.env` file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::validation_error(format!(
                "failed to load .env file: {e}"
            ))),
        }
    }

    /// Returns `true` once a configuration file has been loaded.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment variable overrides (if a prefix was set) and
    /// validates the final configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Environment variable parsing fails
    /// - Configuration validation fails
    pub fn load(mut self) -> Result<TesseraConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> TesseraConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<Value, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        Self::parse_layer(content, &extension).ok_or_else(|| {
            ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))
        })?
    }

    /// Parses one layer. The content is first checked against the full
    /// schema so unknown fields fail with the format's own error.
    fn parse_layer(content: &str, format: &str) -> Option<Result<Value, ConfigError>> {
        let parsed = match format {
            "toml" => toml::from_str::<TesseraConfig>(content)
                .and_then(|_| toml::from_str::<Value>(content))
                .map_err(ConfigError::from),
            "json" => serde_json::from_str::<TesseraConfig>(content)
                .and_then(|_| serde_json::from_str::<Value>(content))
                .map_err(ConfigError::from),
            _ => return None,
        };
        Some(parsed)
    }

    fn merge_layer(&mut self, layer: Value) -> Result<(), ConfigError> {
        let mut merged = serde_json::to_value(&self.config)?;
        merge_values(&mut merged, layer);
        self.config = serde_json::from_value(merged)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        self.apply_env_vars(prefix, env::vars())
    }

    // Only `PREFIX__...` belongs to the loader; `PREFIX_HOME` and the like
    // are left alone.
    fn apply_env_vars<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let scope = format!("{prefix}__");
        let env_vars: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with(&scope))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();

        match parts.as_slice() {
            // Pipeline section
            ["PIPELINE", "STRATEGY"] => {
                self.config.pipeline.strategy = value
                    .parse()
                    .map_err(|e: tessera_pipeline::UnknownStrategyError| {
                        ConfigError::env_parse_error(key, e.to_string())
                    })?;
            }
            ["PIPELINE", "LOG_INVOCATIONS"] => {
                self.config.pipeline.log_invocations = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["PIPELINE", "DISABLED_STEPS"] => {
                self.config.pipeline.disabled_steps = value
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect();
            }

            // Logging section
            ["LOGGING", "ENABLED"] => {
                self.config.logging.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LOGGING", "LEVEL"] => {
                self.config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => {
                self.config.logging.ansi_enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LOGGING", "INCLUDE_LOCATION"] => {
                self.config.logging.include_location = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LOGGING", "SPAN_EVENTS"] => {
                self.config.logging.span_events = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }

            // Free-form settings; nested segments join with '.'
            ["SETTINGS", rest @ ..] if !rest.is_empty() => {
                let name = rest.join(".").to_lowercase();
                self.config
                    .settings
                    .retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
                self.config.settings.insert(name, SettingValue::parse(value));
            }

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }
}

/// Overlays `layer` onto `base`, merging tables key by key.
fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                merge_values(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, layer) => *base = layer,
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
