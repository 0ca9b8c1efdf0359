//! Typed configuration for Tessera pipelines.
//!
//! This crate loads the options a host needs to build pipelines and set up
//! logging:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! The configuration is built around the [`TesseraConfig`] struct:
//!
//! - [`PipelineConfig`] - invocation strategy, invocation spans and disabled steps
//! - [`LoggingConfig`] - subscriber level and format
//! - `settings` - typed values copied into a [`tessera_core::SettingsHolder`]
//!   for step enablement conditions
//!
//! # Example
//!
//! ```no_run
//! use tessera_config::{ConfigLoader, TesseraConfig};
//!
//! # fn main() -> Result<(), tessera_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("tessera.toml")?
//!     .with_env_prefix("TESSERA")
//!     .load()?;
//!
//! let settings = config.to_settings()?;
//! let options = config.pipeline.to_options();
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! strategy = "precompiled_delegate"
//! log_invocations = false
//! disabled_steps = ["audit"]
//!
//! [logging]
//! enabled = true
//! level = "info,tessera_pipeline=debug"
//! format = "json"
//!
//! [settings]
//! "outbox.enabled" = true
//! "outbox.batch" = 32
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden via environment variables using the format
//! `PREFIX__SECTION__KEY`. For example:
//!
//! - `TESSERA__PIPELINE__STRATEGY=context_smuggled`
//! - `TESSERA__PIPELINE__DISABLED_STEPS=audit,outbox`
//! - `TESSERA__LOGGING__LEVEL=debug`
//! - `TESSERA__SETTINGS__OUTBOX__ENABLED=false`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_pipeline::{InvocationStrategy, PipelineModifications};

    #[test]
    fn test_default_config() {
        let config = TesseraConfig::default();
        assert_eq!(config.pipeline.strategy, InvocationStrategy::PrecompiledDelegate);
        assert!(config.logging.enabled);
    }

    #[test]
    fn test_documented_file_format_parses() {
        let toml = r#"
            [pipeline]
            strategy = "precompiled_delegate"
            log_invocations = false
            disabled_steps = ["audit"]

            [logging]
            enabled = true
            level = "info,tessera_pipeline=debug"
            format = "json"

            [settings]
            "outbox.enabled" = true
            "outbox.batch" = 32
        "#;

        let config = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load()
            .unwrap();

        let mut modifications = PipelineModifications::new();
        config.pipeline.apply_to(&mut modifications);
        assert_eq!(modifications.removals().len(), 1);
        assert_eq!(config.settings.len(), 2);
    }
}
