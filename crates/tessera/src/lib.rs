//! # Tessera
//!
//! **Composable behavior pipelines for message processing**
//!
//! Tessera builds an ordered chain of behaviors from declarative step
//! registrations and runs it once per message:
//!
//! - **Declarative ordering** – steps name the steps they run before or after
//! - **Typed stage changes** – a connector step hands the chain a different context type
//! - **Hierarchical context bag** – per-invocation state with parent fallback
//! - **Pluggable invocation** – four strategies with identical observable behavior
//! - **Layered configuration** – defaults, TOML/JSON files and environment overrides
//!
//! ## Quick Start
//!
//! ```
//! use tessera::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let config = TesseraConfig::builder()
//!     .strategy(InvocationStrategy::ContextSmuggled)
//!     .setting("audit.enabled", true)
//!     .build();
//! let settings = config.to_settings().unwrap();
//!
//! let pipeline = tessera::pipeline_builder::<RootContext>(&config)
//!     .register(
//!         RegisterStep::with_behavior(
//!             "audit",
//!             "Marks the message as audited",
//!             FnBehavior::new(|ctx: &mut RootContext| {
//!                 ctx.extensions_mut().set_with_key("audited", true);
//!                 Ok(())
//!             }),
//!         )
//!         .enabled_when(|s| s.try_get::<bool>("audit.enabled").copied().unwrap_or(false)),
//!     )
//!     .build(&Container::new(), &settings)
//!     .unwrap();
//!
//! let mut ctx = RootContext::new();
//! pipeline.invoke(&mut ctx).await.unwrap();
//! assert!(ctx.extensions().contains("audited"));
//! # });
//! ```
//!
//! ## Architecture
//!
//! ```text
//! TesseraConfig ──► SettingsHolder ──► enablement conditions
//!       │
//!       ▼
//! PipelineBuilder ──► StepCoordinator ──► BehaviorTable ──► Pipeline::invoke
//! ```

#![doc(html_root_url = "https://docs.rs/tessera/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use tessera_core as core;

// Re-export pipeline types
pub use tessera_pipeline as pipeline;

// Re-export configuration types
pub use tessera_config as config;

// Re-export logging setup
pub use tessera_telemetry as telemetry;

use tessera_core::BehaviorContext;
use tessera_pipeline::{PipelineBuilder, PipelineModifications};

/// Starts a pipeline builder carrying the configured invocation options and
/// a removal for every disabled step.
///
/// Disabled steps that the host never registers are ignored with a warning
/// when the pipeline is built.
#[must_use]
pub fn pipeline_builder<C: BehaviorContext>(
    config: &tessera_config::TesseraConfig,
) -> PipelineBuilder<C> {
    let mut modifications = PipelineModifications::new();
    config.pipeline.apply_to(&mut modifications);

    PipelineBuilder::new()
        .options(config.pipeline.to_options())
        .modifications(modifications)
}

/// Installs the global log subscriber described by `config.logging`.
///
/// # Errors
///
/// Returns an error if the filter directives are invalid or a subscriber is
/// already installed.
pub fn init_logging(
    config: &tessera_config::TesseraConfig,
) -> tessera_telemetry::TelemetryResult<()> {
    tessera_telemetry::init_logging(&config.logging.to_log_config())
}

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use tessera::prelude::*;
/// ```
pub mod prelude {
    pub use tessera_core::{
        BehaviorContext, BehaviorResult, Container, ContextBag, ContextBagError, InvocationError,
        MessageId, ObjectBuilder, ReadOnlySettings, RootContext, SettingsHolder,
    };

    pub use tessera_pipeline::{
        Behavior, ConfigurationError, FnBehavior, FnTerminator, InvocationStrategy, Next,
        Pipeline, PipelineBuilder, PipelineModifications, PipelineOptions, RegisterStep,
        RemoveStep, ReplaceStep, Terminator,
    };

    pub use tessera_config::{ConfigError, ConfigLoader, TesseraConfig};
}
