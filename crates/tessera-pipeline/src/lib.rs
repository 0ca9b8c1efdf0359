//! # Tessera Pipeline
//!
//! Ordered behavior chains for message processing.
//!
//! A pipeline is declared as a set of step registrations, each with an id
//! and optional `before`/`after` relations to other steps. The registrations
//! are resolved once into a deterministic order, each step's behavior is
//! built, and the result is frozen into an immutable [`Pipeline`].
//!
//! ```text
//! RegisterStep / RemoveStep / ReplaceStep
//!         │
//!         ▼
//!   StepCoordinator ──► ordered steps ──► BehaviorTable ──► Pipeline::invoke
//! ```
//!
//! Each behavior receives the context and a [`Next`] continuation. Running
//! `next` forwards to the following step; returning without running it ends
//! the chain early. The final step may be a [`Terminator`], which cannot
//! forward at all.
//!
//! ## Invocation strategies
//!
//! How a step reaches its successor is chosen per pipeline with
//! [`InvocationStrategy`]. All strategies produce the same sequence and the
//! same outcome:
//!
//! | Strategy | Description |
//! |----------|-------------|
//! | `RecursiveContinuation` | Allocates a continuation closure per step per call |
//! | `PrecompiledDelegate` | Links the chain once at construction (default) |
//! | `ContextSmuggled` | Attaches the table to the context bag and dispatches by position |
//! | `TrustedPositional` | As `ContextSmuggled`, skipping the bounds check on table reads |
//!
//! ## Example
//!
//! ```
//! use tessera_core::{BehaviorContext, Container, RootContext, SettingsHolder};
//! use tessera_pipeline::{FnBehavior, Pipeline, RegisterStep};
//!
//! # tokio_test::block_on(async {
//! let pipeline = Pipeline::<RootContext>::builder()
//!     .register(
//!         RegisterStep::with_behavior(
//!             "audit",
//!             "Records the message",
//!             FnBehavior::new(|ctx: &mut RootContext| {
//!                 ctx.extensions_mut().set_with_key("audited", true);
//!                 Ok(())
//!             }),
//!         )
//!         .insert_after_if_exists("deserialize"),
//!     )
//!     .build(&Container::new(), &SettingsHolder::new())
//!     .unwrap();
//!
//! let mut ctx = RootContext::new();
//! pipeline.invoke(&mut ctx).await.unwrap();
//! assert!(ctx.extensions().contains("audited"));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/tessera-pipeline/0.1.0")]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod behavior;
pub mod chain;
pub mod coordinator;
mod error;
pub mod pipeline;
pub mod registration;

pub use behavior::{
    Behavior, BehaviorInstance, BoxFuture, ContextType, FnBehavior, FnTerminator, Next,
    Terminator,
};
pub use chain::{BehaviorTable, InvocationStrategy};
pub use coordinator::{OrderedStep, StepCoordinator};
pub use error::{ConfigurationError, UnknownStrategyError};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineOptions, StepInfo};
pub use registration::{
    BehaviorFactory, EnablementCondition, PipelineModifications, RegisterStep, RemoveStep,
    ReplaceStep, StepReference,
};
