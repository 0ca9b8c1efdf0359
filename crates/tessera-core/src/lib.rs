//! # Tessera Core
//!
//! Core types and contracts for the Tessera behavior pipeline.
//!
//! This crate provides the foundational types the pipeline kernel is built on:
//!
//! - [`ContextBag`] - Hierarchical per-invocation key/value store
//! - [`BehaviorContext`] - The mutable context threaded through a pipeline
//! - [`RootContext`] / [`MessageId`] - Stock root context for an incoming message
//! - [`InvocationError`] / [`ContextBagError`] - Invocation-time failures
//! - [`ReadOnlySettings`] / [`SettingsHolder`] - Settings store consulted at registration
//! - [`ObjectBuilder`] / [`Container`] - Builder used to materialize behaviors

#![doc(html_root_url = "https://docs.rs/tessera-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod bag;
mod context;
pub mod di;
mod error;
pub mod settings;

pub use bag::{BagValue, ContextBag};
pub use context::{BehaviorContext, ContextAny, MessageId, RootContext};
pub use di::{BuildError, Container, ObjectBuilder};
pub use error::{BehaviorResult, ContextBagError, InvocationError};
pub use settings::{ReadOnlySettings, SettingsError, SettingsHolder};
