//! Step registrations and pipeline modifications.
//!
//! A pipeline is described declaratively: a list of [`RegisterStep`]
//! additions, [`RemoveStep`] removals and [`ReplaceStep`] replacements,
//! collected in [`PipelineModifications`]. Nothing is built until the
//! modifications are handed to a coordinator.

use crate::behavior::{Behavior, BehaviorInstance, Terminator};
use std::fmt;
use std::sync::Arc;
use tessera_core::{BuildError, ObjectBuilder, ReadOnlySettings};

/// Produces a step's behavior from the object builder.
pub type BehaviorFactory =
    Arc<dyn Fn(&dyn ObjectBuilder) -> Result<BehaviorInstance, BuildError> + Send + Sync>;

/// Decides at registration time whether a step takes part in the pipeline.
pub type EnablementCondition = Arc<dyn Fn(&dyn ReadOnlySettings) -> bool + Send + Sync>;

/// An ordering relation to another step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReference {
    id: String,
    required: bool,
}

impl StepReference {
    /// Returns the referenced step id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns `false` for `*_if_exists` references, which are dropped when
    /// the target is absent.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// Adds a step to a pipeline.
///
/// # Example
///
/// ```
/// use tessera_core::{BehaviorContext, RootContext};
/// use tessera_pipeline::{FnBehavior, RegisterStep};
///
/// let step = RegisterStep::with_behavior(
///     "stamp",
///     "Stamps the message",
///     FnBehavior::new(|ctx: &mut RootContext| {
///         ctx.extensions_mut().set_with_key("stamped", true);
///         Ok(())
///     }),
/// )
/// .insert_after("deserialize")
/// .insert_before_if_exists("audit");
///
/// assert_eq!(step.id(), "stamp");
/// ```
#[derive(Clone)]
pub struct RegisterStep {
    id: String,
    description: String,
    before: Vec<StepReference>,
    after: Vec<StepReference>,
    factory: BehaviorFactory,
    condition: Option<EnablementCondition>,
}

impl RegisterStep {
    /// Creates a registration with a custom factory.
    pub fn new<F>(id: impl Into<String>, description: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&dyn ObjectBuilder) -> Result<BehaviorInstance, BuildError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            description: description.into(),
            before: Vec::new(),
            after: Vec::new(),
            factory: Arc::new(factory),
            condition: None,
        }
    }

    /// Registers one shared behavior instance.
    pub fn with_behavior<B: Behavior>(
        id: impl Into<String>,
        description: impl Into<String>,
        behavior: B,
    ) -> Self {
        let behavior = Arc::new(behavior);
        Self::new(id, description, move |_: &dyn ObjectBuilder| {
            Ok(BehaviorInstance::new(Arc::clone(&behavior)))
        })
    }

    /// Registers a behavior resolved from the object builder when the
    /// pipeline is built.
    pub fn of_type<B: Behavior>(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(id, description, |builder: &dyn ObjectBuilder| {
            builder.build::<B>().map(BehaviorInstance::new)
        })
    }

    /// Registers one shared terminator instance.
    pub fn terminator<T: Terminator>(
        id: impl Into<String>,
        description: impl Into<String>,
        terminator: T,
    ) -> Self {
        let terminator = Arc::new(terminator);
        Self::new(id, description, move |_: &dyn ObjectBuilder| {
            Ok(BehaviorInstance::terminator(Arc::clone(&terminator)))
        })
    }

    /// Requires this step to run before `id`.
    pub fn insert_before(mut self, id: impl Into<String>) -> Self {
        self.before.push(StepReference {
            id: id.into(),
            required: true,
        });
        self
    }

    /// Requires this step to run after `id`.
    pub fn insert_after(mut self, id: impl Into<String>) -> Self {
        self.after.push(StepReference {
            id: id.into(),
            required: true,
        });
        self
    }

    /// Runs this step before `id` if that step is present.
    pub fn insert_before_if_exists(mut self, id: impl Into<String>) -> Self {
        self.before.push(StepReference {
            id: id.into(),
            required: false,
        });
        self
    }

    /// Runs this step after `id` if that step is present.
    pub fn insert_after_if_exists(mut self, id: impl Into<String>) -> Self {
        self.after.push(StepReference {
            id: id.into(),
            required: false,
        });
        self
    }

    /// Only registers the step if `condition` holds for the settings the
    /// pipeline is built with.
    pub fn enabled_when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&dyn ReadOnlySettings) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Returns the step id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the steps this one must precede.
    #[must_use]
    pub fn before(&self) -> &[StepReference] {
        &self.before
    }

    /// Returns the steps this one must follow.
    #[must_use]
    pub fn after(&self) -> &[StepReference] {
        &self.after
    }

    /// Evaluates the enablement condition. Steps without one are always enabled.
    #[must_use]
    pub fn is_enabled(&self, settings: &dyn ReadOnlySettings) -> bool {
        self.condition
            .as_ref()
            .map_or(true, |condition| condition(settings))
    }

    pub(crate) fn factory(&self) -> &BehaviorFactory {
        &self.factory
    }
}

impl fmt::Debug for RegisterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterStep")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("before", &self.before)
            .field("after", &self.after)
            .field("conditional", &self.condition.is_some())
            .finish_non_exhaustive()
    }
}

/// Removes a previously added step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveStep {
    id: String,
}

impl RemoveStep {
    /// Creates a removal of `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Returns the target id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Swaps the behavior of an added step, keeping its id and position.
#[derive(Clone)]
pub struct ReplaceStep {
    id: String,
    description: Option<String>,
    factory: BehaviorFactory,
}

impl ReplaceStep {
    /// Creates a replacement with a custom factory.
    pub fn new<F>(id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&dyn ObjectBuilder) -> Result<BehaviorInstance, BuildError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            description: None,
            factory: Arc::new(factory),
        }
    }

    /// Replaces the step with one shared behavior instance.
    pub fn with_behavior<B: Behavior>(id: impl Into<String>, behavior: B) -> Self {
        let behavior = Arc::new(behavior);
        Self::new(id, move |_: &dyn ObjectBuilder| {
            Ok(BehaviorInstance::new(Arc::clone(&behavior)))
        })
    }

    /// Replaces the step with a behavior resolved from the object builder.
    pub fn of_type<B: Behavior>(id: impl Into<String>) -> Self {
        Self::new(id, |builder: &dyn ObjectBuilder| {
            builder.build::<B>().map(BehaviorInstance::new)
        })
    }

    /// Replaces the step with one shared terminator instance.
    pub fn terminator<T: Terminator>(id: impl Into<String>, terminator: T) -> Self {
        let terminator = Arc::new(terminator);
        Self::new(id, move |_: &dyn ObjectBuilder| {
            Ok(BehaviorInstance::terminator(Arc::clone(&terminator)))
        })
    }

    /// Overrides the description of the replaced step.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the target id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn new_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub(crate) fn factory(&self) -> &BehaviorFactory {
        &self.factory
    }
}

impl fmt::Debug for ReplaceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplaceStep")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// The additions, removals and replacements submitted for one pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineModifications {
    additions: Vec<RegisterStep>,
    removals: Vec<RemoveStep>,
    replacements: Vec<ReplaceStep>,
}

impl PipelineModifications {
    /// Creates an empty modification set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step.
    pub fn register(&mut self, step: RegisterStep) -> &mut Self {
        self.additions.push(step);
        self
    }

    /// Removes the step with `id`.
    pub fn remove(&mut self, id: impl Into<String>) -> &mut Self {
        self.removals.push(RemoveStep::new(id));
        self
    }

    /// Replaces a step.
    pub fn replace(&mut self, step: ReplaceStep) -> &mut Self {
        self.replacements.push(step);
        self
    }

    /// Appends every modification of `other`.
    pub fn extend(&mut self, other: PipelineModifications) -> &mut Self {
        self.additions.extend(other.additions);
        self.removals.extend(other.removals);
        self.replacements.extend(other.replacements);
        self
    }

    /// Returns the additions in registration order.
    #[must_use]
    pub fn additions(&self) -> &[RegisterStep] {
        &self.additions
    }

    /// Returns the removals.
    #[must_use]
    pub fn removals(&self) -> &[RemoveStep] {
        &self.removals
    }

    /// Returns the replacements.
    #[must_use]
    pub fn replacements(&self) -> &[ReplaceStep] {
        &self.replacements
    }

    /// Returns `true` if nothing was submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty() && self.replacements.is_empty()
    }
}
