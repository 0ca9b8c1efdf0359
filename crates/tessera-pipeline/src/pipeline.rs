//! The assembled pipeline.
//!
//! A [`Pipeline`] owns its behavior table for its whole lifetime and is
//! immutable once built. Share it behind an `Arc` and invoke it from as many
//! tasks as needed; each invocation owns its context.

use crate::behavior::{BoxFuture, ContextType};
use crate::chain::{
    completed, invoke_recursive, invoke_smuggled, invoke_trusted, BehaviorTable, CompiledStage,
    InvocationStrategy,
};
use crate::coordinator::{OrderedStep, StepCoordinator};
use crate::error::ConfigurationError;
use crate::registration::{PipelineModifications, RegisterStep, RemoveStep, ReplaceStep};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tessera_core::{BagValue, BehaviorContext, BehaviorResult, ObjectBuilder, ReadOnlySettings};
use tessera_telemetry::logging::fields;
use tracing::{field, Instrument};

/// Options fixed at pipeline construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineOptions {
    strategy: InvocationStrategy,
    log_invocations: bool,
}

impl PipelineOptions {
    /// Creates options using `strategy`, with invocation logging off.
    #[must_use]
    pub const fn new(strategy: InvocationStrategy) -> Self {
        Self {
            strategy,
            log_invocations: false,
        }
    }

    /// Wraps every invocation in a `trace`-level span when `enabled`.
    #[must_use]
    pub const fn with_log_invocations(mut self, enabled: bool) -> Self {
        self.log_invocations = enabled;
        self
    }

    /// Returns the invocation strategy.
    #[must_use]
    pub const fn strategy(&self) -> InvocationStrategy {
        self.strategy
    }

    /// Returns whether invocations are traced.
    #[must_use]
    pub const fn log_invocations(&self) -> bool {
        self.log_invocations
    }
}

/// The id and description of one built step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepInfo {
    id: String,
    description: String,
}

impl StepInfo {
    /// Returns the step id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the step description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

enum Invoker {
    Recursive,
    Compiled(Option<Box<CompiledStage>>),
    Positional { trusted: bool },
}

/// Holds a pipeline's table in the context bag for one dispatch.
///
/// Dropping it, also when the dispatch future is cancelled, restores
/// whatever an enclosing pipeline had attached.
struct AttachedTable<'a, C: BehaviorContext> {
    ctx: &'a mut C,
    previous: Option<BagValue>,
}

impl<'a, C: BehaviorContext> AttachedTable<'a, C> {
    fn attach(ctx: &'a mut C, table: BagValue) -> Self {
        let previous = ctx.extensions_mut().replace_behaviors(Some(table));
        Self { ctx, previous }
    }
}

impl<C: BehaviorContext> Drop for AttachedTable<'_, C> {
    fn drop(&mut self) {
        self.ctx.extensions_mut().replace_behaviors(self.previous.take());
    }
}

/// An ordered, immutable chain of behaviors rooted at context type `C`.
///
/// # Example
///
/// ```
/// use tessera_core::{BehaviorContext, Container, RootContext, SettingsHolder};
/// use tessera_pipeline::{FnBehavior, FnTerminator, InvocationStrategy, Pipeline, RegisterStep};
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::<RootContext>::builder()
///     .register(RegisterStep::with_behavior(
///         "stamp",
///         "Stamps the message",
///         FnBehavior::new(|ctx: &mut RootContext| {
///             ctx.extensions_mut().set_with_key("stamped", true);
///             Ok(())
///         }),
///     ))
///     .register(RegisterStep::terminator(
///         "done",
///         "Ends the chain",
///         FnTerminator::new(|_: &mut RootContext| Ok(())),
///     ))
///     .strategy(InvocationStrategy::ContextSmuggled)
///     .build(&Container::new(), &SettingsHolder::new())?;
///
/// assert_eq!(pipeline.len(), 2);
/// let mut ctx = RootContext::new();
/// pipeline.invoke(&mut ctx).await?;
/// assert!(ctx.extensions().contains("stamped"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// ```
pub struct Pipeline<C> {
    table: Arc<BehaviorTable>,
    steps: Vec<StepInfo>,
    invoker: Invoker,
    options: PipelineOptions,
    _context: PhantomData<fn(&mut C)>,
}

impl<C: BehaviorContext> Pipeline<C> {
    /// Creates a fluent builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder<C> {
        PipelineBuilder::new()
    }

    /// Resolves `modifications` and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the steps cannot be ordered,
    /// built, or chained. No partial pipeline is produced.
    pub fn build(
        builder: &dyn ObjectBuilder,
        settings: &dyn ReadOnlySettings,
        modifications: &PipelineModifications,
        options: PipelineOptions,
    ) -> Result<Self, ConfigurationError> {
        let mut coordinator = StepCoordinator::new(settings);
        coordinator.apply(modifications)?;
        let ordered = coordinator.build_order()?;
        Self::from_steps(builder, &ordered, options)
    }

    /// Builds a pipeline from an already ordered step list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::BuildFailed`],
    /// [`ConfigurationError::ContextMismatch`] or
    /// [`ConfigurationError::TerminatorNotLast`].
    pub fn from_steps(
        builder: &dyn ObjectBuilder,
        ordered: &[OrderedStep],
        options: PipelineOptions,
    ) -> Result<Self, ConfigurationError> {
        let mut behaviors = Vec::with_capacity(ordered.len());
        let mut steps = Vec::with_capacity(ordered.len());
        let mut provided = ContextType::of::<C>();

        for (position, step) in ordered.iter().enumerate() {
            let instance = step
                .build(builder)
                .map_err(|source| ConfigurationError::BuildFailed {
                    id: step.id().to_string(),
                    source,
                })?;

            if instance.input_type() != provided {
                return Err(ConfigurationError::ContextMismatch {
                    id: step.id().to_string(),
                    accepted: instance.input_type().name(),
                    provided: provided.name(),
                });
            }
            match instance.output_type() {
                Some(output) => provided = output,
                None if position + 1 < ordered.len() => {
                    return Err(ConfigurationError::TerminatorNotLast {
                        id: step.id().to_string(),
                    });
                }
                None => {}
            }

            behaviors.push(instance);
            steps.push(StepInfo {
                id: step.id().to_string(),
                description: step.description().to_string(),
            });
        }

        let table = Arc::new(BehaviorTable::new(behaviors));
        let invoker = match options.strategy {
            InvocationStrategy::RecursiveContinuation => Invoker::Recursive,
            InvocationStrategy::PrecompiledDelegate => {
                Invoker::Compiled(CompiledStage::compile(&table))
            }
            InvocationStrategy::ContextSmuggled => Invoker::Positional { trusted: false },
            InvocationStrategy::TrustedPositional => Invoker::Positional { trusted: true },
        };

        tracing::debug!(
            { fields::PIPELINE_CONTEXT } = ContextType::of::<C>().name(),
            { fields::PIPELINE_STEP_COUNT } = steps.len(),
            { fields::PIPELINE_STRATEGY } = options.strategy.as_str(),
            { fields::PIPELINE_STEPS } =
                field::debug(steps.iter().map(StepInfo::id).collect::<Vec<_>>()),
            "Built pipeline"
        );

        Ok(Self {
            table,
            steps,
            invoker,
            options,
            _context: PhantomData,
        })
    }

    /// Runs every behavior in order against `ctx`.
    ///
    /// The first failure aborts the remaining steps and is returned unchanged.
    pub fn invoke<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, BehaviorResult> {
        if !self.options.log_invocations {
            return self.dispatch(ctx);
        }
        let span = tracing::trace_span!(
            "pipeline.invoke",
            { fields::MESSAGE_ID } = ctx.message_id().map(field::display),
            { fields::PIPELINE_STRATEGY } = self.options.strategy.as_str(),
            { fields::PIPELINE_STEP_COUNT } = self.table.len(),
        );
        Box::pin(self.dispatch(ctx).instrument(span))
    }

    fn dispatch<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, BehaviorResult> {
        match &self.invoker {
            Invoker::Recursive => invoke_recursive(Arc::clone(&self.table), ctx, 0),
            Invoker::Compiled(Some(head)) => head.invoke(ctx),
            Invoker::Compiled(None) => completed(),
            Invoker::Positional { trusted } => {
                let trusted = *trusted;
                let pinned: &'a BehaviorTable = &self.table;
                let table: BagValue = self.table.clone();
                Box::pin(async move {
                    let mut attached = AttachedTable::attach(ctx, table);
                    let result = if trusted {
                        invoke_trusted(&mut *attached.ctx, 0).await
                    } else {
                        invoke_smuggled(&mut *attached.ctx, 0, pinned).await
                    };
                    drop(attached);
                    result
                })
            }
        }
    }

    /// Returns the built steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepInfo] {
        &self.steps
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the invocation strategy.
    #[must_use]
    pub fn strategy(&self) -> InvocationStrategy {
        self.options.strategy
    }

    /// Returns the construction options.
    #[must_use]
    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// Returns the behavior table.
    #[must_use]
    pub fn table(&self) -> &BehaviorTable {
        &self.table
    }
}

impl<C> fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Fluent builder for a [`Pipeline`].
pub struct PipelineBuilder<C> {
    modifications: PipelineModifications,
    options: PipelineOptions,
    _context: PhantomData<fn(&mut C)>,
}

impl<C: BehaviorContext> PipelineBuilder<C> {
    /// Creates an empty builder with default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            modifications: PipelineModifications::new(),
            options: PipelineOptions::default(),
            _context: PhantomData,
        }
    }

    /// Adds a step.
    #[must_use]
    pub fn register(mut self, step: RegisterStep) -> Self {
        self.modifications.register(step);
        self
    }

    /// Removes a step.
    #[must_use]
    pub fn remove(mut self, step: RemoveStep) -> Self {
        self.modifications.remove(step.id());
        self
    }

    /// Replaces a step.
    #[must_use]
    pub fn replace(mut self, step: ReplaceStep) -> Self {
        self.modifications.replace(step);
        self
    }

    /// Appends a prepared modification set.
    #[must_use]
    pub fn modifications(mut self, modifications: PipelineModifications) -> Self {
        self.modifications.extend(modifications);
        self
    }

    /// Selects the invocation strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: InvocationStrategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    /// Enables per-invocation tracing spans.
    #[must_use]
    pub fn log_invocations(mut self, enabled: bool) -> Self {
        self.options.log_invocations = enabled;
        self
    }

    /// Replaces all options.
    #[must_use]
    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::build`].
    pub fn build(
        self,
        builder: &dyn ObjectBuilder,
        settings: &dyn ReadOnlySettings,
    ) -> Result<Pipeline<C>, ConfigurationError> {
        Pipeline::build(builder, settings, &self.modifications, self.options)
    }
}

impl<C: BehaviorContext> Default for PipelineBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for PipelineBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("modifications", &self.modifications)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{Behavior, FnBehavior, FnTerminator, Next};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_core::{Container, RootContext, SettingsHolder};

    #[derive(Default)]
    struct Hits(AtomicUsize);

    fn hit() -> FnBehavior<RootContext, impl Fn(&mut RootContext) -> BehaviorResult + Send + Sync + 'static> {
        FnBehavior::new(|ctx: &mut RootContext| {
            ctx.extensions_mut()
                .get_or_create::<Hits>()
                .0
                .fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn hits(ctx: &RootContext) -> usize {
        ctx.extensions()
            .try_get::<Hits>()
            .map_or(0, |hits| hits.0.load(Ordering::SeqCst))
    }

    #[test]
    fn test_options_default_to_precompiled() {
        let options = PipelineOptions::default();
        assert_eq!(options.strategy(), InvocationStrategy::PrecompiledDelegate);
        assert!(!options.log_invocations());
        assert!(PipelineOptions::new(InvocationStrategy::TrustedPositional)
            .with_log_invocations(true)
            .log_invocations());
    }

    #[tokio::test]
    async fn test_every_strategy_runs_all_steps() {
        for strategy in InvocationStrategy::ALL {
            let pipeline = Pipeline::<RootContext>::builder()
                .register(RegisterStep::with_behavior("a", "first", hit()))
                .register(RegisterStep::with_behavior("b", "second", hit()))
                .strategy(strategy)
                .build(&Container::new(), &SettingsHolder::new())
                .unwrap();

            let mut ctx = RootContext::new();
            pipeline.invoke(&mut ctx).await.unwrap();
            assert_eq!(hits(&ctx), 2, "strategy {strategy}");
            assert!(ctx.extensions().behaviors().is_none());
        }
    }

    struct Stall;

    impl Behavior for Stall {
        type In = RootContext;
        type Out = RootContext;

        fn invoke<'a>(
            &'a self,
            _ctx: &'a mut RootContext,
            _next: Next<'a, RootContext>,
        ) -> BoxFuture<'a, BehaviorResult> {
            Box::pin(std::future::pending())
        }
    }

    #[test]
    fn test_cancelled_invocation_restores_attached_table() {
        for strategy in [
            InvocationStrategy::ContextSmuggled,
            InvocationStrategy::TrustedPositional,
        ] {
            let pipeline = Pipeline::<RootContext>::builder()
                .register(RegisterStep::with_behavior("a", "first", hit()))
                .register(RegisterStep::with_behavior("stall", "never finishes", Stall))
                .strategy(strategy)
                .build(&Container::new(), &SettingsHolder::new())
                .unwrap();

            let mut ctx = RootContext::new();
            let outer: BagValue = Arc::new(7_u8);
            ctx.extensions_mut().replace_behaviors(Some(outer));

            let mut invocation = tokio_test::task::spawn(pipeline.invoke(&mut ctx));
            tokio_test::assert_pending!(invocation.poll());
            drop(invocation);

            let restored = ctx
                .extensions()
                .behaviors()
                .and_then(|table| (**table).downcast_ref::<u8>());
            assert_eq!(restored, Some(&7), "{strategy}");
            assert_eq!(hits(&ctx), 1);
        }
    }

    #[tokio::test]
    async fn test_empty_pipeline_completes() {
        for strategy in InvocationStrategy::ALL {
            let pipeline = Pipeline::<RootContext>::builder()
                .strategy(strategy)
                .build(&Container::new(), &SettingsHolder::new())
                .unwrap();
            assert!(pipeline.is_empty());
            pipeline.invoke(&mut RootContext::new()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_traced_invocation_runs() {
        let pipeline = Pipeline::<RootContext>::builder()
            .register(RegisterStep::with_behavior("a", "first", hit()))
            .log_invocations(true)
            .build(&Container::new(), &SettingsHolder::new())
            .unwrap();

        let mut ctx = RootContext::new();
        pipeline.invoke(&mut ctx).await.unwrap();
        assert_eq!(hits(&ctx), 1);
    }

    #[test]
    fn test_steps_report_resolved_order() {
        let pipeline = Pipeline::<RootContext>::builder()
            .register(RegisterStep::with_behavior("b", "second", hit()).insert_after("a"))
            .register(RegisterStep::with_behavior("a", "first", hit()))
            .register(RegisterStep::terminator(
                "t",
                "last",
                FnTerminator::new(|_: &mut RootContext| Ok(())),
            ))
            .build(&Container::new(), &SettingsHolder::new())
            .unwrap();

        let ids: Vec<_> = pipeline.steps().iter().map(StepInfo::id).collect();
        assert_eq!(ids, ["a", "b", "t"]);
        assert_eq!(pipeline.steps()[0].description(), "first");
        assert_eq!(pipeline.table().len(), 3);
        assert!(pipeline.table().get(2).unwrap().is_terminator());
    }

    #[test]
    fn test_terminator_must_be_last() {
        let err = Pipeline::<RootContext>::builder()
            .register(RegisterStep::terminator(
                "t",
                "early",
                FnTerminator::new(|_: &mut RootContext| Ok(())),
            ))
            .register(RegisterStep::with_behavior("a", "after", hit()).insert_after("t"))
            .build(&Container::new(), &SettingsHolder::new())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::TerminatorNotLast { id } if id == "t"));
    }

    #[test]
    fn test_pipeline_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline<RootContext>>();
    }
}
