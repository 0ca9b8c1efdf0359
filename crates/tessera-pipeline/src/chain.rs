//! Behavior table and invocation strategies.
//!
//! Every strategy walks the same [`BehaviorTable`] in the same order and
//! returns the same outcome. They differ only in how a step reaches its
//! successor:
//!
//! | Strategy | Shape built once | Per step at call time |
//! |---|---|---|
//! | [`RecursiveContinuation`](InvocationStrategy::RecursiveContinuation) | nothing | a boxed closure capturing the table and the next position |
//! | [`PrecompiledDelegate`](InvocationStrategy::PrecompiledDelegate) | a linked chain of stages | a borrowed stage reference |
//! | [`ContextSmuggled`](InvocationStrategy::ContextSmuggled) | nothing | a position; the table is read back from the context bag |
//! | [`TrustedPositional`](InvocationStrategy::TrustedPositional) | nothing | a position; the table slot is read without a bounds check |

use crate::behavior::{BehaviorInstance, BoxFuture, ErasedBehavior};
use crate::error::UnknownStrategyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tessera_core::{BehaviorContext, BehaviorResult, InvocationError};

/// How a pipeline links each behavior to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStrategy {
    /// Build a continuation closure per step on every call.
    RecursiveContinuation,
    /// Link the steps once at construction and reuse the links.
    #[default]
    PrecompiledDelegate,
    /// Attach the behavior table to the context and dispatch by position.
    ContextSmuggled,
    /// Like [`ContextSmuggled`](Self::ContextSmuggled), with unchecked slot access.
    TrustedPositional,
}

impl InvocationStrategy {
    /// Every strategy, baseline first.
    pub const ALL: [Self; 4] = [
        Self::RecursiveContinuation,
        Self::PrecompiledDelegate,
        Self::ContextSmuggled,
        Self::TrustedPositional,
    ];

    /// Returns the configuration name of the strategy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RecursiveContinuation => "recursive_continuation",
            Self::PrecompiledDelegate => "precompiled_delegate",
            Self::ContextSmuggled => "context_smuggled",
            Self::TrustedPositional => "trusted_positional",
        }
    }
}

impl fmt::Display for InvocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvocationStrategy {
    type Err = UnknownStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| UnknownStrategyError(s.to_string()))
    }
}

/// The pipeline-owned, index-addressed array of behavior instances.
pub struct BehaviorTable {
    behaviors: Box<[BehaviorInstance]>,
}

impl BehaviorTable {
    pub(crate) fn new(behaviors: Vec<BehaviorInstance>) -> Self {
        Self {
            behaviors: behaviors.into_boxed_slice(),
        }
    }

    /// Returns the number of behaviors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    /// Returns `true` if the table holds no behaviors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Returns the behavior at `index`, or `None` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&BehaviorInstance> {
        self.behaviors.get(index)
    }

    /// Returns the behavior at `index` without a bounds check.
    ///
    /// # Safety
    ///
    /// `index` must be less than [`len`](Self::len).
    #[allow(unsafe_code)]
    #[must_use]
    pub unsafe fn get_trusted(&self, index: usize) -> &BehaviorInstance {
        debug_assert!(index < self.behaviors.len());
        // SAFETY: the caller guarantees `index < len`.
        unsafe { self.behaviors.get_unchecked(index) }
    }

    /// Iterates the behaviors in pipeline order.
    pub fn iter(&self) -> std::slice::Iter<'_, BehaviorInstance> {
        self.behaviors.iter()
    }
}

impl fmt::Debug for BehaviorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.behaviors.iter()).finish()
    }
}

/// What a behavior's `Next` resumes.
pub(crate) enum Continuation<'a> {
    /// End of the table.
    Done,
    Closure(
        Box<
            dyn for<'c> FnOnce(&'c mut dyn BehaviorContext) -> BoxFuture<'c, BehaviorResult>
                + Send
                + 'a,
        >,
    ),
    Compiled(&'a CompiledStage),
    /// A position in the table attached to the context bag. `pinned` is the
    /// dispatching pipeline's own table, which the attached one must be.
    Smuggled {
        index: usize,
        pinned: &'a BehaviorTable,
    },
    /// A position in the table attached to the context bag, trusted as is.
    Trusted { index: usize },
}

impl<'a> Continuation<'a> {
    fn closure<F>(f: F) -> Self
    where
        F: for<'c> FnOnce(&'c mut dyn BehaviorContext) -> BoxFuture<'c, BehaviorResult>
            + Send
            + 'a,
    {
        Self::Closure(Box::new(f))
    }

    pub(crate) fn resume<'b>(self, ctx: &'b mut dyn BehaviorContext) -> BoxFuture<'b, BehaviorResult>
    where
        'a: 'b,
    {
        match self {
            Self::Done => completed(),
            Self::Closure(f) => f(ctx),
            Self::Compiled(stage) => stage.invoke(ctx),
            Self::Smuggled { index, pinned } => invoke_smuggled(ctx, index, pinned),
            Self::Trusted { index } => invoke_trusted(ctx, index),
        }
    }
}

/// A future that is immediately ready with `Ok(())`.
struct Completed;

impl Future for Completed {
    type Output = BehaviorResult;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(Ok(()))
    }
}

/// The completed outcome. `Completed` is zero-sized, so boxing it does not allocate.
pub(crate) fn completed<'a>() -> BoxFuture<'a, BehaviorResult> {
    Box::pin(Completed)
}

/// One link of a precompiled chain.
pub(crate) struct CompiledStage {
    behavior: Arc<dyn ErasedBehavior>,
    next: Option<Box<CompiledStage>>,
}

impl CompiledStage {
    /// Links the table from the last behavior back to the first.
    pub(crate) fn compile(table: &BehaviorTable) -> Option<Box<Self>> {
        table.iter().rev().fold(None, |next, behavior| {
            Some(Box::new(Self {
                behavior: behavior.shared(),
                next,
            }))
        })
    }

    pub(crate) fn invoke<'a>(
        &'a self,
        ctx: &'a mut dyn BehaviorContext,
    ) -> BoxFuture<'a, BehaviorResult> {
        let next = match &self.next {
            Some(stage) => Continuation::Compiled(stage),
            None => Continuation::Done,
        };
        self.behavior.invoke_erased(ctx, next)
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        let mut depth = 1;
        let mut stage = self;
        while let Some(next) = &stage.next {
            depth += 1;
            stage = &**next;
        }
        depth
    }
}

/// Runs the table from `index` on, building the continuation of each step
/// as a fresh closure.
pub(crate) fn invoke_recursive<'b>(
    table: Arc<BehaviorTable>,
    ctx: &'b mut dyn BehaviorContext,
    index: usize,
) -> BoxFuture<'b, BehaviorResult> {
    if index >= table.len() {
        return completed();
    }
    Box::pin(async move {
        let next_table = Arc::clone(&table);
        let next = Continuation::closure(move |ctx: &mut dyn BehaviorContext| {
            invoke_recursive(next_table, ctx, index + 1)
        });
        match table.get(index) {
            Some(behavior) => behavior.invoke(ctx, next).await,
            None => Ok(()),
        }
    })
}

fn missing_table<'a>() -> BoxFuture<'a, BehaviorResult> {
    Box::pin(std::future::ready(Err(InvocationError::MissingBehaviorTable)))
}

/// Runs the table attached to the context bag from `index` on.
///
/// The attached table must be `pinned`, the table of the pipeline that is
/// dispatching; the step itself is borrowed from `pinned`, so the context
/// stays free to be handed on without boxing.
pub(crate) fn invoke_smuggled<'b>(
    ctx: &'b mut dyn BehaviorContext,
    index: usize,
    pinned: &'b BehaviorTable,
) -> BoxFuture<'b, BehaviorResult> {
    let attached = ctx
        .extensions()
        .behaviors()
        .and_then(|table| (**table).downcast_ref::<BehaviorTable>())
        .is_some_and(|table| std::ptr::eq(table, pinned));
    if !attached {
        return missing_table();
    }
    match pinned.get(index) {
        Some(behavior) => behavior.invoke(
            ctx,
            Continuation::Smuggled {
                index: index + 1,
                pinned,
            },
        ),
        None => completed(),
    }
}

/// Runs the table attached to the context bag from `index` on, reading it
/// through a raw pointer and without a bounds check on the slot.
#[allow(unsafe_code)]
pub(crate) fn invoke_trusted<'b>(
    ctx: &'b mut dyn BehaviorContext,
    index: usize,
) -> BoxFuture<'b, BehaviorResult> {
    let table: *const BehaviorTable = match ctx
        .extensions()
        .behaviors()
        .and_then(|table| (**table).downcast_ref::<BehaviorTable>())
    {
        Some(table) => table,
        None => return missing_table(),
    };
    // SAFETY: only `Pipeline` attaches a table, and it holds its own `Arc`
    // to that table for as long as its dispatch future lives. Every trusted
    // continuation is created by a step of that table, inside that dispatch.
    let table = unsafe { &*table };
    if index >= table.len() {
        return completed();
    }
    // SAFETY: `index < table.len()` was checked above.
    let behavior = unsafe { table.get_trusted(index) };
    behavior.invoke(ctx, Continuation::Trusted { index: index + 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{Behavior, Next};
    use tessera_core::RootContext;

    #[derive(Default)]
    struct Trail(std::sync::Mutex<Vec<usize>>);

    struct Mark(usize);

    impl Behavior for Mark {
        type In = RootContext;
        type Out = RootContext;

        fn invoke<'a>(
            &'a self,
            ctx: &'a mut RootContext,
            next: Next<'a, RootContext>,
        ) -> BoxFuture<'a, BehaviorResult> {
            Box::pin(async move {
                let trail = ctx.extensions_mut().get_or_create::<Trail>();
                trail.0.lock().unwrap().push(self.0);
                next.run(ctx).await
            })
        }
    }

    fn table(depth: usize) -> Arc<BehaviorTable> {
        Arc::new(BehaviorTable::new(
            (0..depth).map(|i| BehaviorInstance::new(Mark(i))).collect(),
        ))
    }

    fn trail(ctx: &RootContext) -> Vec<usize> {
        ctx.extensions()
            .try_get::<Trail>()
            .map(|t| t.0.lock().unwrap().clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_strategy_round_trips_through_str() {
        for strategy in InvocationStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<InvocationStrategy>(), Ok(strategy));
        }
        assert_eq!(
            "Context-Smuggled".parse::<InvocationStrategy>(),
            Ok(InvocationStrategy::ContextSmuggled)
        );
        assert!("fastest".parse::<InvocationStrategy>().is_err());
        assert_eq!(InvocationStrategy::default(), InvocationStrategy::PrecompiledDelegate);
    }

    #[test]
    #[allow(unsafe_code)]
    fn test_table_accessors_agree() {
        let table = table(3);
        assert_eq!(table.len(), 3);
        assert!(table.get(3).is_none());
        for index in 0..table.len() {
            let checked = table.get(index).unwrap();
            let trusted = unsafe { table.get_trusted(index) };
            assert!(std::ptr::eq(checked, trusted));
        }
    }

    #[test]
    fn test_compile_links_every_behavior() {
        assert!(CompiledStage::compile(&table(0)).is_none());
        assert_eq!(CompiledStage::compile(&table(5)).unwrap().depth(), 5);
    }

    #[tokio::test]
    async fn test_recursive_runs_in_order() {
        let mut ctx = RootContext::new();
        invoke_recursive(table(4), &mut ctx, 0).await.unwrap();
        assert_eq!(trail(&ctx), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_compiled_runs_in_order() {
        let head = CompiledStage::compile(&table(4)).unwrap();
        let mut ctx = RootContext::new();
        head.invoke(&mut ctx).await.unwrap();
        assert_eq!(trail(&ctx), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_positional_requires_attached_table() {
        let pinned = table(2);
        let mut ctx = RootContext::new();
        let err = invoke_smuggled(&mut ctx, 0, &pinned).await.unwrap_err();
        assert!(matches!(err, InvocationError::MissingBehaviorTable));

        let err = invoke_trusted(&mut ctx, 0).await.unwrap_err();
        assert!(matches!(err, InvocationError::MissingBehaviorTable));
        assert!(trail(&ctx).is_empty());
    }

    #[tokio::test]
    async fn test_smuggled_rejects_foreign_table() {
        let pinned = table(2);
        let mut ctx = RootContext::new();
        ctx.extensions_mut().replace_behaviors(Some(table(2)));

        let err = invoke_smuggled(&mut ctx, 0, &pinned).await.unwrap_err();
        assert!(matches!(err, InvocationError::MissingBehaviorTable));
    }

    #[tokio::test]
    async fn test_positional_runs_in_order() {
        let pinned = table(4);
        let mut ctx = RootContext::new();
        ctx.extensions_mut().replace_behaviors(Some(pinned.clone()));
        invoke_smuggled(&mut ctx, 0, &pinned).await.unwrap();
        assert_eq!(trail(&ctx), vec![0, 1, 2, 3]);

        let mut ctx = RootContext::new();
        ctx.extensions_mut().replace_behaviors(Some(pinned.clone()));
        invoke_trusted(&mut ctx, 0).await.unwrap();
        assert_eq!(trail(&ctx), vec![0, 1, 2, 3]);
    }
}
