//! Behavior and terminator traits.
//!
//! A [`Behavior`] receives a mutable context and a [`Next`] continuation. It
//! may act before and after calling `next.run(ctx)`, or return without
//! forwarding to short-circuit the rest of the pipeline. A [`Terminator`] ends
//! the chain and receives no continuation at all.
//!
//! Both traits are typed over their context. [`BehaviorInstance`] erases the
//! types so a pipeline can hold a heterogeneous, ordered table of steps; the
//! input and output context types are recorded and checked once when the
//! pipeline is built.
//!
//! # Example
//!
//! ```
//! use tessera_core::{BehaviorContext, BehaviorResult, RootContext};
//! use tessera_pipeline::{Behavior, BoxFuture, Next};
//!
//! struct Audit;
//!
//! impl Behavior for Audit {
//!     type In = RootContext;
//!     type Out = RootContext;
//!
//!     fn invoke<'a>(
//!         &'a self,
//!         ctx: &'a mut RootContext,
//!         next: Next<'a, RootContext>,
//!     ) -> BoxFuture<'a, BehaviorResult> {
//!         Box::pin(async move {
//!             ctx.extensions_mut().set_with_key("audited", true);
//!             next.run(ctx).await
//!         })
//!     }
//! }
//! ```

use crate::chain::Continuation;
use std::any::{type_name, TypeId};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tessera_core::{BehaviorContext, BehaviorResult, InvocationError};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One middleware unit in a pipeline.
///
/// Pass-through behaviors use `Out = In`. Stage connectors declare a
/// different `Out` and forward a context derived from the one they receive.
///
/// Behaviors are shared by every concurrent invocation of their pipeline and
/// must not keep per-invocation state in `self`.
pub trait Behavior: Send + Sync + 'static {
    /// The context this behavior accepts.
    type In: BehaviorContext;

    /// The context this behavior forwards to the next step.
    type Out: BehaviorContext;

    /// Runs the behavior.
    ///
    /// Returning without calling `next.run` skips every later step.
    fn invoke<'a>(
        &'a self,
        ctx: &'a mut Self::In,
        next: Next<'a, Self::Out>,
    ) -> BoxFuture<'a, BehaviorResult>;
}

/// The final, non-forwarding step of a pipeline.
pub trait Terminator: Send + Sync + 'static {
    /// The context this terminator accepts.
    type In: BehaviorContext;

    /// Produces the outcome of the pipeline.
    fn terminate<'a>(&'a self, ctx: &'a mut Self::In) -> BoxFuture<'a, BehaviorResult>;
}

impl<B: Behavior> Behavior for Arc<B> {
    type In = B::In;
    type Out = B::Out;

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut Self::In,
        next: Next<'a, Self::Out>,
    ) -> BoxFuture<'a, BehaviorResult> {
        (**self).invoke(ctx, next)
    }
}

impl<T: Terminator> Terminator for Arc<T> {
    type In = T::In;

    fn terminate<'a>(&'a self, ctx: &'a mut Self::In) -> BoxFuture<'a, BehaviorResult> {
        (**self).terminate(ctx)
    }
}

/// The rest of the pipeline, as seen from one behavior.
///
/// `run` consumes the value, so a behavior can forward at most once.
#[must_use = "dropping `Next` without running it skips the rest of the pipeline"]
pub struct Next<'a, C> {
    inner: Continuation<'a>,
    _context: PhantomData<fn(&mut C)>,
}

impl<'a, C: BehaviorContext> Next<'a, C> {
    pub(crate) fn new(inner: Continuation<'a>) -> Self {
        Self {
            inner,
            _context: PhantomData,
        }
    }

    /// A continuation that completes immediately.
    ///
    /// Useful for driving a single behavior in a unit test.
    pub fn completed() -> Self {
        Self::new(Continuation::Done)
    }

    /// Invokes the remaining steps with `ctx`.
    pub fn run<'b>(self, ctx: &'b mut C) -> BoxFuture<'b, BehaviorResult>
    where
        'a: 'b,
    {
        self.inner.resume(ctx)
    }
}

impl<C> fmt::Debug for Next<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("context", &type_name::<C>())
            .finish_non_exhaustive()
    }
}

/// The type of a context a step accepts or forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextType {
    id: TypeId,
    name: &'static str,
}

impl ContextType {
    /// Returns the context type of `C`.
    #[must_use]
    pub fn of<C: BehaviorContext>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: type_name::<C>(),
        }
    }

    /// Returns the [`TypeId`] of the context.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

pub(crate) trait ErasedBehavior: Send + Sync {
    fn invoke_erased<'a>(
        &'a self,
        ctx: &'a mut dyn BehaviorContext,
        next: Continuation<'a>,
    ) -> BoxFuture<'a, BehaviorResult>;
}

struct BehaviorAdapter<B>(B);

impl<B: Behavior> ErasedBehavior for BehaviorAdapter<B> {
    fn invoke_erased<'a>(
        &'a self,
        ctx: &'a mut dyn BehaviorContext,
        next: Continuation<'a>,
    ) -> BoxFuture<'a, BehaviorResult> {
        let found = ctx.context_name();
        match ctx.downcast_mut::<B::In>() {
            Some(ctx) => self.0.invoke(ctx, Next::new(next)),
            None => mismatch::<B::In>(found),
        }
    }
}

struct TerminatorAdapter<T>(T);

impl<T: Terminator> ErasedBehavior for TerminatorAdapter<T> {
    fn invoke_erased<'a>(
        &'a self,
        ctx: &'a mut dyn BehaviorContext,
        _next: Continuation<'a>,
    ) -> BoxFuture<'a, BehaviorResult> {
        let found = ctx.context_name();
        match ctx.downcast_mut::<T::In>() {
            Some(ctx) => self.0.terminate(ctx),
            None => mismatch::<T::In>(found),
        }
    }
}

fn mismatch<'a, C>(found: &'static str) -> BoxFuture<'a, BehaviorResult> {
    Box::pin(std::future::ready(Err(InvocationError::ContextMismatch {
        expected: type_name::<C>(),
        found,
    })))
}

/// A type-erased behavior or terminator, owned by a pipeline's behavior table.
#[derive(Clone)]
pub struct BehaviorInstance {
    behavior: Arc<dyn ErasedBehavior>,
    name: &'static str,
    input: ContextType,
    output: Option<ContextType>,
}

impl BehaviorInstance {
    /// Wraps a forwarding behavior.
    pub fn new<B: Behavior>(behavior: B) -> Self {
        Self {
            behavior: Arc::new(BehaviorAdapter(behavior)),
            name: type_name::<B>(),
            input: ContextType::of::<B::In>(),
            output: Some(ContextType::of::<B::Out>()),
        }
    }

    /// Wraps a terminator.
    pub fn terminator<T: Terminator>(terminator: T) -> Self {
        Self {
            behavior: Arc::new(TerminatorAdapter(terminator)),
            name: type_name::<T>(),
            input: ContextType::of::<T::In>(),
            output: None,
        }
    }

    /// Returns the type name of the wrapped behavior.
    #[must_use]
    pub fn behavior_name(&self) -> &'static str {
        self.name
    }

    /// Returns the context type the behavior accepts.
    #[must_use]
    pub fn input_type(&self) -> ContextType {
        self.input
    }

    /// Returns the context type the behavior forwards, or `None` for a terminator.
    #[must_use]
    pub fn output_type(&self) -> Option<ContextType> {
        self.output
    }

    /// Returns `true` if this instance wraps a [`Terminator`].
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.output.is_none()
    }

    pub(crate) fn invoke<'a>(
        &'a self,
        ctx: &'a mut dyn BehaviorContext,
        next: Continuation<'a>,
    ) -> BoxFuture<'a, BehaviorResult> {
        self.behavior.invoke_erased(ctx, next)
    }

    pub(crate) fn shared(&self) -> Arc<dyn ErasedBehavior> {
        Arc::clone(&self.behavior)
    }
}

impl fmt::Debug for BehaviorInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorInstance")
            .field("behavior", &self.name)
            .field("input", &self.input.name)
            .field("output", &self.output.map(|o| o.name))
            .finish()
    }
}

/// A pass-through behavior built from a synchronous closure.
///
/// The closure runs before the rest of the pipeline. An error returned from
/// it short-circuits the pipeline.
///
/// # Example
///
/// ```
/// use tessera_core::{BehaviorContext, RootContext};
/// use tessera_pipeline::FnBehavior;
///
/// let stamp = FnBehavior::new(|ctx: &mut RootContext| {
///     ctx.extensions_mut().set_with_key("stamped", true);
///     Ok(())
/// });
/// ```
pub struct FnBehavior<C, F> {
    func: F,
    _context: PhantomData<fn(&mut C)>,
}

impl<C, F> FnBehavior<C, F>
where
    C: BehaviorContext,
    F: Fn(&mut C) -> BehaviorResult + Send + Sync + 'static,
{
    /// Creates a new function-based behavior.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _context: PhantomData,
        }
    }
}

impl<C, F> Behavior for FnBehavior<C, F>
where
    C: BehaviorContext,
    F: Fn(&mut C) -> BehaviorResult + Send + Sync + 'static,
{
    type In = C;
    type Out = C;

    fn invoke<'a>(&'a self, ctx: &'a mut C, next: Next<'a, C>) -> BoxFuture<'a, BehaviorResult> {
        Box::pin(async move {
            (self.func)(ctx)?;
            next.run(ctx).await
        })
    }
}

/// A terminator built from a synchronous closure.
pub struct FnTerminator<C, F> {
    func: F,
    _context: PhantomData<fn(&mut C)>,
}

impl<C, F> FnTerminator<C, F>
where
    C: BehaviorContext,
    F: Fn(&mut C) -> BehaviorResult + Send + Sync + 'static,
{
    /// Creates a new function-based terminator.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _context: PhantomData,
        }
    }
}

impl<C, F> Terminator for FnTerminator<C, F>
where
    C: BehaviorContext,
    F: Fn(&mut C) -> BehaviorResult + Send + Sync + 'static,
{
    type In = C;

    fn terminate<'a>(&'a self, ctx: &'a mut C) -> BoxFuture<'a, BehaviorResult> {
        let result = (self.func)(ctx);
        Box::pin(std::future::ready(result))
    }
}
