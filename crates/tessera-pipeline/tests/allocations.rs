//! Heap allocations per invocation for each strategy.
//!
//! A counting global allocator records allocations made on the current
//! thread while a pipeline of pass-through steps is created and polled to
//! completion.

#![allow(unsafe_code)]

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::future::Future;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use tessera_core::{BehaviorResult, Container, RootContext, SettingsHolder};
use tessera_pipeline::{
    Behavior, BoxFuture, InvocationStrategy, Next, Pipeline, PipelineBuilder, RegisterStep,
};

struct CountingAllocator;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

fn allocations() -> usize {
    ALLOCATIONS.with(Cell::get)
}

unsafe fn clone_waker(_: *const ()) -> RawWaker {
    RawWaker::new(std::ptr::null(), &VTABLE)
}

unsafe fn noop(_: *const ()) {}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_waker, noop, noop, noop);

fn noop_waker() -> Waker {
    // SAFETY: every vtable entry ignores the null data pointer.
    unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
}

/// Forwards without doing any work of its own.
struct Forward;

impl Behavior for Forward {
    type In = RootContext;
    type Out = RootContext;

    fn invoke<'a>(
        &'a self,
        ctx: &'a mut RootContext,
        next: Next<'a, RootContext>,
    ) -> BoxFuture<'a, BehaviorResult> {
        next.run(ctx)
    }
}

const DEPTH: usize = 10;

fn pipeline(strategy: InvocationStrategy, depth: usize) -> Pipeline<RootContext> {
    (0..depth)
        .fold(PipelineBuilder::new(), |builder, i| {
            let step = RegisterStep::with_behavior(format!("step-{i}"), "forwards", Forward);
            let step = if i == 0 {
                step
            } else {
                step.insert_after(format!("step-{}", i - 1))
            };
            builder.register(step)
        })
        .strategy(strategy)
        .build(&Container::new(), &SettingsHolder::new())
        .unwrap()
}

/// Allocations made while creating and polling one invocation.
fn allocations_per_invoke(pipeline: &Pipeline<RootContext>, ctx: &mut RootContext) -> usize {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);

    let before = allocations();
    let mut invocation = pipeline.invoke(ctx);
    let outcome = invocation.as_mut().poll(&mut cx);
    let after = allocations();

    assert!(matches!(outcome, Poll::Ready(Ok(()))));
    after - before
}

#[test]
fn allocations_per_invoke_are_pinned() {
    let expected = [
        (InvocationStrategy::RecursiveContinuation, 2 * DEPTH),
        (InvocationStrategy::PrecompiledDelegate, 0),
        (InvocationStrategy::ContextSmuggled, 1),
        (InvocationStrategy::TrustedPositional, 1),
    ];

    for (strategy, count) in expected {
        let pipeline = pipeline(strategy, DEPTH);
        let mut ctx = RootContext::new();

        allocations_per_invoke(&pipeline, &mut ctx);
        assert_eq!(
            allocations_per_invoke(&pipeline, &mut ctx),
            count,
            "{strategy}"
        );
    }
}

#[test]
fn linked_strategies_cost_the_same_at_any_depth() {
    for strategy in [
        InvocationStrategy::PrecompiledDelegate,
        InvocationStrategy::ContextSmuggled,
        InvocationStrategy::TrustedPositional,
    ] {
        let counts: Vec<_> = [1, DEPTH, 4 * DEPTH]
            .into_iter()
            .map(|depth| {
                let pipeline = pipeline(strategy, depth);
                let mut ctx = RootContext::new();
                allocations_per_invoke(&pipeline, &mut ctx);
                allocations_per_invoke(&pipeline, &mut ctx)
            })
            .collect();
        assert!(counts.windows(2).all(|pair| pair[0] == pair[1]), "{strategy}: {counts:?}");
    }
}
