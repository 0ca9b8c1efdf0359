//! Invocation strategy benchmarks.
//!
//! Run with: `cargo bench -p tessera-pipeline`
//!
//! Three scenarios at chain depths 10, 20 and 40:
//!
//! - `execution`: every step forwards and the chain succeeds
//! - `exception`: the last step fails
//! - `warmup`: build the pipeline and run it once

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_core::{BehaviorResult, Container, InvocationError, RootContext, SettingsHolder};
use tessera_pipeline::{
    Behavior, BoxFuture, InvocationStrategy, Next, Pipeline, PipelineModifications,
    PipelineOptions, RegisterStep,
};
use tokio::runtime::Runtime;

const DEPTHS: [usize; 3] = [10, 20, 40];

struct Pass;

impl Behavior for Pass {
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

struct Throw;

impl Behavior for Throw {
    type In = RootContext;
    type Out = RootContext;

    fn invoke<'a>(
        &'a self,
        _ctx: &'a mut RootContext,
        _next: Next<'a, RootContext>,
    ) -> BoxFuture<'a, BehaviorResult> {
        Box::pin(std::future::ready(Err(InvocationError::failed("bench failure"))))
    }
}

fn modifications(depth: usize, fail_last: bool) -> PipelineModifications {
    let mut modifications = PipelineModifications::new();
    for index in 0..depth {
        let id = format!("step-{index}");
        let step = if fail_last && index + 1 == depth {
            RegisterStep::with_behavior(id, "fails", Throw)
        } else {
            RegisterStep::with_behavior(id, "forwards", Pass)
        };
        modifications.register(step);
    }
    modifications
}

fn build(modifications: &PipelineModifications, strategy: InvocationStrategy) -> Pipeline<RootContext> {
    Pipeline::build(
        &Container::new(),
        &SettingsHolder::new(),
        modifications,
        PipelineOptions::new(strategy),
    )
    .expect("benchmark pipeline builds")
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

fn bench_execution(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("execution");

    for depth in DEPTHS {
        let modifications = modifications(depth, false);
        for strategy in InvocationStrategy::ALL {
            let pipeline = build(&modifications, strategy);
            group.bench_with_input(BenchmarkId::new(strategy.as_str(), depth), &depth, |b, _| {
                b.iter(|| {
                    let mut ctx = RootContext::new();
                    black_box(rt.block_on(pipeline.invoke(&mut ctx)))
                });
            });
        }
    }
    group.finish();
}

fn bench_exception(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("exception");

    for depth in DEPTHS {
        let modifications = modifications(depth, true);
        for strategy in InvocationStrategy::ALL {
            let pipeline = build(&modifications, strategy);
            group.bench_with_input(BenchmarkId::new(strategy.as_str(), depth), &depth, |b, _| {
                b.iter(|| {
                    let mut ctx = RootContext::new();
                    black_box(rt.block_on(pipeline.invoke(&mut ctx)).is_err())
                });
            });
        }
    }
    group.finish();
}

fn bench_warmup(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("warmup");

    for depth in DEPTHS {
        let modifications = modifications(depth, false);
        for strategy in InvocationStrategy::ALL {
            group.bench_with_input(BenchmarkId::new(strategy.as_str(), depth), &depth, |b, _| {
                b.iter(|| {
                    let pipeline = build(&modifications, strategy);
                    let mut ctx = RootContext::new();
                    black_box(rt.block_on(pipeline.invoke(&mut ctx)))
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_execution, bench_exception, bench_warmup);
criterion_main!(benches);
