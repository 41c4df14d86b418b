use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mxtape::{CompileConfig, SweepMode};

#[path = "common/mod.rs"]
mod common;
use common::*;

fn bench_sparsity(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparsity");
    for n in [10, 100, 1000] {
        let banded_fn = banded(n, CompileConfig::default());
        let rosen = rosenbrock(n, CompileConfig::default());

        group.bench_with_input(BenchmarkId::new("jacobian_pattern", n), &n, |b, _| {
            b.iter(|| black_box(banded_fn.jacobian_sparsity(0, 0).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("hessian_pattern", n), &n, |b, _| {
            b.iter(|| black_box(rosen.hessian_sparsity(0, 0).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("jacobian_plan", n), &n, |b, _| {
            b.iter(|| black_box(banded_fn.jacobian_plan(0, 0).unwrap()))
        });
    }
    group.finish();
}

fn bench_jacobian(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_jacobian");
    for n in [10, 100, 1000] {
        let inputs = vec![make_input(n)];
        for (name, mode) in [("forward", SweepMode::Forward), ("auto", SweepMode::Auto)] {
            let fun = arrow(n, CompileConfig::default().mode(mode));
            let plan = fun.jacobian_plan(0, 0).unwrap();
            let mut mem = fun.memory(8, 8);
            group.bench_with_input(BenchmarkId::new(format!("arrow_{name}"), n), &inputs, |b, inputs| {
                b.iter(|| black_box(fun.jacobian_with_plan(&mut mem, black_box(inputs), &plan).unwrap()))
            });
        }
        let fun = banded(n, CompileConfig::default());
        let plan = fun.jacobian_plan(0, 0).unwrap();
        let mut mem = fun.memory(8, 0);
        group.bench_with_input(BenchmarkId::new("banded", n), &inputs, |b, inputs| {
            b.iter(|| black_box(fun.jacobian_with_plan(&mut mem, black_box(inputs), &plan).unwrap()))
        });
    }
    group.finish();
}

fn bench_hessian(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_hessian");
    for n in [10, 100, 1000] {
        let fun = rosenbrock(n, CompileConfig::default());
        let plan = fun.hessian_plan(0, 0).unwrap();
        let inputs = vec![make_input(n)];
        let mut mem = fun.memory(plan.nsweeps(), 1);
        group.bench_with_input(BenchmarkId::new("rosenbrock", n), &inputs, |b, inputs| {
            b.iter(|| black_box(fun.hessian_with_plan(&mut mem, black_box(inputs), &plan).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sparsity, bench_jacobian, bench_hessian);
criterion_main!(benches);
