//! Benchmarks the full compile-then-execute pipeline on the `spec.md` §8
//! fibonacci scenario, the stable-Rust `criterion` setup
//! `examples/parcadei-ouros`'s benchmarks use (monty's own `benches/main.rs`
//! is nightly-only `#![feature(test)]`, unusable here).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use weave::Context;

const FIB_10: &str = "\
local function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } \
return fib(10);";

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_fib", |b| {
        b.iter(|| {
            let mut ctx = Context::new();
            ctx.load(black_box(FIB_10)).expect("compiles");
        });
    });
}

fn bench_run(c: &mut Criterion) {
    let mut ctx = Context::new();
    ctx.load(FIB_10).expect("compiles");

    c.bench_function("run_fib_10", |b| {
        b.iter(|| {
            ctx.load(FIB_10).expect("compiles");
            ctx.run(0, 1).expect("runs");
            black_box(ctx.get_int(0).expect("int result"));
        });
    });
}

criterion_group!(benches, bench_compile, bench_run);
criterion_main!(benches);
