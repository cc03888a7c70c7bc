//! Benchmarks for tracing diagnostics through long transition chains

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use diagtrack_core::{Diagnostic, Span, Transition, TransitionName};
use diagtrack_engine::{LifetimeTracer, Timeline};

/// A chain of `len` transitions over `width` diagnostics that each shift one
/// line per revision and depart at evenly spread points
fn generate_chain(len: usize, width: usize) -> (Vec<Transition>, Vec<Diagnostic>) {
    let at = |file: usize, line: usize| {
        Diagnostic::new(format!("src/File{}.java", file), line as u32, 1, Span::new(0, 0, 10), "[Bench] finding")
    };
    let departs_at = |file: usize| (file + 1) * len / (width + 1);

    let initial: Vec<Diagnostic> = (0..width).map(|f| at(f, 1)).collect();
    let mut chain = Vec::with_capacity(len);

    for step in 0..len {
        let mut matches = Vec::new();
        let mut departed = Vec::new();

        for f in (0..width).filter(|&f| departs_at(f) >= step) {
            if departs_at(f) == step {
                departed.push(at(f, step + 1));
            } else {
                matches.push((at(f, step + 1), at(f, step + 2)));
            }
        }

        let name = TransitionName::new(step as u64, format!("r{}", step), step as u64 + 1, format!("r{}", step + 1));
        chain.push(Transition::new(name, matches, departed, vec![]).expect("generated chain is consistent"));
    }

    (chain, initial)
}

fn bench_trace(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace");

    for len in [100, 1_000, 5_000] {
        let (chain, initial) = generate_chain(len, 50);
        let tracer = LifetimeTracer::new(&chain);

        group.bench_with_input(BenchmarkId::from_parameter(len), &initial, |b, initial| {
            b.iter(|| {
                for diagnostic in initial {
                    black_box(tracer.trace_from(diagnostic, 0).expect("trace succeeds"));
                }
            })
        });
    }

    group.finish();
}

fn bench_timeline(c: &mut Criterion) {
    let (chain, _) = generate_chain(1_000, 50);

    c.bench_function("timeline_1000", |b| {
        b.iter(|| black_box(Timeline::build(&chain).expect("timeline builds")))
    });
}

criterion_group!(benches, bench_trace, bench_timeline);
criterion_main!(benches);
