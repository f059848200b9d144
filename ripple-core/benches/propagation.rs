//! Propagation benchmarks.
//!
//! Run with: cargo bench -p ripple-core

use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::{batch, Computed, Effect, Signal};

fn bench_signal_set(c: &mut Criterion) {
    let source = Signal::new(0i64);
    let mut next = 0;
    c.bench_function("signal_set", |b| {
        b.iter(|| {
            next += 1;
            source.set(black_box(next));
        })
    });
}

fn bench_computed_get_cached(c: &mut Criterion) {
    let source = Signal::new(21i64);
    let s = source.clone();
    let doubled = Computed::new(move || s.get() * 2);
    doubled.get();

    c.bench_function("computed_get_cached", |b| b.iter(|| black_box(doubled.get())));
}

fn bench_deep_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_chain");

    for depth in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("write_read", depth), &depth, |b, &depth| {
            let source = Signal::new(0i64);
            let s = source.clone();
            let mut tail = Computed::new(move || s.get() + 1);
            for _ in 1..depth {
                let prev = tail.clone();
                tail = Computed::new(move || prev.get() + 1);
            }

            let mut next = 0;
            b.iter(|| {
                next += 1;
                source.set(next);
                black_box(tail.get())
            });
        });
    }
    group.finish();
}

fn bench_wide_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for width in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("effects", width), &width, |b, &width| {
            let source = Signal::new(0i64);
            let total = Rc::new(Cell::new(0i64));
            let effects: Vec<Effect> = (0..width)
                .map(|_| {
                    let (s, t) = (source.clone(), total.clone());
                    Effect::new(move || t.set(t.get() + s.get()))
                })
                .collect();

            let mut next = 0;
            b.iter(|| {
                next += 1;
                source.set(next);
            });

            for effect in effects {
                effect.dispose();
            }
        });
    }
    group.finish();
}

fn bench_diamond_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("diamond");

    for width in [2, 16, 128] {
        group.bench_with_input(BenchmarkId::new("fan_in", width), &width, |b, &width| {
            let source = Signal::new(0i64);
            let branches: Vec<Computed<i64>> = (0..width)
                .map(|i| {
                    let s = source.clone();
                    Computed::new(move || s.get() * i)
                })
                .collect();
            let join = Computed::new(move || branches.iter().map(Computed::get).sum::<i64>());

            let runs = Rc::new(Cell::new(0u64));
            let (j, r) = (join.clone(), runs.clone());
            let effect = Effect::new(move || {
                black_box(j.get());
                r.set(r.get() + 1);
            });

            let mut next = 0;
            b.iter(|| {
                next += 1;
                source.set(next);
            });
            effect.dispose();
        });
    }
    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");

    for writes in [10, 100] {
        group.bench_with_input(BenchmarkId::new("writes", writes), &writes, |b, &writes| {
            let signals: Vec<Signal<i64>> = (0..writes).map(|_| Signal::new(0)).collect();
            let all = signals.clone();
            let effect = Effect::new(move || {
                black_box(all.iter().map(Signal::get).sum::<i64>());
            });

            let mut next = 0;
            b.iter(|| {
                next += 1;
                batch(|| {
                    for signal in &signals {
                        signal.set(next);
                    }
                });
            });
            effect.dispose();
        });
    }
    group.finish();
}

criterion_group!(signals, bench_signal_set, bench_computed_get_cached);
criterion_group!(
    graphs,
    bench_deep_chain,
    bench_wide_fan_out,
    bench_diamond_fan_in,
    bench_batched_writes
);
criterion_main!(signals, graphs);
