//! Criterion benchmarks for the balancer tests.
//!
//! Three benchmark groups:
//! - `cycle`: one simulation cycle on an 8-8 butterfly
//! - `balance`: output balance test on a 4-4 and an 8-8 butterfly
//! - `sweep`: regular throughput sweep on a 4-4 butterfly

use balancer_core::balancer::{Balancer, Port};
use balancer_core::id::BeltId;
use balancer_core::tester::Tester;
use balancer_core::test_utils::*;
use criterion::{Criterion, criterion_group, criterion_main};

// ===========================================================================
// Network builders
// ===========================================================================

/// Build a `2^stages`-wide butterfly. Stage `s` pairs lanes whose index
/// differs in bit `s`; every splitter takes both lanes and emits fresh ones.
fn build_butterfly(stages: u32) -> Balancer {
    let width = 1usize << stages;
    let mut balancer = Balancer::new();
    let mut lanes: Vec<BeltId> = (0..width).map(|_| add_belt(&mut balancer, 1)).collect();
    for &id in &lanes {
        balancer.add_input(Port::single(id));
    }

    for stage in 0..stages {
        let bit = 1usize << stage;
        let mut next = lanes.clone();
        for low in (0..width).filter(|i| i & bit == 0) {
            let high = low | bit;
            let left = add_belt(&mut balancer, 1);
            let right = add_belt(&mut balancer, 1);
            add_splitter(
                &mut balancer,
                [Some(lanes[low]), Some(lanes[high])],
                [Some(left), Some(right)],
            );
            next[low] = left;
            next[high] = right;
        }
        lanes = next;
    }

    for id in lanes {
        balancer.add_output(Port::single(id));
    }
    balancer
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle");
    group.sample_size(50);

    let mut balancer = build_butterfly(3);
    balancer.fill();

    group.bench_function("8_8_butterfly", |b| {
        b.iter(|| {
            balancer.drain();
            balancer.cycle();
            balancer.supply(None);
        });
    });

    group.finish();
}

fn bench_balance(c: &mut Criterion) {
    let mut group = c.benchmark_group("balance");
    group.sample_size(20);

    let tester = Tester::new();
    for stages in [2, 3] {
        let mut balancer = build_butterfly(stages);
        let width = 1 << stages;
        group.bench_function(format!("output_balance_{width}_{width}"), |b| {
            b.iter(|| tester.test_output_balance(&mut balancer, false).unwrap());
        });
    }

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");
    group.sample_size(10);

    let balancer = build_butterfly(2);
    let tester = Tester::new();

    group.bench_function("regular_4_4", |b| {
        b.iter(|| tester.throughput_sweep(&balancer, false).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_cycle, bench_balance, bench_sweep);
criterion_main!(benches);
