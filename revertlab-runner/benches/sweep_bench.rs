//! Criterion benchmarks for the parameter sweep.
//!
//! Compares sequential and rayon execution of the default 27-point grid.

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use revertlab_core::engine::ExecutionConfig;
use revertlab_core::strategy::StrategyParams;
use revertlab_runner::config::SweepConfig;
use revertlab_runner::data_loader::generate_synthetic_bars;
use revertlab_runner::sweep::{sweep, ParamGrid};

fn bench_sweep(c: &mut Criterion) {
    let bars = generate_synthetic_bars(
        "BENCH",
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        30,
    );
    let grid = ParamGrid::from_config(&SweepConfig::default());
    let base = StrategyParams {
        log_each_bar: false,
        ..StrategyParams::default()
    };
    let exec = ExecutionConfig::default();

    let mut group = c.benchmark_group("sweep_default_grid");
    group.sample_size(10);
    for parallel in [false, true] {
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_function(label, |b| {
            b.iter(|| {
                let results =
                    sweep(&grid, &base, &exec, black_box(&bars), "BENCH", "h", true, parallel)
                        .unwrap();
                black_box(results.len())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sweep);
criterion_main!(benches);
