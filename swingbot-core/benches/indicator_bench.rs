//! Criterion benchmarks for the indicator engine and signal evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use swingbot_core::domain::Bar;
use swingbot_core::indicators::{Atr, Indicator, IndicatorConfig, IndicatorSet, Rsi, Sma, Vwap};
use swingbot_core::signals::{SignalConfig, SignalEvaluator};

fn make_bars(n: usize) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2020, 1, 2, 14, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            Bar::new(
                base + chrono::Duration::hours(i as i64),
                close - 0.3,
                close + 1.5,
                close - 1.5,
                close,
                1_000_000.0 + (i % 500) as f64,
            )
        })
        .collect()
}

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicators");
    for n in [100usize, 1_000, 10_000] {
        let bars = make_bars(n);
        group.bench_with_input(BenchmarkId::new("sma_13", n), &bars, |b, bars| {
            b.iter(|| Sma::new(13).compute(black_box(bars)))
        });
        group.bench_with_input(BenchmarkId::new("rsi_9", n), &bars, |b, bars| {
            b.iter(|| Rsi::new(9).compute(black_box(bars)))
        });
        group.bench_with_input(BenchmarkId::new("atr_14", n), &bars, |b, bars| {
            b.iter(|| Atr::new(14).compute(black_box(bars)))
        });
        group.bench_with_input(BenchmarkId::new("vwap", n), &bars, |b, bars| {
            b.iter(|| Vwap::new().compute(black_box(bars)))
        });
    }
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let bars = make_bars(200);
    let cfg = IndicatorConfig::default();
    c.bench_function("indicator_set_200", |b| {
        b.iter(|| IndicatorSet::compute(black_box(&bars), &cfg))
    });

    let ev = SignalEvaluator::new(SignalConfig::default());
    c.bench_function("evaluate_200", |b| b.iter(|| ev.evaluate(black_box(&bars))));
}

criterion_group!(benches, bench_indicators, bench_snapshot);
criterion_main!(benches);
