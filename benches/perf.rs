use criterion::{Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::hint::black_box;

use ev_engine::odds::{OddsPayload, flatten_odds};
use ev_engine::pipeline::{PipelineConfig, run_with_calibration};
use ev_engine::simulator::{MonteCarloSimulator, simulate};

fn bench_simulate_single(c: &mut Criterion) {
    c.bench_function("simulate_20k", |b| {
        let mut rng = StdRng::seed_from_u64(3);
        b.iter(|| {
            let r = simulate(black_box(0.58), black_box(0.42), 20_000, &mut rng).unwrap();
            black_box(r.home_win_rate);
        })
    });
}

fn bench_simulate_slate(c: &mut Criterion) {
    let probs: Vec<(f64, f64)> = (0..32)
        .map(|i| {
            let h = 0.3 + (i as f64) * 0.012;
            (h, 1.0 - h)
        })
        .collect();
    let sim = MonteCarloSimulator::new(20_000, 200_000, Some(17));
    c.bench_function("simulate_slate_32x20k", |b| {
        b.iter(|| {
            let out = sim.run_all(black_box(&probs));
            black_box(out.len());
        })
    });
}

fn bench_flatten(c: &mut Criterion) {
    let payload = OddsPayload::from_json(PAYLOAD_JSON).expect("valid fixture json");
    c.bench_function("flatten_odds", |b| {
        b.iter(|| {
            let lines = flatten_odds(black_box(&payload));
            black_box(lines.len());
        })
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let payload = OddsPayload::from_json(PAYLOAD_JSON).expect("valid fixture json");
    let cfg = PipelineConfig {
        seed: Some(5),
        n_sims: 5_000,
        ..PipelineConfig::default()
    };
    c.bench_function("pipeline_fixture_5k", |b| {
        b.iter(|| {
            let run = run_with_calibration(black_box(&payload), None, &cfg);
            black_box(run.opportunities.len());
        })
    });
}

criterion_group!(
    perf,
    bench_simulate_single,
    bench_simulate_slate,
    bench_flatten,
    bench_pipeline
);
criterion_main!(perf);

static PAYLOAD_JSON: &str = include_str!("../tests/fixtures/odds_payload.json");
