use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use ev_engine::calibrator::FileCalibrationStore;
use ev_engine::config::EngineConfig;
use ev_engine::export::write_simulation_csv;
use ev_engine::logging::init_tracing;
use ev_engine::odds::OddsPayload;
use ev_engine::pipeline::{PipelineConfig, run_pipeline};
use ev_engine::tracker::{CalibrationLog, CalibrationTracker, TrackerOutcome, parse_week_list};

const DEFAULT_SEASON: u32 = 2025;
const DEFAULT_DATA_DIR: &str = "data/historical_odds";

struct WeekReport {
    week: u32,
    simulated: usize,
    outcome: TrackerOutcome,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let weeks = parse_weeks_arg().unwrap_or_else(|| (1..=18).collect());
    if weeks.is_empty() {
        return Err(anyhow!("no weeks resolved"));
    }
    let season = parse_u64_arg("--season")
        .map(|s| s as u32)
        .unwrap_or(DEFAULT_SEASON);
    let snapshot = parse_string_arg("--snapshot").unwrap_or_else(|| "opening".to_string());
    let data_dir = parse_string_arg("--data-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    let mut cfg = EngineConfig::from_env();
    if let Some(n) = parse_u64_arg("--sims") {
        cfg = cfg.with_sims(n.min(u32::MAX as u64) as u32);
    }
    if let Some(seed) = parse_u64_arg("--seed") {
        cfg.seed = Some(seed);
    }
    if let Some(dir) = parse_string_arg("--out-dir") {
        cfg.output_dir = PathBuf::from(dir);
    }
    if let Some(results) = parse_string_arg("--results") {
        cfg.results_path = PathBuf::from(results);
    }
    fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("create output dir {}", cfg.output_dir.display()))?;

    let store = FileCalibrationStore::new(&cfg.calibration_path);
    let pipeline_cfg = PipelineConfig::from_engine(&cfg);
    let tracker = CalibrationTracker::new(&cfg.results_path, CalibrationLog::new(&cfg.output_dir));

    let mut reports = Vec::new();
    let mut missing = Vec::new();

    for week in &weeks {
        let path = data_dir.join(format!("{season}_week{week}_{snapshot}.json"));
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(week, path = %path.display(), error = %err, "week file missing, skipping");
                missing.push(*week);
                continue;
            }
        };
        let payload = match OddsPayload::from_json(&raw) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(week, path = %path.display(), error = %err, "week file malformed, skipping");
                missing.push(*week);
                continue;
            }
        };

        let run = run_pipeline(&payload, &store, &pipeline_cfg);
        let out = cfg.output_dir.join(format!("sim_output_week{week}.csv"));
        write_simulation_csv(&out, &run.rows)?;
        info!(week, rows = run.rows.len(), path = %out.display(), "wrote weekly simulations");

        let label = format!("{season}_week{week}_{snapshot}");
        let outcome = tracker.run(&run.rows, Some(*week), &label)?;
        reports.push(WeekReport {
            week: *week,
            simulated: run.rows.len(),
            outcome,
        });
    }

    println!("Backtest season {season} ({snapshot})");
    println!(
        "{:<6} {:>9} {:>7} {:>8} {:>9}",
        "week", "simulated", "games", "correct", "accuracy"
    );
    let (mut games, mut correct) = (0usize, 0usize);
    for r in &reports {
        match &r.outcome {
            TrackerOutcome::Scored(batch) => {
                let s = batch.summary();
                games += s.games;
                correct += s.correct;
                println!(
                    "{:<6} {:>9} {:>7} {:>8} {:>8.1}%",
                    r.week, r.simulated, s.games, s.correct, s.accuracy
                );
            }
            TrackerOutcome::Skipped(reason) => {
                println!("{:<6} {:>9}   skipped ({reason:?})", r.week, r.simulated);
            }
        }
    }
    if games > 0 {
        println!(
            "Overall: {correct}/{games} correct ({:.1}%)",
            correct as f64 / games as f64 * 100.0
        );
    }
    if !missing.is_empty() {
        println!("Missing weeks: {missing:?}");
    }
    Ok(())
}

fn parse_string_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    parse_string_arg(name).and_then(|v| v.parse::<u64>().ok())
}

fn parse_weeks_arg() -> Option<Vec<u32>> {
    parse_string_arg("--weeks").map(|raw| parse_week_list(&raw))
}
