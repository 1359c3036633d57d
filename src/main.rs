use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use ev_engine::calibrator::FileCalibrationStore;
use ev_engine::config::EngineConfig;
use ev_engine::export::export_run;
use ev_engine::logging::init_tracing;
use ev_engine::odds::OddsPayload;
use ev_engine::pipeline::{PipelineConfig, PipelineRun, run_pipeline};
use ev_engine::tracker::{CalibrationLog, CalibrationTracker, TrackerOutcome};

const TOP_OPPORTUNITIES: usize = 5;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let mut cfg = EngineConfig::from_env();
    if let Some(n) = parse_u64_arg("--sims") {
        cfg = cfg.with_sims(n.min(u32::MAX as u64) as u32);
    }
    if let Some(seed) = parse_u64_arg("--seed") {
        cfg.seed = Some(seed);
    }
    if let Some(dir) = parse_path_arg("--out-dir") {
        cfg.output_dir = dir;
    }
    if let Some(results) = parse_path_arg("--results") {
        cfg.results_path = results;
    }
    if has_flag("--no-xlsx") {
        cfg.write_xlsx = false;
    } else if has_flag("--xlsx") {
        cfg.write_xlsx = true;
    }

    let payload_path = parse_path_arg("--payload").ok_or_else(|| {
        anyhow!("usage: ev_engine --payload <odds.json> [--snapshot opening|closing]")
    })?;
    let mut payload = load_payload(&payload_path)?;
    if let Some(snapshot) = parse_string_arg("--snapshot") {
        payload.snapshot_type = Some(snapshot);
    }

    let mut pipeline_cfg = PipelineConfig::from_engine(&cfg);
    if let Some(path) = parse_path_arg("--injuries") {
        pipeline_cfg.injury_flags = load_injury_flags(&path)?;
    }

    let store = FileCalibrationStore::new(&cfg.calibration_path);
    let run = run_pipeline(&payload, &store, &pipeline_cfg);
    let report = export_run(&run, &cfg.output_dir, cfg.write_xlsx)?;
    for path in &report.files {
        info!(path = %path.display(), "wrote artifact");
    }

    print_run(&run);

    let label = format!(
        "{}_{}",
        payload.snapshot(),
        payload.timestamp_utc.as_deref().unwrap_or("adhoc")
    );
    let tracker = CalibrationTracker::new(&cfg.results_path, CalibrationLog::new(&cfg.output_dir));
    match tracker.run(&run.rows, None, &label)? {
        TrackerOutcome::Scored(batch) => {
            let s = batch.summary();
            println!();
            println!(
                "Calibration: {}/{} correct ({:.1}%)",
                s.correct, s.games, s.accuracy
            );
            println!(
                "  home picks: {} ({}), away picks: {} ({}), mean pick rate {:.3}",
                s.home_picks,
                fmt_pct(s.home_pick_accuracy),
                s.away_picks,
                fmt_pct(s.away_pick_accuracy),
                s.mean_pick_rate
            );
            let history = tracker.log().load_summary()?;
            if history.len() > 1 {
                let mean =
                    history.iter().map(|h| h.accuracy).sum::<f64>() / history.len() as f64;
                println!("  rolling accuracy over {} batches: {:.1}%", history.len(), mean);
            }
        }
        TrackerOutcome::Skipped(reason) => {
            warn!(?reason, "calibration skipped");
        }
    }

    Ok(())
}

fn print_run(run: &PipelineRun) {
    println!(
        "Simulated {} lines ({} skipped), {} sims each, seed {}{}",
        run.rows.len(),
        run.lines_skipped,
        run.n_sims,
        run.seed,
        if run.calibrated { ", calibrated" } else { "" }
    );
    if run.opportunities.is_empty() {
        println!("No value opportunities.");
        return;
    }
    println!("Top value opportunities:");
    for opp in run.opportunities.iter().take(TOP_OPPORTUNITIES) {
        println!(
            "  {:<20} {:<4} {:<28} vs {:<28} {:>6} EV {:>6.2}% Kelly {:.3}",
            opp.bookmaker,
            opp.side.label(),
            opp.team,
            opp.opponent,
            opp.odds.map(|o| format!("{o:+}")).unwrap_or_else(|| "-".to_string()),
            opp.ev_percent.unwrap_or(0.0),
            opp.kelly_fraction
        );
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1}%"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn load_payload(path: &Path) -> Result<OddsPayload> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read odds payload {}", path.display()))?;
    OddsPayload::from_json(&raw)
}

fn load_injury_flags(path: &Path) -> Result<HashMap<String, bool>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read injury flags {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse injury flags {}", path.display()))
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

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    parse_string_arg(name).map(PathBuf::from)
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    parse_string_arg(name).and_then(|v| v.parse::<u64>().ok())
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
