use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::calibrator::{CalibrationParameters, CalibrationStore, apply_calibration};
use crate::config::EngineConfig;
use crate::ev::{self, DEFAULT_FRACTION_CAP};
use crate::fair::{ModelLine, build_model_lines};
use crate::haircut::SnapshotKind;
use crate::odds::{BookLine, OddsPayload, Side, flatten_odds};
use crate::simulator::{DEFAULT_SIMS, MonteCarloSimulator, SimulationResult};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sim_confidence: f64,
    pub n_sims: u32,
    pub max_sims: u32,
    pub fraction_cap: f64,
    pub seed: Option<u64>,
    pub max_matchups: usize,
    pub injury_flags: HashMap<String, bool>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sim_confidence: 0.8,
            n_sims: DEFAULT_SIMS,
            max_sims: 200_000,
            fraction_cap: DEFAULT_FRACTION_CAP,
            seed: None,
            max_matchups: 512,
            injury_flags: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_engine(cfg: &EngineConfig) -> Self {
        Self {
            sim_confidence: cfg.sim_confidence,
            n_sims: cfg.n_sims,
            max_sims: cfg.max_sims,
            fraction_cap: cfg.kelly_cap,
            seed: cfg.seed,
            max_matchups: cfg.max_matchups,
            injury_flags: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRow {
    pub bookmaker: String,
    pub matchup_id: String,
    pub home_team: String,
    pub away_team: String,
    pub home_ml: Option<i32>,
    pub away_ml: Option<i32>,
    pub home_ml_prob: f64,
    pub away_ml_prob: f64,
    pub home_prob_model: f64,
    pub away_prob_model: f64,
    pub home_fair_odds: Option<f64>,
    pub away_fair_odds: Option<f64>,
    pub model_edge_home_pct: f64,
    pub model_edge_away_pct: f64,
    pub home_win_sim: f64,
    pub away_win_sim: f64,
    pub home_ev_pct: Option<f64>,
    pub away_ev_pct: Option<f64>,
    pub home_kelly: f64,
    pub away_kelly: f64,
    pub std_error: f64,
    pub snapshot: SnapshotKind,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueOpportunity {
    pub bookmaker: String,
    pub matchup_id: String,
    pub side: Side,
    pub team: String,
    pub opponent: String,
    pub odds: Option<i32>,
    pub ev_percent: Option<f64>,
    pub kelly_fraction: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub rows: Vec<SimulationRow>,
    pub opportunities: Vec<ValueOpportunity>,
    pub lines_in: usize,
    pub lines_skipped: usize,
    pub calibrated: bool,
    pub seed: u64,
    pub n_sims: u32,
}

/// Loads calibration once from `store`, then runs the whole chain.
pub fn run_pipeline(
    payload: &OddsPayload,
    store: &dyn CalibrationStore,
    cfg: &PipelineConfig,
) -> PipelineRun {
    let calibration = store.load();
    run_with_calibration(payload, calibration.as_ref(), cfg)
}

pub fn run_with_calibration(
    payload: &OddsPayload,
    calibration: Option<&CalibrationParameters>,
    cfg: &PipelineConfig,
) -> PipelineRun {
    let lines = limit_matchups(flatten_odds(payload), cfg.max_matchups);
    let lines_in = lines.len();
    if lines_in == 0 {
        warn!(error = payload.error.as_deref().unwrap_or(""), "odds payload has no lines");
    }

    let model_lines = build_model_lines(&lines, &cfg.injury_flags, cfg.sim_confidence);
    let lines_skipped = lines_in - model_lines.len();
    if lines_skipped > 0 {
        debug!(skipped = lines_skipped, "lines without a fair probability set");
    }

    let adjusted: Vec<(f64, f64)> = model_lines
        .iter()
        .map(|m| apply_calibration(m.fair.home_fair, m.fair.away_fair, calibration))
        .collect();

    let simulator = MonteCarloSimulator::new(cfg.n_sims, cfg.max_sims, cfg.seed);
    let sims = simulator.run_all(&adjusted);
    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut rows = Vec::with_capacity(model_lines.len());
    for ((model, (home_prob, away_prob)), sim) in model_lines.iter().zip(&adjusted).zip(sims) {
        let Some(sim) = sim else {
            debug!(matchup = %model.line.matchup_id, "simulation produced no result");
            continue;
        };
        rows.push(simulation_row(
            model,
            *home_prob,
            *away_prob,
            sim,
            cfg.fraction_cap,
            &generated_at,
        ));
    }

    let opportunities = rank_opportunities(value_opportunities(&rows));
    info!(
        lines = lines_in,
        simulated = rows.len(),
        skipped = lines_skipped,
        calibrated = calibration.is_some(),
        n_sims = simulator.n_sims(),
        seed = simulator.seed(),
        "pipeline run complete"
    );

    PipelineRun {
        rows,
        opportunities,
        lines_in,
        lines_skipped,
        calibrated: calibration.is_some(),
        seed: simulator.seed(),
        n_sims: simulator.n_sims(),
    }
}

fn simulation_row(
    model: &ModelLine,
    home_prob: f64,
    away_prob: f64,
    sim: SimulationResult,
    fraction_cap: f64,
    generated_at: &str,
) -> SimulationRow {
    let line: &BookLine = &model.line;
    let home = ev::assess(
        Side::Home,
        sim.home_win_rate,
        Some(model.home_implied),
        line.home.price,
        fraction_cap,
    );
    let away = ev::assess(
        Side::Away,
        sim.away_win_rate,
        Some(model.away_implied),
        line.away.price,
        fraction_cap,
    );

    SimulationRow {
        bookmaker: line.bookmaker.clone(),
        matchup_id: line.matchup_id.clone(),
        home_team: line.home.team.clone(),
        away_team: line.away.team.clone(),
        home_ml: line.home.price,
        away_ml: line.away.price,
        home_ml_prob: model.home_implied,
        away_ml_prob: model.away_implied,
        home_prob_model: home_prob,
        away_prob_model: away_prob,
        home_fair_odds: model.home_fair_odds,
        away_fair_odds: model.away_fair_odds,
        model_edge_home_pct: model.model_edge_home_pct,
        model_edge_away_pct: model.model_edge_away_pct,
        home_win_sim: sim.home_win_rate,
        away_win_sim: sim.away_win_rate,
        home_ev_pct: home.ev_percent,
        away_ev_pct: away.ev_percent,
        home_kelly: home.kelly_fraction,
        away_kelly: away.kelly_fraction,
        std_error: sim.standard_error,
        snapshot: line.snapshot.clone(),
        generated_at: generated_at.to_string(),
    }
}

pub fn value_opportunities(rows: &[SimulationRow]) -> Vec<ValueOpportunity> {
    let mut out = Vec::with_capacity(rows.len() * 2);
    for r in rows {
        out.push(ValueOpportunity {
            bookmaker: r.bookmaker.clone(),
            matchup_id: r.matchup_id.clone(),
            side: Side::Home,
            team: r.home_team.clone(),
            opponent: r.away_team.clone(),
            odds: r.home_ml,
            ev_percent: r.home_ev_pct,
            kelly_fraction: r.home_kelly,
        });
        out.push(ValueOpportunity {
            bookmaker: r.bookmaker.clone(),
            matchup_id: r.matchup_id.clone(),
            side: Side::Away,
            team: r.away_team.clone(),
            opponent: r.home_team.clone(),
            odds: r.away_ml,
            ev_percent: r.away_ev_pct,
            kelly_fraction: r.away_kelly,
        });
    }
    out
}

/// Drops rows without a defined EV and sorts by EV descending.
pub fn rank_opportunities(opps: Vec<ValueOpportunity>) -> Vec<ValueOpportunity> {
    let mut ranked: Vec<ValueOpportunity> = opps
        .into_iter()
        .filter(|o| o.ev_percent.is_some_and(f64::is_finite))
        .collect();
    ranked.sort_by(|a, b| {
        let (ea, eb) = (a.ev_percent.unwrap_or(0.0), b.ev_percent.unwrap_or(0.0));
        eb.partial_cmp(&ea).unwrap_or(Ordering::Equal)
    });
    ranked
}

fn limit_matchups(lines: Vec<BookLine>, max_matchups: usize) -> Vec<BookLine> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut dropped = 0usize;
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        if !seen.contains(&line.matchup_id) {
            if seen.len() >= max_matchups {
                dropped += 1;
                continue;
            }
            seen.insert(line.matchup_id.clone());
        }
        out.push(line);
    }
    if dropped > 0 {
        warn!(max_matchups, dropped, "matchup cap reached, extra lines dropped");
    }
    out
}
