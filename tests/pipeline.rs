use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use ev_engine::calibrator::{CalibrationParameters, MemoryCalibrationStore, apply_calibration};
use ev_engine::ev::{DEFAULT_FRACTION_CAP, ev_percent};
use ev_engine::export::{
    OPPORTUNITIES_FILE, SIM_OUTPUT_FILE, WORKBOOK_FILE, export_run, simulation_table,
};
use ev_engine::fair::{build_model_lines, fair_american_odds};
use ev_engine::odds::{OddsPayload, Side, american_to_prob, flatten_odds};
use ev_engine::pipeline::{PipelineConfig, run_pipeline, run_with_calibration};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn fixture_payload() -> OddsPayload {
    OddsPayload::from_json(&read_fixture("odds_payload.json")).expect("fixture should parse")
}

fn seeded_config() -> PipelineConfig {
    PipelineConfig {
        seed: Some(42),
        n_sims: 20_000,
        ..PipelineConfig::default()
    }
}

#[test]
fn implied_probabilities_keep_the_vig() {
    let home = american_to_prob(-150.0).unwrap();
    let away = american_to_prob(130.0).unwrap();
    assert!((home - 0.600).abs() < 1e-3);
    assert!((away - 0.435).abs() < 1e-3);
    assert!(home + away > 1.0);
}

#[test]
fn fixture_flattens_one_line_per_bookmaker() {
    let payload = fixture_payload();
    let lines = flatten_odds(&payload);
    assert_eq!(lines.len(), 5);

    let fd = lines.iter().find(|l| l.bookmaker == "fanduel").unwrap();
    assert_eq!(fd.home.price, Some(-340));
    assert_eq!(fd.away.price, Some(270));
    assert_eq!(fd.timestamp_utc, "2025-09-02T14:00:00Z");

    let caesars = lines.iter().find(|l| l.bookmaker == "caesars").unwrap();
    assert_eq!(caesars.matchup_id, "Chicago Bears@Green Bay Packers");
    assert_eq!(caesars.home.price, Some(-120));
    assert_eq!(caesars.away.price, None);
    assert_eq!(caesars.away.implied, None);
}

#[test]
fn fair_sets_sum_to_one_for_every_priced_line() {
    let lines = flatten_odds(&fixture_payload());
    let models = build_model_lines(&lines, &HashMap::new(), 0.8);
    assert_eq!(models.len(), 4);
    for m in &models {
        assert!((m.fair.home_fair + m.fair.away_fair - 1.0).abs() < 1e-9);
        assert!(m.fair.home_fair >= 0.0 && m.fair.away_fair >= 0.0);
    }
}

#[test]
fn injury_flag_only_touches_its_own_side() {
    let lines = flatten_odds(&fixture_payload());
    let clean = build_model_lines(&lines, &HashMap::new(), 0.5);
    let flags = HashMap::from([("Dallas Cowboys".to_string(), true)]);
    let hurt = build_model_lines(&lines, &flags, 0.5);

    let (c, h) = (&clean[0], &hurt[0]);
    assert_eq!(c.line.away.team, "Dallas Cowboys");
    assert_eq!(c.home_adj, h.home_adj);
    assert!(h.away_adj < c.away_adj);
    assert!(h.fair.home_fair > c.fair.home_fair);
}

#[test]
fn full_run_over_fixture() {
    let run = run_pipeline(
        &fixture_payload(),
        &MemoryCalibrationStore::default(),
        &seeded_config(),
    );
    assert_eq!(run.lines_in, 5);
    assert_eq!(run.lines_skipped, 1);
    assert_eq!(run.rows.len(), 4);
    assert_eq!(run.opportunities.len(), 8);
    assert!(!run.calibrated);

    for row in &run.rows {
        assert_eq!(row.away_win_sim, 1.0 - row.home_win_sim);
        assert!((row.home_prob_model + row.away_prob_model - 1.0).abs() < 1e-9);
        assert!((0.0..=DEFAULT_FRACTION_CAP).contains(&row.home_kelly));
        assert!((0.0..=DEFAULT_FRACTION_CAP).contains(&row.away_kelly));
        assert_eq!(row.snapshot.as_str(), "opening");
    }

    let evs: Vec<f64> = run.opportunities.iter().filter_map(|o| o.ev_percent).collect();
    assert!(evs.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn seeded_runs_reproduce() {
    let a = run_with_calibration(&fixture_payload(), None, &seeded_config());
    let b = run_with_calibration(&fixture_payload(), None, &seeded_config());
    let rates = |rows: &[ev_engine::pipeline::SimulationRow]| {
        rows.iter().map(|r| r.home_win_sim).collect::<Vec<_>>()
    };
    assert_eq!(rates(&a.rows), rates(&b.rows));
    assert_eq!(a.seed, 42);
}

#[test]
fn calibration_moves_model_probabilities() {
    let params = CalibrationParameters {
        home_bias_mult: 1.2,
        away_bias_mult: 1.0,
        favorite_bias_mult: 1.0,
    };
    let base = run_with_calibration(&fixture_payload(), None, &seeded_config());
    let tuned = run_with_calibration(&fixture_payload(), Some(&params), &seeded_config());
    assert!(tuned.calibrated);
    for (b, t) in base.rows.iter().zip(&tuned.rows) {
        assert!(t.home_prob_model > b.home_prob_model);
    }
}

#[test]
fn stored_calibration_is_loaded_for_the_run() {
    let params = CalibrationParameters {
        home_bias_mult: 1.15,
        away_bias_mult: 0.95,
        favorite_bias_mult: 1.05,
    };
    let store = MemoryCalibrationStore::new(Some(params));
    let tuned = run_pipeline(&fixture_payload(), &store, &seeded_config());
    let base = run_pipeline(
        &fixture_payload(),
        &MemoryCalibrationStore::default(),
        &seeded_config(),
    );

    assert!(tuned.calibrated);
    assert!(!base.calibrated);
    assert_eq!(tuned.rows.len(), base.rows.len());
    for (b, t) in base.rows.iter().zip(&tuned.rows) {
        let (h, a) = apply_calibration(b.home_prob_model, b.away_prob_model, Some(&params));
        assert!((t.home_prob_model - h).abs() < 1e-12);
        assert!((t.away_prob_model - a).abs() < 1e-12);
        assert!(t.home_prob_model > b.home_prob_model);
    }
}

#[test]
fn ev_matches_percentage_point_edge() {
    let ev = ev_percent(0.62, Some(0.55)).unwrap();
    assert!((ev - 7.0).abs() < 1e-9);

    let run = run_with_calibration(&fixture_payload(), None, &seeded_config());
    for row in &run.rows {
        let home = row.home_ev_pct.unwrap();
        assert!((home - (row.home_win_sim - row.home_ml_prob) * 100.0).abs() < 1e-9);
    }
    let sides: Vec<Side> = run.opportunities.iter().map(|o| o.side).collect();
    assert_eq!(sides.iter().filter(|s| **s == Side::Home).count(), 4);
}

#[test]
fn export_writes_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let run = run_with_calibration(&fixture_payload(), None, &seeded_config());
    let report = export_run(&run, dir.path(), true).unwrap();
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.simulations, 4);

    let sims = fs::read_to_string(dir.path().join(SIM_OUTPUT_FILE)).unwrap();
    let mut lines = sims.lines();
    assert!(lines.next().unwrap().starts_with("bookmaker,matchup_id,home_team"));
    assert_eq!(lines.count(), 4);

    let opps = fs::read_to_string(dir.path().join(OPPORTUNITIES_FILE)).unwrap();
    assert_eq!(opps.lines().count(), 9);
    assert!(dir.path().join(WORKBOOK_FILE).exists());
    assert!(!dir.path().join(format!("{SIM_OUTPUT_FILE}.tmp")).exists());
}

#[test]
fn fair_odds_and_model_edge_reach_the_table() {
    let payload = OddsPayload::from_json(
        r#"{"snapshot_type": "closing", "games": [{"id": "even-vig",
            "home_team": "Seattle Seahawks", "away_team": "Arizona Cardinals",
            "bookmakers": [{"bookmaker": "pinnacle", "markets": {"h2h": {
                "Seattle Seahawks": {"price": -150},
                "Arizona Cardinals": {"price": 150}}}}]}]}"#,
    )
    .unwrap();
    let run = run_with_calibration(&payload, None, &seeded_config());
    let row = &run.rows[0];
    assert!((row.home_prob_model - 0.6).abs() < 1e-9);
    assert!((row.home_fair_odds.unwrap() + 150.0).abs() < 1e-6);
    assert!((row.away_fair_odds.unwrap() - 150.0).abs() < 1e-6);
    // Vig-free prices: market and fair agree.
    assert!(row.model_edge_home_pct.abs() < 1e-9);

    let table = simulation_table(&run.rows);
    let col = |name: &str| table[0].iter().position(|h| h == name).unwrap();
    assert_eq!(table[1][col("home_fair_odds")], "-150");
    assert_eq!(table[1][col("away_fair_odds")], "150");
    let edge: f64 = table[1][col("home_model_edge_%")].parse().unwrap();
    assert!(edge.abs() < 0.01);
}

#[test]
fn model_edge_is_market_minus_fair() {
    let run = run_with_calibration(&fixture_payload(), None, &seeded_config());
    for row in &run.rows {
        let expected = (row.home_ml_prob - row.home_prob_model) * 100.0;
        assert!((row.model_edge_home_pct - expected).abs() < 1e-9);
        assert!(row.model_edge_home_pct > 0.0 || row.model_edge_away_pct > 0.0);
        assert_eq!(row.home_fair_odds, fair_american_odds(row.home_prob_model));
    }
}

#[test]
fn error_payload_yields_empty_run() {
    let payload = OddsPayload::from_json(r#"{"error": "quota exhausted"}"#).unwrap();
    let run = run_with_calibration(&payload, None, &seeded_config());
    assert_eq!(run.lines_in, 0);
    assert!(run.rows.is_empty());
    assert!(run.opportunities.is_empty());
}
