use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

use crate::export::{csv_line, write_atomic};
use crate::pipeline::SimulationRow;

pub const CALIBRATION_LOG_FILE: &str = "calibration_log.csv";
pub const CALIBRATION_SUMMARY_FILE: &str = "calibration_summary.csv";

const LOG_HEADER: [&str; 12] = [
    "batch",
    "evaluated_at",
    "week",
    "matchup_id",
    "bookmaker",
    "home_team",
    "away_team",
    "home_win_sim",
    "away_win_sim",
    "predicted_winner",
    "actual_winner",
    "correct",
];
const SUMMARY_HEADER: [&str; 5] = ["batch", "evaluated_at", "games", "correct", "accuracy_pct"];

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub week: Option<u32>,
    pub home_team: String,
    pub away_team: String,
    pub winner: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRecord {
    pub matchup_id: String,
    pub bookmaker: String,
    pub week: Option<u32>,
    pub home_team: String,
    pub away_team: String,
    pub home_win_sim: f64,
    pub away_win_sim: f64,
    pub predicted_winner: String,
    pub actual_winner: String,
}

impl CalibrationRecord {
    pub fn correct(&self) -> bool {
        normalize_team(&self.predicted_winner) == normalize_team(&self.actual_winner)
    }

    pub fn picked_home(&self) -> bool {
        self.home_win_sim > self.away_win_sim
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationBatch {
    pub label: String,
    pub evaluated_at: String,
    pub records: Vec<CalibrationRecord>,
}

/// Figures a human looks at before deciding new bias multipliers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSummary {
    pub games: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub home_picks: usize,
    pub home_pick_accuracy: Option<f64>,
    pub away_picks: usize,
    pub away_pick_accuracy: Option<f64>,
    pub mean_pick_rate: f64,
}

impl CalibrationBatch {
    pub fn correct_count(&self) -> usize {
        self.records.iter().filter(|r| r.correct()).count()
    }

    pub fn accuracy(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.correct_count() as f64 / self.records.len() as f64 * 100.0
    }

    pub fn summary(&self) -> BatchSummary {
        let (home, away): (Vec<&CalibrationRecord>, Vec<&CalibrationRecord>) =
            self.records.iter().partition(|r| r.picked_home());
        let pct = |rows: &[&CalibrationRecord]| {
            if rows.is_empty() {
                None
            } else {
                let hits = rows.iter().filter(|r| r.correct()).count();
                Some(hits as f64 / rows.len() as f64 * 100.0)
            }
        };
        let mean_pick_rate = if self.records.is_empty() {
            0.0
        } else {
            self.records
                .iter()
                .map(|r| r.home_win_sim.max(r.away_win_sim))
                .sum::<f64>()
                / self.records.len() as f64
        };

        BatchSummary {
            games: self.records.len(),
            correct: self.correct_count(),
            accuracy: self.accuracy(),
            home_picks: home.len(),
            home_pick_accuracy: pct(&home),
            away_picks: away.len(),
            away_pick_accuracy: pct(&away),
            mean_pick_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoResultsFile,
    UnreadableResults,
    NoOverlap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerOutcome {
    Skipped(SkipReason),
    Scored(CalibrationBatch),
}

pub fn normalize_team(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Joins simulations to results on normalized (home, away). Unmatched rows
/// drop out; `None` when nothing overlaps.
pub fn calibrate(
    sims: &[SimulationRow],
    results: &[ResultRow],
    label: &str,
) -> Option<CalibrationBatch> {
    let mut by_pair: HashMap<(String, String), Vec<&ResultRow>> = HashMap::new();
    for r in results {
        by_pair
            .entry((normalize_team(&r.home_team), normalize_team(&r.away_team)))
            .or_default()
            .push(r);
    }

    let mut records = Vec::new();
    for sim in sims {
        let key = (normalize_team(&sim.home_team), normalize_team(&sim.away_team));
        let Some(matches) = by_pair.get(&key) else {
            continue;
        };
        let predicted = if sim.home_win_sim > sim.away_win_sim {
            &sim.home_team
        } else {
            &sim.away_team
        };
        for result in matches {
            records.push(CalibrationRecord {
                matchup_id: sim.matchup_id.clone(),
                bookmaker: sim.bookmaker.clone(),
                week: result.week,
                home_team: sim.home_team.clone(),
                away_team: sim.away_team.clone(),
                home_win_sim: sim.home_win_sim,
                away_win_sim: sim.away_win_sim,
                predicted_winner: predicted.clone(),
                actual_winner: result.winner.clone(),
            });
        }
    }

    if records.is_empty() {
        return None;
    }
    Some(CalibrationBatch {
        label: label.to_string(),
        evaluated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        records,
    })
}

pub fn load_results(path: &Path) -> Result<Option<Vec<ResultRow>>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("read results {}", path.display()));
        }
    };
    parse_results_csv(&raw).map(Some)
}

pub fn parse_results_csv(raw: &str) -> Result<Vec<ResultRow>> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or_else(|| anyhow!("results file is empty"))?;
    let columns: Vec<String> = split_csv_line(header)
        .into_iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .collect();
    let col = |name: &str| {
        columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| anyhow!("results file missing column {name}"))
    };
    let home_idx = col("home_team")?;
    let away_idx = col("away_team")?;
    let winner_idx = col("winner")?;
    let week_idx = col("week").ok();

    let mut out = Vec::new();
    for line in lines {
        let cells = split_csv_line(line);
        let cell = |idx: usize| cells.get(idx).map(|c| c.trim()).filter(|c| !c.is_empty());
        let (Some(home), Some(away), Some(winner)) =
            (cell(home_idx), cell(away_idx), cell(winner_idx))
        else {
            continue;
        };
        let week = match week_idx.and_then(cell) {
            Some(raw_week) => {
                let parsed = parse_week(raw_week);
                if parsed.is_none() {
                    warn!(
                        week = raw_week,
                        home,
                        away,
                        "unparsable week, row applies to every week"
                    );
                }
                parsed
            }
            None => None,
        };
        out.push(ResultRow {
            week,
            home_team: home.to_string(),
            away_team: away.to_string(),
            winner: winner.to_string(),
        });
    }
    Ok(out)
}

fn parse_week(raw: &str) -> Option<u32> {
    if let Ok(w) = raw.parse::<u32>() {
        return Some(w);
    }
    let w = raw.parse::<f64>().ok()?;
    if !w.is_finite() || w.fract() != 0.0 || w < 0.0 || w > u32::MAX as f64 {
        return None;
    }
    Some(w as u32)
}

/// Week selections such as `1,2,5` or `1-4`; zero and repeats are dropped.
pub fn parse_week_list(raw: &str) -> Vec<u32> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for part in raw.split([',', ';', ' ']).map(str::trim).filter(|p| !p.is_empty()) {
        let range = match part.split_once('-') {
            Some((lo, hi)) => {
                let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) else {
                    continue;
                };
                lo..=hi
            }
            None => {
                let Ok(w) = part.parse::<u32>() else {
                    continue;
                };
                w..=w
            }
        };
        for week in range.filter(|w| *w != 0) {
            if seen.insert(week) {
                out.push(week);
            }
        }
    }
    out
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => out.push(std::mem::take(&mut cur)),
            _ => cur.push(ch),
        }
    }
    out.push(cur);
    out
}

#[derive(Debug, Clone)]
pub struct CalibrationLog {
    dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub batch: String,
    pub evaluated_at: String,
    pub games: usize,
    pub correct: usize,
    pub accuracy: f64,
}

impl CalibrationLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(CALIBRATION_LOG_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(CALIBRATION_SUMMARY_FILE)
    }

    pub fn append(&self, batch: &CalibrationBatch) -> Result<()> {
        let rows: Vec<Vec<String>> = batch
            .records
            .iter()
            .map(|r| {
                vec![
                    batch.label.clone(),
                    batch.evaluated_at.clone(),
                    r.week.map(|w| w.to_string()).unwrap_or_default(),
                    r.matchup_id.clone(),
                    r.bookmaker.clone(),
                    r.home_team.clone(),
                    r.away_team.clone(),
                    format!("{:.4}", r.home_win_sim),
                    format!("{:.4}", r.away_win_sim),
                    r.predicted_winner.clone(),
                    r.actual_winner.clone(),
                    r.correct().to_string(),
                ]
            })
            .collect();
        let summary = vec![vec![
            batch.label.clone(),
            batch.evaluated_at.clone(),
            batch.records.len().to_string(),
            batch.correct_count().to_string(),
            format!("{:.2}", batch.accuracy()),
        ]];

        // Both bodies are built before either swap; the summary lands first so
        // a failed log swap can only orphan a summary row.
        let log_path = self.log_path();
        let summary_path = self.summary_path();
        let log_body = appended_body(&log_path, &LOG_HEADER, &rows)?;
        let summary_body = appended_body(&summary_path, &SUMMARY_HEADER, &summary)?;
        write_atomic(&summary_path, summary_body.as_bytes())?;
        write_atomic(&log_path, log_body.as_bytes())?;
        info!(
            batch = %batch.label,
            games = batch.records.len(),
            path = %log_path.display(),
            "calibration log updated"
        );
        Ok(())
    }

    pub fn load_summary(&self) -> Result<Vec<SummaryRow>> {
        let path = self.summary_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read summary {}", path.display()));
            }
        };
        let mut out = Vec::new();
        for line in raw.lines().skip(1).filter(|l| !l.trim().is_empty()) {
            let cells = split_csv_line(line);
            if cells.len() < SUMMARY_HEADER.len() {
                warn!(path = %path.display(), line, "skipping short summary row");
                continue;
            }
            let (Ok(games), Ok(correct), Some(accuracy)) = (
                cells[2].trim().parse::<usize>(),
                cells[3].trim().parse::<usize>(),
                cells[4].trim().parse::<f64>().ok().filter(|a| a.is_finite()),
            ) else {
                warn!(path = %path.display(), line, "skipping corrupt summary row");
                continue;
            };
            out.push(SummaryRow {
                batch: cells[0].clone(),
                evaluated_at: cells[1].clone(),
                games,
                correct,
                accuracy,
            });
        }
        Ok(out)
    }
}

fn appended_body(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<String> {
    let mut body = match fs::read_to_string(path) {
        Ok(existing) => existing,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    if body.trim().is_empty() {
        body = csv_line(header.iter().copied());
    } else if !body.ends_with('\n') {
        body.push('\n');
    }
    for row in rows {
        body.push_str(&csv_line(row.iter().map(String::as_str)));
    }
    Ok(body)
}

/// Scores a simulation table against the results file and, on success only,
/// appends to the rolling log. Never touches calibration parameters.
#[derive(Debug, Clone)]
pub struct CalibrationTracker {
    results_path: PathBuf,
    log: CalibrationLog,
}

impl CalibrationTracker {
    pub fn new(results_path: impl Into<PathBuf>, log: CalibrationLog) -> Self {
        Self {
            results_path: results_path.into(),
            log,
        }
    }

    pub fn log(&self) -> &CalibrationLog {
        &self.log
    }

    pub fn run(
        &self,
        sims: &[SimulationRow],
        week: Option<u32>,
        label: &str,
    ) -> Result<TrackerOutcome> {
        let results = match load_results(&self.results_path) {
            Ok(Some(results)) => results,
            Ok(None) => {
                warn!(
                    path = %self.results_path.display(),
                    "no results file, skipping calibration"
                );
                return Ok(TrackerOutcome::Skipped(SkipReason::NoResultsFile));
            }
            Err(err) => {
                warn!(path = %self.results_path.display(), error = %err, "results file unreadable");
                return Ok(TrackerOutcome::Skipped(SkipReason::UnreadableResults));
            }
        };
        let results: Vec<ResultRow> = match week {
            Some(w) => results
                .into_iter()
                .filter(|r| r.week.is_none_or(|rw| rw == w))
                .collect(),
            None => results,
        };

        let Some(batch) = calibrate(sims, &results, label) else {
            warn!(
                sims = sims.len(),
                results = results.len(),
                "no overlapping matchups after normalization"
            );
            return Ok(TrackerOutcome::Skipped(SkipReason::NoOverlap));
        };

        self.log.append(&batch)?;
        info!(
            batch = %batch.label,
            games = batch.records.len(),
            accuracy = batch.accuracy(),
            "calibration batch scored"
        );
        Ok(TrackerOutcome::Scored(batch))
    }
}
