use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::pipeline::{PipelineRun, SimulationRow, ValueOpportunity};

pub const SIM_OUTPUT_FILE: &str = "sim_output_full.csv";
pub const OPPORTUNITIES_FILE: &str = "value_opportunities.csv";
pub const WORKBOOK_FILE: &str = "ev_report.xlsx";

const SIM_HEADER: [&str; 23] = [
    "bookmaker",
    "matchup_id",
    "home_team",
    "away_team",
    "home_ml",
    "away_ml",
    "home_ml_prob",
    "away_ml_prob",
    "home_prob_model",
    "home_fair_odds",
    "home_model_edge_%",
    "home_win_sim",
    "home_EV_%",
    "home_Kelly_frac",
    "away_prob_model",
    "away_fair_odds",
    "away_model_edge_%",
    "away_win_sim",
    "away_EV_%",
    "away_Kelly_frac",
    "std_error",
    "snapshot_type",
    "generated_at",
];

const OPPORTUNITY_HEADER: [&str; 8] = [
    "bookmaker",
    "matchup_id",
    "team_side",
    "team",
    "opponent",
    "odds",
    "EV_%",
    "Kelly_frac",
];

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub simulations: usize,
    pub opportunities: usize,
    pub files: Vec<PathBuf>,
}

/// Writes the simulation table, the ranked value table and, optionally, an
/// xlsx workbook holding both.
pub fn export_run(run: &PipelineRun, out_dir: &Path, xlsx: bool) -> Result<ExportReport> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("create output dir {}", out_dir.display()))?;

    let sim_rows = simulation_table(&run.rows);
    let opp_rows = opportunity_table(&run.opportunities);

    let mut files = Vec::new();
    let sim_path = out_dir.join(SIM_OUTPUT_FILE);
    write_csv(&sim_path, &sim_rows)?;
    files.push(sim_path);

    let opp_path = out_dir.join(OPPORTUNITIES_FILE);
    write_csv(&opp_path, &opp_rows)?;
    files.push(opp_path);

    if xlsx {
        let book_path = out_dir.join(WORKBOOK_FILE);
        write_workbook(&book_path, &sim_rows, &opp_rows)?;
        files.push(book_path);
    }

    Ok(ExportReport {
        simulations: run.rows.len(),
        opportunities: run.opportunities.len(),
        files,
    })
}

pub fn write_simulation_csv(path: &Path, rows: &[SimulationRow]) -> Result<()> {
    write_csv(path, &simulation_table(rows))
}

pub fn simulation_table(rows: &[SimulationRow]) -> Vec<Vec<String>> {
    let mut out = vec![SIM_HEADER.iter().map(|h| h.to_string()).collect()];
    out.extend(rows.iter().map(simulation_row));
    out
}

fn simulation_row(r: &SimulationRow) -> Vec<String> {
    vec![
        r.bookmaker.clone(),
        r.matchup_id.clone(),
        r.home_team.clone(),
        r.away_team.clone(),
        opt_to_string(r.home_ml),
        opt_to_string(r.away_ml),
        format!("{:.4}", r.home_ml_prob),
        format!("{:.4}", r.away_ml_prob),
        format!("{:.4}", r.home_prob_model),
        opt_fixed(r.home_fair_odds, 0),
        format!("{:.2}", r.model_edge_home_pct),
        format!("{:.4}", r.home_win_sim),
        opt_fixed(r.home_ev_pct, 2),
        format!("{:.3}", r.home_kelly),
        format!("{:.4}", r.away_prob_model),
        opt_fixed(r.away_fair_odds, 0),
        format!("{:.2}", r.model_edge_away_pct),
        format!("{:.4}", r.away_win_sim),
        opt_fixed(r.away_ev_pct, 2),
        format!("{:.3}", r.away_kelly),
        format!("{:.5}", r.std_error),
        r.snapshot.to_string(),
        r.generated_at.clone(),
    ]
}

pub fn opportunity_table(opps: &[ValueOpportunity]) -> Vec<Vec<String>> {
    let mut out = vec![OPPORTUNITY_HEADER.iter().map(|h| h.to_string()).collect()];
    out.extend(opps.iter().map(|o| {
        vec![
            o.bookmaker.clone(),
            o.matchup_id.clone(),
            o.side.label().to_string(),
            o.team.clone(),
            o.opponent.clone(),
            opt_to_string(o.odds),
            opt_fixed(o.ev_percent, 2),
            format!("{:.3}", o.kelly_fraction),
        ]
    }));
    out
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_fixed(value: Option<f64>, decimals: usize) -> String {
    value
        .filter(|v| v.is_finite())
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_default()
}

pub fn csv_line<'a>(cells: impl IntoIterator<Item = &'a str>) -> String {
    let mut line = cells
        .into_iter()
        .map(|c| {
            if c.contains([',', '"', '\n', '\r']) {
                format!("\"{}\"", c.replace('"', "\"\""))
            } else {
                c.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

fn write_csv(path: &Path, rows: &[Vec<String>]) -> Result<()> {
    let body: String = rows
        .iter()
        .map(|row| csv_line(row.iter().map(String::as_str)))
        .collect();
    write_atomic(path, body.as_bytes())
}

pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, contents).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

fn write_workbook(path: &Path, sims: &[Vec<String>], opps: &[Vec<String>]) -> Result<()> {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Simulations")?;
        write_rows(sheet, sims)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("ValueOpportunities")?;
        write_rows(sheet, opps)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    workbook
        .save(&tmp)
        .with_context(|| format!("save workbook {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            let (r, c) = (row_idx as u32, col_idx as u16);
            let written = match value.parse::<f64>() {
                Ok(num) if row_idx > 0 && num.is_finite() => worksheet.write_number(r, c, num),
                _ => worksheet.write_string(r, c, value),
            };
            written.with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
