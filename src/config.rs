use std::env;
use std::path::PathBuf;

use crate::calibrator::DEFAULT_CALIBRATION_FILE;
use crate::simulator::DEFAULT_SIMS;

const DEFAULT_MAX_SIMS: u32 = 200_000;
const DEFAULT_SIM_CONFIDENCE: f64 = 0.8;
const DEFAULT_KELLY_CAP: f64 = 0.25;
const DEFAULT_MAX_MATCHUPS: usize = 512;
const DEFAULT_RESULTS_FILE: &str = "final_scores.csv";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub calibration_path: PathBuf,
    pub output_dir: PathBuf,
    pub results_path: PathBuf,
    pub n_sims: u32,
    pub max_sims: u32,
    pub sim_confidence: f64,
    pub kelly_cap: f64,
    pub seed: Option<u64>,
    pub max_matchups: usize,
    pub write_xlsx: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            calibration_path: PathBuf::from(DEFAULT_CALIBRATION_FILE),
            output_dir: PathBuf::from("."),
            results_path: PathBuf::from(DEFAULT_RESULTS_FILE),
            n_sims: DEFAULT_SIMS,
            max_sims: DEFAULT_MAX_SIMS,
            sim_confidence: DEFAULT_SIM_CONFIDENCE,
            kelly_cap: DEFAULT_KELLY_CAP,
            seed: None,
            max_matchups: DEFAULT_MAX_MATCHUPS,
            write_xlsx: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let max_sims = env_parse::<u32>("EV_MAX_SIMS")
            .unwrap_or(d.max_sims)
            .clamp(1, 5_000_000);
        let n_sims = env_parse::<u32>("EV_N_SIMS")
            .unwrap_or(d.n_sims)
            .clamp(1, max_sims);

        Self {
            calibration_path: env_path("EV_CALIBRATION_PATH").unwrap_or(d.calibration_path),
            output_dir: env_path("EV_OUTPUT_DIR").unwrap_or(d.output_dir),
            results_path: env_path("EV_RESULTS_PATH").unwrap_or(d.results_path),
            n_sims,
            max_sims,
            sim_confidence: env_parse::<f64>("EV_SIM_CONFIDENCE")
                .filter(|v| v.is_finite())
                .unwrap_or(d.sim_confidence)
                .clamp(0.0, 1.0),
            kelly_cap: env_parse::<f64>("EV_KELLY_CAP")
                .filter(|v| v.is_finite())
                .unwrap_or(d.kelly_cap)
                .clamp(0.0, 1.0),
            seed: env_parse::<u64>("EV_SEED"),
            max_matchups: env_parse::<usize>("EV_MAX_MATCHUPS")
                .unwrap_or(d.max_matchups)
                .clamp(1, 10_000),
            write_xlsx: env_bool("EV_WRITE_XLSX", d.write_xlsx),
        }
    }

    /// Re-applies the sims cap after a CLI override.
    pub fn with_sims(mut self, n_sims: u32) -> Self {
        self.n_sims = n_sims.clamp(1, self.max_sims);
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}
