use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CALIBRATION_FILE: &str = "calibrated_params.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    #[serde(default = "identity_mult")]
    pub home_bias_mult: f64,
    #[serde(default = "identity_mult")]
    pub away_bias_mult: f64,
    #[serde(default = "identity_mult")]
    pub favorite_bias_mult: f64,
}

fn identity_mult() -> f64 {
    1.0
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self::identity()
    }
}

impl CalibrationParameters {
    pub fn identity() -> Self {
        Self {
            home_bias_mult: 1.0,
            away_bias_mult: 1.0,
            favorite_bias_mult: 1.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("home_bias_mult", self.home_bias_mult),
            ("away_bias_mult", self.away_bias_mult),
            ("favorite_bias_mult", self.favorite_bias_mult),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(anyhow!("{name} must be a positive finite number, got {value}"));
            }
        }
        Ok(())
    }
}

pub trait CalibrationStore: Send + Sync {
    fn load(&self) -> Option<CalibrationParameters>;
    fn save(&self, params: &CalibrationParameters) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileCalibrationStore {
    path: PathBuf,
}

impl FileCalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalibrationStore for FileCalibrationStore {
    fn load(&self) -> Option<CalibrationParameters> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no calibration file, using identity");
                return None;
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "calibration file unreadable");
                return None;
            }
        };
        let params = match serde_json::from_str::<CalibrationParameters>(&raw) {
            Ok(params) => params,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "calibration file malformed");
                return None;
            }
        };
        if let Err(err) = params.validate() {
            warn!(path = %self.path.display(), error = %err, "calibration file rejected");
            return None;
        }
        info!(
            path = %self.path.display(),
            home = params.home_bias_mult,
            away = params.away_bias_mult,
            favorite = params.favorite_bias_mult,
            "loaded calibration"
        );
        Some(params)
    }

    fn save(&self, params: &CalibrationParameters) -> Result<()> {
        params.validate()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create calibration dir {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(params).context("serialize calibration")?;
        fs::write(&tmp, json).context("write calibration")?;
        fs::rename(&tmp, &self.path).context("swap calibration")?;
        info!(path = %self.path.display(), "saved calibration");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCalibrationStore {
    params: Mutex<Option<CalibrationParameters>>,
}

impl MemoryCalibrationStore {
    pub fn new(params: Option<CalibrationParameters>) -> Self {
        Self {
            params: Mutex::new(params),
        }
    }
}

impl CalibrationStore for MemoryCalibrationStore {
    fn load(&self) -> Option<CalibrationParameters> {
        self.params.lock().ok().and_then(|guard| *guard)
    }

    fn save(&self, params: &CalibrationParameters) -> Result<()> {
        params.validate()?;
        let mut guard = self
            .params
            .lock()
            .map_err(|_| anyhow!("calibration store lock poisoned"))?;
        *guard = Some(*params);
        Ok(())
    }
}

pub fn apply_calibration(
    home_fair: f64,
    away_fair: f64,
    params: Option<&CalibrationParameters>,
) -> (f64, f64) {
    let Some(params) = params else {
        return (home_fair, away_fair);
    };

    let mut hp = home_fair * params.home_bias_mult;
    let mut ap = away_fair * params.away_bias_mult;

    if hp > ap {
        hp *= params.favorite_bias_mult;
    } else if ap > hp {
        ap *= params.favorite_bias_mult;
    }

    let total = hp + ap;
    if !total.is_finite() || total <= 0.0 {
        return (0.5, 0.5);
    }
    (hp / total, ap / total)
}
