use anyhow::{Result, anyhow};

use ev_engine::calibrator::{CalibrationParameters, CalibrationStore, FileCalibrationStore};
use ev_engine::config::EngineConfig;
use ev_engine::logging::init_tracing;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let cfg = EngineConfig::from_env();
    let store = FileCalibrationStore::new(&cfg.calibration_path);
    let command = std::env::args().nth(1).unwrap_or_else(|| "show".to_string());

    match command.as_str() {
        "show" => {
            let current = store.load();
            print_params(&store, current.as_ref());
        }
        "set" => {
            // Unspecified multipliers keep their persisted (or identity) value.
            let base = store.load().unwrap_or_default();
            let next = CalibrationParameters {
                home_bias_mult: parse_f64_arg("--home-bias").unwrap_or(base.home_bias_mult),
                away_bias_mult: parse_f64_arg("--away-bias").unwrap_or(base.away_bias_mult),
                favorite_bias_mult: parse_f64_arg("--favorite-bias")
                    .unwrap_or(base.favorite_bias_mult),
            };
            store.save(&next)?;
            print_params(&store, Some(&next));
        }
        "reset" => {
            store.save(&CalibrationParameters::identity())?;
            print_params(&store, Some(&CalibrationParameters::identity()));
        }
        other => {
            return Err(anyhow!(
                "unknown command {other}; expected show | set [--home-bias X] \
                 [--away-bias Y] [--favorite-bias Z] | reset"
            ));
        }
    }
    Ok(())
}

fn print_params(store: &FileCalibrationStore, params: Option<&CalibrationParameters>) {
    println!("Calibration file: {}", store.path().display());
    match params {
        Some(p) => {
            println!("  home_bias_mult:     {:.4}", p.home_bias_mult);
            println!("  away_bias_mult:     {:.4}", p.away_bias_mult);
            println!("  favorite_bias_mult: {:.4}", p.favorite_bias_mult);
        }
        None => println!("  (none persisted, identity calibration in effect)"),
    }
}

fn parse_f64_arg(name: &str) -> Option<f64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<f64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<f64>()
        {
            return Some(v);
        }
    }
    None
}
