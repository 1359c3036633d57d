use std::collections::HashMap;

use crate::haircut::{HaircutParams, haircut};
use crate::odds::BookLine;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchupProbabilitySet {
    pub home_fair: f64,
    pub away_fair: f64,
}

#[derive(Debug, Clone)]
pub struct ModelLine {
    pub line: BookLine,
    pub home_implied: f64,
    pub away_implied: f64,
    pub home_adj: f64,
    pub away_adj: f64,
    pub fair: MatchupProbabilitySet,
    pub home_fair_odds: Option<f64>,
    pub away_fair_odds: Option<f64>,
    pub model_edge_home_pct: f64,
    pub model_edge_away_pct: f64,
}

/// Re-normalizes two adjusted probabilities. No fabricated default: a
/// missing side or a non-positive sum means there is no fair set.
pub fn build_fair(home_adj: Option<f64>, away_adj: Option<f64>) -> Option<MatchupProbabilitySet> {
    let (h, a) = (home_adj?, away_adj?);
    if !h.is_finite() || !a.is_finite() || h < 0.0 || a < 0.0 {
        return None;
    }
    let sum = h + a;
    if sum <= 0.0 {
        return None;
    }
    Some(MatchupProbabilitySet {
        home_fair: h / sum,
        away_fair: a / sum,
    })
}

pub fn fair_american_odds(prob: f64) -> Option<f64> {
    if !prob.is_finite() || prob <= 0.0 || prob >= 1.0 {
        return None;
    }
    if prob >= 0.5 {
        Some(-100.0 * prob / (1.0 - prob))
    } else {
        Some(100.0 * (1.0 - prob) / prob)
    }
}

pub fn build_model_lines(
    lines: &[BookLine],
    injury_flags: &HashMap<String, bool>,
    confidence: f64,
) -> Vec<ModelLine> {
    lines
        .iter()
        .filter_map(|line| {
            let flag = |team: &str| injury_flags.get(team).copied().unwrap_or(false);
            let home_params =
                HaircutParams::new(line.snapshot.clone(), flag(&line.home.team), confidence);
            let away_params =
                HaircutParams::new(line.snapshot.clone(), flag(&line.away.team), confidence);

            let home_adj = haircut(line.home.implied, &home_params);
            let away_adj = haircut(line.away.implied, &away_params);
            let fair = build_fair(home_adj, away_adj)?;

            // Both implied values exist whenever the fair set does.
            let home_implied = line.home.implied?;
            let away_implied = line.away.implied?;

            Some(ModelLine {
                line: line.clone(),
                home_implied,
                away_implied,
                home_adj: home_adj?,
                away_adj: away_adj?,
                fair,
                home_fair_odds: fair_american_odds(fair.home_fair),
                away_fair_odds: fair_american_odds(fair.away_fair),
                model_edge_home_pct: (home_implied - fair.home_fair) * 100.0,
                model_edge_away_pct: (away_implied - fair.away_fair) * 100.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fair_probabilities_sum_to_one() {
        for (h, a) in [(0.6, 0.435), (0.01, 0.97), (0.5, 0.5), (0.3, 0.0)] {
            let set = build_fair(Some(h), Some(a)).unwrap();
            assert!((set.home_fair + set.away_fair - 1.0).abs() < 1e-9);
            assert!(set.home_fair >= 0.0 && set.away_fair >= 0.0);
        }
    }

    #[test]
    fn missing_or_degenerate_inputs_are_skipped() {
        assert!(build_fair(None, Some(0.4)).is_none());
        assert!(build_fair(Some(0.4), None).is_none());
        assert!(build_fair(Some(0.0), Some(0.0)).is_none());
        assert!(build_fair(Some(f64::NAN), Some(0.4)).is_none());
    }

    #[test]
    fn fair_odds_inverse() {
        assert!((fair_american_odds(0.6).unwrap() + 150.0).abs() < 1e-9);
        assert!((fair_american_odds(0.4).unwrap() - 150.0).abs() < 1e-9);
        assert!((fair_american_odds(0.5).unwrap() + 100.0).abs() < 1e-9);
        assert!(fair_american_odds(0.0).is_none());
        assert!(fair_american_odds(1.0).is_none());
    }
}
