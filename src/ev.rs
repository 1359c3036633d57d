use crate::odds::Side;

pub const DEFAULT_FRACTION_CAP: f64 = 0.25;
/// Price assumed for sizing when the market quote is missing.
pub const DEFAULT_MARKET_ODDS: i32 = -110;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvOpportunity {
    pub side: Side,
    pub ev_percent: Option<f64>,
    pub kelly_fraction: f64,
}

pub fn ev_percent(simulated_rate: f64, market_implied_prob: Option<f64>) -> Option<f64> {
    let market = market_implied_prob.filter(|p| p.is_finite())?;
    if !simulated_rate.is_finite() {
        return None;
    }
    Some((simulated_rate - market) * 100.0)
}

/// Bounded "Kelly-lite" stake. Any irregularity (zero payout, non-finite
/// inputs) sizes to nothing.
pub fn kelly_fraction(edge_percent: f64, american_odds: f64, fraction_cap: f64) -> f64 {
    if !fraction_cap.is_finite() || fraction_cap <= 0.0 {
        return 0.0;
    }
    let b = if american_odds < 0.0 {
        american_odds.abs() / 100.0
    } else {
        american_odds / 100.0
    };
    if !b.is_finite() || b <= 0.0 {
        return 0.0;
    }
    let q = 1.0 - 1.0 / (b + 1.0);
    let kelly = (b * (edge_percent / 100.0) - q) / b;
    if !kelly.is_finite() {
        return 0.0;
    }
    kelly.clamp(0.0, fraction_cap)
}

pub fn assess(
    side: Side,
    simulated_rate: f64,
    market_implied_prob: Option<f64>,
    market_odds: Option<i32>,
    fraction_cap: f64,
) -> EvOpportunity {
    let ev = ev_percent(simulated_rate, market_implied_prob);
    let odds = market_odds.unwrap_or(DEFAULT_MARKET_ODDS) as f64;
    EvOpportunity {
        side,
        ev_percent: ev,
        kelly_fraction: ev.map_or(0.0, |edge| kelly_fraction(edge, odds, fraction_cap)),
    }
}
