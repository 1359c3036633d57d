use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::haircut::SnapshotKind;

const MONEYLINE_MARKET: &str = "h2h";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Home => "Home",
            Side::Away => "Away",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OddsPayload {
    #[serde(default)]
    pub snapshot_type: Option<String>,
    #[serde(default)]
    pub timestamp_utc: Option<String>,
    #[serde(default)]
    pub games: Vec<Game>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Game {
    #[serde(default)]
    pub id: Option<String>,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub bookmakers: Vec<BookmakerOdds>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookmakerOdds {
    pub bookmaker: String,
    #[serde(default)]
    pub markets: HashMap<String, HashMap<String, OutcomePrice>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OutcomePrice {
    #[serde(default)]
    pub price: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OddsQuote {
    pub side: Side,
    pub team: String,
    pub price: Option<i32>,
    pub implied: Option<f64>,
}

impl OddsQuote {
    fn new(side: Side, team: &str, price: Option<i32>) -> Self {
        Self {
            side,
            team: team.to_string(),
            price,
            implied: price.and_then(|p| american_to_prob(p as f64)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookLine {
    pub matchup_id: String,
    pub bookmaker: String,
    pub snapshot: SnapshotKind,
    pub timestamp_utc: String,
    pub home: OddsQuote,
    pub away: OddsQuote,
}

impl OddsPayload {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid odds payload json")
    }

    pub fn snapshot(&self) -> SnapshotKind {
        self.snapshot_type
            .as_deref()
            .map(SnapshotKind::parse)
            .unwrap_or(SnapshotKind::Opening)
    }
}

/// Implied probability of an American price. Prices inside (-100, 100) and
/// non-finite values have no implied probability.
pub fn american_to_prob(odds: f64) -> Option<f64> {
    if !odds.is_finite() || odds.abs() < 100.0 {
        return None;
    }
    if odds > 0.0 {
        Some(100.0 / (odds + 100.0))
    } else {
        Some(-odds / (-odds + 100.0))
    }
}

pub fn parse_american_price(raw: &Value) -> Option<i32> {
    let value = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            let s = s.strip_prefix('+').unwrap_or(s);
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    if !value.is_finite() || value.fract() != 0.0 || value.abs() < 100.0 {
        return None;
    }
    if value > i32::MAX as f64 || value < i32::MIN as f64 {
        return None;
    }
    Some(value as i32)
}

pub fn matchup_id(game: &Game) -> String {
    match game.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("{}@{}", game.away_team.trim(), game.home_team.trim()),
    }
}

/// Flattens games -> bookmakers -> moneyline outcomes into one line per
/// (matchup, bookmaker). A bookmaker without a moneyline market still yields a
/// line with undefined prices.
pub fn flatten_odds(payload: &OddsPayload) -> Vec<BookLine> {
    let snapshot = payload.snapshot();
    let timestamp_utc = payload
        .timestamp_utc
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

    let mut out = Vec::new();
    for game in &payload.games {
        let id = matchup_id(game);
        for book in &game.bookmakers {
            let moneyline = book.markets.get(MONEYLINE_MARKET);
            let price_for = |team: &str| {
                moneyline
                    .and_then(|m| m.get(team))
                    .and_then(|o| o.price.as_ref())
                    .and_then(parse_american_price)
            };
            out.push(BookLine {
                matchup_id: id.clone(),
                bookmaker: book.bookmaker.clone(),
                snapshot: snapshot.clone(),
                timestamp_utc: timestamp_utc.clone(),
                home: OddsQuote::new(Side::Home, &game.home_team, price_for(&game.home_team)),
                away: OddsQuote::new(Side::Away, &game.away_team, price_for(&game.away_team)),
            });
        }
    }
    out
}
