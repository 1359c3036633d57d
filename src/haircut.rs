use std::fmt;

const OPENING_DISCOUNT: f64 = 0.20;
const CLOSING_DISCOUNT: f64 = 0.10;
const DEFAULT_DISCOUNT: f64 = 0.15;
const INJURY_DISCOUNT: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Opening,
    Closing,
    Other(String),
}

impl SnapshotKind {
    pub fn parse(raw: &str) -> Self {
        let t = raw.trim().to_ascii_lowercase();
        match t.as_str() {
            "opening" => SnapshotKind::Opening,
            "closing" => SnapshotKind::Closing,
            _ => SnapshotKind::Other(t),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SnapshotKind::Opening => "opening",
            SnapshotKind::Closing => "closing",
            SnapshotKind::Other(s) => s.as_str(),
        }
    }

    pub fn base_discount(&self) -> f64 {
        match self {
            SnapshotKind::Opening => OPENING_DISCOUNT,
            SnapshotKind::Closing => CLOSING_DISCOUNT,
            SnapshotKind::Other(_) => DEFAULT_DISCOUNT,
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaircutParams {
    pub snapshot: SnapshotKind,
    pub injury: bool,
    pub confidence: f64,
}

impl HaircutParams {
    pub fn new(snapshot: SnapshotKind, injury: bool, confidence: f64) -> Self {
        Self {
            snapshot,
            injury,
            confidence,
        }
    }

    /// Discount actually applied: base (+ injury) scaled by `1 - confidence`.
    pub fn applied_discount(&self) -> f64 {
        let mut base = self.snapshot.base_discount();
        if self.injury {
            base += INJURY_DISCOUNT;
        }
        let confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        base * (1.0 - confidence)
    }
}

pub fn haircut(prob: Option<f64>, params: &HaircutParams) -> Option<f64> {
    let p = prob.filter(|p| p.is_finite() && *p > 0.0)?;
    Some(p * (1.0 - params.applied_discount()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_discount_follows_snapshot() {
        assert_eq!(SnapshotKind::parse("Opening").base_discount(), 0.20);
        assert_eq!(SnapshotKind::parse("closing").base_discount(), 0.10);
        assert_eq!(SnapshotKind::parse("midweek").base_discount(), 0.15);
    }

    #[test]
    fn confidence_scales_discount_down() {
        let full = HaircutParams::new(SnapshotKind::Opening, false, 0.0);
        let none = HaircutParams::new(SnapshotKind::Opening, false, 1.0);
        let partial = HaircutParams::new(SnapshotKind::Opening, false, 0.8);

        assert!((haircut(Some(0.5), &full).unwrap() - 0.40).abs() < 1e-12);
        assert!((haircut(Some(0.5), &none).unwrap() - 0.5).abs() < 1e-12);
        assert!((haircut(Some(0.5), &partial).unwrap() - 0.5 * (1.0 - 0.04)).abs() < 1e-12);
    }

    #[test]
    fn injury_adds_to_base_before_scaling() {
        let p = HaircutParams::new(SnapshotKind::Closing, true, 0.5);
        assert!((p.applied_discount() - 0.075).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_confidence_never_increases_discount() {
        let over = HaircutParams::new(SnapshotKind::Opening, false, 1.7);
        let under = HaircutParams::new(SnapshotKind::Opening, false, -3.0);
        assert_eq!(over.applied_discount(), 0.0);
        assert!((under.applied_discount() - 0.20).abs() < 1e-12);
    }

    #[test]
    fn undefined_and_non_positive_inputs_stay_undefined() {
        let p = HaircutParams::new(SnapshotKind::Opening, false, 0.8);
        assert!(haircut(None, &p).is_none());
        assert!(haircut(Some(0.0), &p).is_none());
        assert!(haircut(Some(-0.2), &p).is_none());
        assert!(haircut(Some(f64::NAN), &p).is_none());
    }
}
