use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

pub const DEFAULT_SIMS: u32 = 20_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationResult {
    pub home_win_rate: f64,
    pub away_win_rate: f64,
    pub standard_error: f64,
}

/// Draws `n_sims` independent home/away outcomes. Undefined or out-of-range
/// probabilities return `None` without consuming any draws.
///
/// The standard error is the closed-form binomial value for `home_prob`, not
/// the spread of the sampled wins.
pub fn simulate<R: Rng>(
    home_prob: f64,
    away_prob: f64,
    n_sims: u32,
    rng: &mut R,
) -> Option<SimulationResult> {
    if n_sims == 0 || !valid_prob(home_prob) || !valid_prob(away_prob) {
        return None;
    }

    let mut home_wins = 0u32;
    for _ in 0..n_sims {
        if rng.gen_range(0.0_f64..1.0) < home_prob {
            home_wins += 1;
        }
    }

    let n = n_sims as f64;
    let home_win_rate = home_wins as f64 / n;
    Some(SimulationResult {
        home_win_rate,
        away_win_rate: 1.0 - home_win_rate,
        standard_error: (home_prob * (1.0 - home_prob) / n).sqrt(),
    })
}

fn valid_prob(p: f64) -> bool {
    p.is_finite() && (0.0..=1.0).contains(&p)
}

#[derive(Debug, Clone, Copy)]
pub struct MonteCarloSimulator {
    n_sims: u32,
    seed: u64,
}

impl MonteCarloSimulator {
    pub fn new(n_sims: u32, max_sims: u32, seed: Option<u64>) -> Self {
        let cap = max_sims.max(1);
        Self {
            n_sims: n_sims.clamp(1, cap),
            seed: seed.unwrap_or_else(|| rand::thread_rng().gen_range(0..u64::MAX)),
        }
    }

    pub fn n_sims(&self) -> u32 {
        self.n_sims
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn run_one(
        &self,
        index: usize,
        home_prob: f64,
        away_prob: f64,
    ) -> Option<SimulationResult> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(index as u64));
        simulate(home_prob, away_prob, self.n_sims, &mut rng)
    }

    pub fn run_all(&self, probs: &[(f64, f64)]) -> Vec<Option<SimulationResult>> {
        probs
            .par_iter()
            .enumerate()
            .map(|(idx, (h, a))| self.run_one(idx, *h, *a))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_rate_tracks_input_probability() {
        let mut rng = StdRng::seed_from_u64(7);
        let r = simulate(0.6, 0.4, 20_000, &mut rng).unwrap();
        assert!((r.home_win_rate - 0.6).abs() < 0.02);
        assert_eq!(r.away_win_rate, 1.0 - r.home_win_rate);
        assert!((r.standard_error - (0.24_f64 / 20_000.0).sqrt()).abs() < 1e-15);
    }

    #[test]
    fn certain_outcomes() {
        let mut rng = StdRng::seed_from_u64(1);
        let r = simulate(1.0, 0.0, 500, &mut rng).unwrap();
        assert_eq!(r.home_win_rate, 1.0);
        assert_eq!(r.standard_error, 0.0);
        let r = simulate(0.0, 1.0, 500, &mut rng).unwrap();
        assert_eq!(r.home_win_rate, 0.0);
        assert_eq!(r.away_win_rate, 1.0);
    }

    #[test]
    fn undefined_inputs_consume_no_draws() {
        let mut a = StdRng::seed_from_u64(3);
        let mut b = StdRng::seed_from_u64(3);
        assert!(simulate(f64::NAN, 0.4, 100, &mut a).is_none());
        assert!(simulate(0.6, 1.4, 100, &mut a).is_none());
        assert!(simulate(0.6, 0.4, 0, &mut a).is_none());
        assert_eq!(a.gen_range(0..u64::MAX), b.gen_range(0..u64::MAX));
    }

    #[test]
    fn parallel_runs_are_reproducible() {
        let sim = MonteCarloSimulator::new(2_000, 10_000, Some(42));
        let probs = vec![(0.6, 0.4), (0.3, 0.7), (0.5, 0.5), (0.9, 0.1)];
        let first = sim.run_all(&probs);
        let second = sim.run_all(&probs);
        assert_eq!(first, second);
        assert_eq!(first[2], sim.run_one(2, 0.5, 0.5));
    }

    #[test]
    fn sims_are_capped() {
        assert_eq!(MonteCarloSimulator::new(0, 100, Some(1)).n_sims(), 1);
        assert_eq!(MonteCarloSimulator::new(1_000, 100, Some(1)).n_sims(), 100);
    }
}
