//! Advisory cost and time estimates for agent runs.
//!
//! `tokens = baseline * complexity`, split into input and output shares
//! billed at separate rates. Seconds are `baseline_seconds * complexity`,
//! rounded up. Real usage from the remote call supersedes these numbers.

use hub_config_and_utils::EstimationConfig;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub complexity: f64,
    pub tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// USD.
    pub cost: f64,
    pub seconds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Estimator {
    config: EstimationConfig,
}

impl Estimator {
    pub fn new(config: EstimationConfig) -> Self {
        Self { config }
    }

    /// Samples a complexity in the configured range and estimates with it.
    pub fn estimate<R: Rng + ?Sized>(&self, rng: &mut R) -> Estimate {
        let complexity = if self.config.complexity_min < self.config.complexity_max {
            rng.gen_range(self.config.complexity_min..=self.config.complexity_max)
        } else {
            self.config.complexity_min
        };
        self.for_complexity(complexity)
    }

    pub fn for_complexity(&self, complexity: f64) -> Estimate {
        let cfg = &self.config;
        let tokens = (cfg.baseline_tokens * complexity).round().max(0.0) as u64;
        let input_tokens = (tokens as f64 * cfg.input_share).round() as u64;
        let output_tokens = tokens.saturating_sub(input_tokens);
        let cost = input_tokens as f64 * cfg.input_rate_per_token
            + output_tokens as f64 * cfg.output_rate_per_token;

        Estimate {
            complexity,
            tokens,
            input_tokens,
            output_tokens,
            cost,
            seconds: (cfg.baseline_seconds * complexity).ceil().max(0.0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn baseline_complexity_matches_hand_computation() {
        let estimate = Estimator::default().for_complexity(1.0);
        assert_eq!(estimate.tokens, 8_000);
        assert_eq!(estimate.input_tokens, 4_800);
        assert_eq!(estimate.output_tokens, 3_200);
        assert!((estimate.cost - (4_800.0 * 0.000_003 + 3_200.0 * 0.000_015)).abs() < 1e-9);
        assert_eq!(estimate.seconds, 45);
    }

    #[test]
    fn seconds_round_up() {
        // 45 * 1.01 = 45.45
        assert_eq!(Estimator::default().for_complexity(1.01).seconds, 46);
    }

    #[test]
    fn sampled_complexity_stays_in_range() {
        let estimator = Estimator::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let estimate = estimator.estimate(&mut rng);
            assert!((0.8..=1.2).contains(&estimate.complexity));
            assert!(estimate.tokens >= 6_400 && estimate.tokens <= 9_600);
            assert!(estimate.seconds >= 36 && estimate.seconds <= 54);
        }
    }

    #[test]
    fn degenerate_range_uses_the_minimum() {
        let estimator = Estimator::new(EstimationConfig {
            complexity_min: 1.0,
            complexity_max: 1.0,
            ..EstimationConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(estimator.estimate(&mut rng).complexity, 1.0);
    }
}
