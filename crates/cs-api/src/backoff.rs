//! Polling delays while a workspace boots

use std::time::Duration;

use rand::Rng;

use cs_core::config::BackoffConfig;

/// Delay schedule `initial * multiplier^n`, capped at `max`, with up to
/// `jitter * delay` of random extra wait added to each step.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    config: BackoffConfig,
    attempt: i32,
}

impl PollBackoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            config: config.clone(),
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay();
        self.attempt = self.attempt.saturating_add(1);

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let extra = base.as_secs_f64() * jitter * rand::thread_rng().gen::<f64>();
        base + Duration::from_secs_f64(extra)
    }

    fn base_delay(&self) -> Duration {
        let grown = self.config.initial.as_secs_f64() * self.config.multiplier.powi(self.attempt);
        if !grown.is_finite() || grown >= self.config.max.as_secs_f64() {
            self.config.max
        } else {
            Duration::from_secs_f64(grown)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial: u64, max: u64, multiplier: f64, jitter: f64) -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_secs(initial),
            max: Duration::from_secs(max),
            multiplier,
            jitter,
        }
    }

    #[test]
    fn test_doubles_until_cap() {
        let mut backoff = PollBackoff::new(&config(1, 5, 2.0, 0.0));
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn test_many_attempts_stay_at_cap() {
        let mut backoff = PollBackoff::new(&config(1, 10, 3.0, 0.0));
        for _ in 0..2_000 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_adds_at_most_fraction() {
        let mut backoff = PollBackoff::new(&config(2, 2, 1.0, 0.5));
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(3));
        }
    }
}
