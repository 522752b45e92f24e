//! Jittered exponential backoff.
//!
//! The scheduler only computes delays; sleeping is left to the caller.

use std::time::Duration;

use rand::Rng;
use relay_core::RetryConfig;

#[derive(Debug, Clone)]
pub struct BackoffScheduler {
    base_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
    jitter_fraction: f64,
    min_delay_ms: u64,
}

impl BackoffScheduler {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            multiplier: config.backoff_multiplier,
            jitter_fraction: config.jitter_fraction.clamp(0.0, 1.0),
            min_delay_ms: config.min_delay_ms,
        }
    }

    /// Un-jittered delay: `min(base × multiplier^attempt, max)`.
    pub fn base_delay_ms(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        delay.min(self.max_delay_ms as f64)
    }

    /// Delay before the retry that follows `attempt` (0-indexed), with
    /// uniform jitter of ±`jitter_fraction`.
    pub fn next_delay_ms(&self, attempt: u32) -> u64 {
        let unit = if self.jitter_fraction > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        self.delay_with_jitter(attempt, unit)
    }

    /// Deterministic variant of [`next_delay_ms`](Self::next_delay_ms);
    /// `unit` in `[-1, 1]` selects the point within the jitter range.
    pub fn delay_with_jitter(&self, attempt: u32, unit: f64) -> u64 {
        let base = self.base_delay_ms(attempt);
        let jitter = unit.clamp(-1.0, 1.0) * base * self.jitter_fraction;
        let delay = (base + jitter).max(self.min_delay_ms as f64);
        delay.floor() as u64
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.next_delay_ms(attempt))
    }

    /// Largest delay the scheduler can produce.
    pub fn ceiling_ms(&self) -> u64 {
        (self.max_delay_ms as f64 * (1.0 + self.jitter_fraction)).floor() as u64
    }
}

impl Default for BackoffScheduler {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
