//! Retry delay strategies.
//!
//! Each strategy produces a sequence of delays starting at
//! `initial_delay` and capped at `max_delay`, then jitters every delay by a
//! random multiple in `[1, 1 + randomisation_factor)`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::config::duration_ms;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default jitter factor.
pub const DEFAULT_RANDOMISATION_FACTOR: f64 = 0.2;

/// Default first delay.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);

/// Default delay cap.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(20_000);

/// Growth factor of the exponential strategy.
const EXPONENTIAL_FACTOR: u32 = 2;

// ============================================================================
// BackoffStrategy
// ============================================================================

/// A delay generator driven by the backoff adapter.
pub trait BackoffStrategy: Send {
    /// Returns the delay before the next retry.
    fn next_delay(&mut self) -> Duration;

    /// Restarts the sequence from `initial_delay`.
    fn reset(&mut self);
}

// ============================================================================
// StrategyKind
// ============================================================================

/// Named strategy selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Delays grow along the fibonacci sequence.
    #[default]
    Fibonacci,
    /// Delays double on every retry.
    Exponential,
}

impl StrategyKind {
    /// Returns the configuration name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fibonacci => "fibonacci",
            Self::Exponential => "exponential",
        }
    }

    /// Builds a boxed strategy of this kind.
    #[must_use]
    pub fn build(self, options: StrategyOptions) -> Box<dyn BackoffStrategy> {
        match self {
            Self::Fibonacci => Box::new(FibonacciStrategy::new(options)),
            Self::Exponential => Box::new(ExponentialStrategy::new(options)),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fibonacci" => Ok(Self::Fibonacci),
            "exponential" => Ok(Self::Exponential),
            other => Err(Error::config(format!("unknown backoff strategy: {other}"))),
        }
    }
}

// ============================================================================
// StrategyOptions
// ============================================================================

/// Strategy tuning shared by all kinds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct StrategyOptions {
    /// Jitter factor in `[0, 1]`. Zero disables jitter.
    pub randomisation_factor: f64,

    /// First delay.
    #[serde(with = "duration_ms")]
    pub initial_delay: Duration,

    /// Upper bound before jitter.
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
}

impl StrategyOptions {
    /// Creates options with explicit values.
    #[inline]
    #[must_use]
    pub const fn new(randomisation_factor: f64, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            randomisation_factor,
            initial_delay,
            max_delay,
        }
    }

    /// Sets the jitter factor.
    #[inline]
    #[must_use]
    pub fn with_randomisation_factor(mut self, factor: f64) -> Self {
        self.randomisation_factor = factor;
        self
    }

    /// Sets the first delay.
    #[inline]
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay cap.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the jitter factor is outside `[0, 1]`,
    /// the initial delay is zero, or the cap is below the initial delay.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.randomisation_factor) {
            return Err(Error::config(format!(
                "randomisation factor must be within [0, 1], got {}",
                self.randomisation_factor
            )));
        }

        if self.initial_delay.is_zero() {
            return Err(Error::config("initial delay must be greater than zero"));
        }

        if self.max_delay < self.initial_delay {
            return Err(Error::config(format!(
                "max delay {}ms is below initial delay {}ms",
                self.max_delay.as_millis(),
                self.initial_delay.as_millis()
            )));
        }

        Ok(())
    }
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self::new(
            DEFAULT_RANDOMISATION_FACTOR,
            DEFAULT_INITIAL_DELAY,
            DEFAULT_MAX_DELAY,
        )
    }
}

// ============================================================================
// Jitter
// ============================================================================

/// Applies the random multiple and rounds to whole milliseconds.
fn randomise(rng: &mut StdRng, delay: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return delay;
    }

    let multiple = 1.0 + rng.r#gen::<f64>() * factor;
    let millis = (delay.as_millis() as f64 * multiple).round();
    Duration::from_millis(millis as u64)
}

// ============================================================================
// FibonacciStrategy
// ============================================================================

/// Fibonacci delays: `d, d, 2d, 3d, 5d, ...` capped at `max_delay`.
pub struct FibonacciStrategy {
    options: StrategyOptions,
    backoff_delay: Duration,
    next_backoff_delay: Duration,
    rng: StdRng,
}

impl FibonacciStrategy {
    /// Creates a fibonacci strategy.
    #[must_use]
    pub fn new(options: StrategyOptions) -> Self {
        Self {
            backoff_delay: Duration::ZERO,
            next_backoff_delay: options.initial_delay,
            rng: StdRng::from_entropy(),
            options,
        }
    }
}

impl BackoffStrategy for FibonacciStrategy {
    fn next_delay(&mut self) -> Duration {
        let delay = self.next_backoff_delay.min(self.options.max_delay);
        self.next_backoff_delay = self.next_backoff_delay.saturating_add(self.backoff_delay);
        self.backoff_delay = delay;

        randomise(&mut self.rng, delay, self.options.randomisation_factor)
    }

    fn reset(&mut self) {
        self.backoff_delay = Duration::ZERO;
        self.next_backoff_delay = self.options.initial_delay;
    }
}

// ============================================================================
// ExponentialStrategy
// ============================================================================

/// Exponential delays: `d, 2d, 4d, ...` capped at `max_delay`.
pub struct ExponentialStrategy {
    options: StrategyOptions,
    next_backoff_delay: Duration,
    rng: StdRng,
}

impl ExponentialStrategy {
    /// Creates an exponential strategy.
    #[must_use]
    pub fn new(options: StrategyOptions) -> Self {
        Self {
            next_backoff_delay: options.initial_delay,
            rng: StdRng::from_entropy(),
            options,
        }
    }
}

impl BackoffStrategy for ExponentialStrategy {
    fn next_delay(&mut self) -> Duration {
        let delay = self.next_backoff_delay.min(self.options.max_delay);
        self.next_backoff_delay = delay.saturating_mul(EXPONENTIAL_FACTOR);

        randomise(&mut self.rng, delay, self.options.randomisation_factor)
    }

    fn reset(&mut self) {
        self.next_backoff_delay = self.options.initial_delay;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn no_jitter(initial: u64, max: u64) -> StrategyOptions {
        StrategyOptions::new(0.0, Duration::from_millis(initial), Duration::from_millis(max))
    }

    fn take_millis(strategy: &mut dyn BackoffStrategy, n: usize) -> Vec<u64> {
        (0..n).map(|_| strategy.next_delay().as_millis() as u64).collect()
    }

    #[test]
    fn test_fibonacci_sequence() {
        let mut strategy = FibonacciStrategy::new(no_jitter(100, 10_000));
        assert_eq!(
            take_millis(&mut strategy, 7),
            vec![100, 100, 200, 300, 500, 800, 1300]
        );
    }

    #[test]
    fn test_fibonacci_caps_at_max() {
        let mut strategy = FibonacciStrategy::new(no_jitter(1_000, 2_500));
        assert_eq!(
            take_millis(&mut strategy, 6),
            vec![1_000, 1_000, 2_000, 2_500, 2_500, 2_500]
        );
    }

    #[test]
    fn test_fibonacci_reset() {
        let mut strategy = FibonacciStrategy::new(no_jitter(10, 1_000));
        take_millis(&mut strategy, 5);
        strategy.reset();
        assert_eq!(take_millis(&mut strategy, 3), vec![10, 10, 20]);
    }

    #[test]
    fn test_exponential_sequence() {
        let mut strategy = ExponentialStrategy::new(no_jitter(100, 1_000));
        assert_eq!(
            take_millis(&mut strategy, 6),
            vec![100, 200, 400, 800, 1_000, 1_000]
        );
    }

    #[test]
    fn test_exponential_reset() {
        let mut strategy = ExponentialStrategy::new(no_jitter(50, 1_000));
        take_millis(&mut strategy, 4);
        strategy.reset();
        assert_eq!(take_millis(&mut strategy, 2), vec![50, 100]);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("fibonacci".parse::<StrategyKind>().unwrap(), StrategyKind::Fibonacci);
        assert_eq!(
            "exponential".parse::<StrategyKind>().unwrap(),
            StrategyKind::Exponential
        );
        assert!("linear".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::default().to_string(), "fibonacci");
    }

    #[test]
    fn test_options_default() {
        let options = StrategyOptions::default();
        assert_eq!(options.randomisation_factor, 0.2);
        assert_eq!(options.initial_delay, Duration::from_millis(1_000));
        assert_eq!(options.max_delay, Duration::from_millis(20_000));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_validation() {
        assert!(
            StrategyOptions::default()
                .with_randomisation_factor(1.5)
                .validate()
                .is_err()
        );
        assert!(
            StrategyOptions::default()
                .with_initial_delay(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            StrategyOptions::default()
                .with_max_delay(Duration::from_millis(10))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_options_deserialize_millis() {
        let options: StrategyOptions =
            serde_json::from_str(r#"{ "initial_delay": 250, "max_delay": 4000 }"#).unwrap();
        assert_eq!(options.initial_delay, Duration::from_millis(250));
        assert_eq!(options.max_delay, Duration::from_millis(4_000));
        assert_eq!(options.randomisation_factor, DEFAULT_RANDOMISATION_FACTOR);
    }

    proptest! {
        #[test]
        fn jittered_delays_stay_within_bounds(
            initial in 1u64..5_000,
            extra in 0u64..50_000,
            factor in 0.0f64..=1.0,
            steps in 1usize..30,
            exponential in any::<bool>(),
        ) {
            let max = initial + extra;
            let options = StrategyOptions::new(
                factor,
                Duration::from_millis(initial),
                Duration::from_millis(max),
            );
            let kind = if exponential { StrategyKind::Exponential } else { StrategyKind::Fibonacci };
            let mut strategy = kind.build(options);

            for _ in 0..steps {
                let delay = strategy.next_delay().as_millis() as f64;
                prop_assert!(delay >= initial as f64);
                prop_assert!(delay <= (max as f64 * (1.0 + factor)).round());
            }
        }
    }
}
