//! Wait schedule between run status polls.

use crate::config::PollSettings;
use std::time::Duration;

/// Exponential backoff, capped, reset after progress.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            factor: if factor.is_finite() { factor.max(1.0) } else { 1.0 },
            current: initial,
        }
    }

    pub fn from_settings(settings: &PollSettings) -> Self {
        Self::new(settings.interval(), settings.max_interval(), settings.backoff_factor)
    }

    /// Wait before the next poll; grows the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.factor)
            .unwrap_or(self.max);
        self.current = grown.min(self.max);
        delay
    }

    /// Start over from the initial interval.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grows_to_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350), 2.0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_factor_below_one_is_constant() {
        let mut backoff = Backoff::new(Duration::from_millis(50), Duration::from_secs(1), 0.5);
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_from_default_settings() {
        let mut backoff = Backoff::from_settings(&PollSettings::default());
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }
}
