use std::time::Duration;

/// Delay schedule: `initial * multiplier^n`, capped at `max`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2.0,
            current_attempt: 0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Delay before retry number `n` (0-based), without advancing
    pub fn delay_for(&self, n: u32) -> Duration {
        let factor = self.multiplier.powi(n.min(i32::MAX as u32) as i32);
        let delay_ms = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.current_attempt);
        self.current_attempt = self.current_attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.current_attempt(), 3);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(30), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(1));

        // An initial delay above the cap is capped too
        let backoff = ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(0), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_custom_multiplier() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_multiplier(3.0);
        assert_eq!(backoff.delay_for(2), Duration::from_millis(900));
    }
}
