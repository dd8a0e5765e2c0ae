use std::time::Duration;

use rand::Rng;

/// Capped exponential cool-off schedule.
///
/// The wait before retry `n` (1-based) is `base * factor^(n - 1)`, optionally spread by
/// `±jitter`, and never more than `cap`. With the defaults from [`Exponential::new`]
/// (factor `2.0`, no jitter) a 1s base and 10s cap yields `1s, 2s, 4s, 8s, 10s, 10s, ...`.
///
/// # Example
/// ```
/// use backoff::strategy::exponential::Exponential;
/// use std::time::Duration;
///
/// let mut schedule = Exponential::from_millis(1000, 10_000).max_retries(2);
///
/// assert_eq!(schedule.next(), Some(Duration::from_millis(1000)));
/// assert_eq!(schedule.next(), Some(Duration::from_millis(2000)));
/// assert_eq!(schedule.next(), None);
/// ```
#[derive(Debug, Clone)]
pub struct Exponential {
    base: Duration,
    cap: Duration,
    factor: f64,
    /// Between 0.0 and 1.0; 0.0 makes the schedule deterministic.
    jitter: f64,
    /// None retries forever.
    max_retries: Option<u16>,
    retries: u16,
}

impl Exponential {
    /// Doubling schedule starting at `base`, capped at `cap`, without jitter and without
    /// a retry limit.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            factor: 2.0,
            jitter: 0.0,
            max_retries: None,
            retries: 0,
        }
    }

    pub fn from_millis(base_ms: u64, cap_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(cap_ms))
    }

    /// Growth factor between consecutive waits.
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Spreads every wait uniformly over `[wait * (1 - jitter), wait * (1 + jitter)]`.
    /// Values outside `0.0..=1.0` are clamped.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Stops yielding waits after `max_retries` of them.
    pub fn max_retries(mut self, max_retries: u16) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Number of waits handed out so far.
    pub fn retries(&self) -> u16 {
        self.retries
    }

    /// Starts the schedule over.
    pub fn reset(&mut self) {
        self.retries = 0;
    }

    /// Wait before retry number `retry` (1-based), without jitter.
    pub fn delay_for(&self, retry: u16) -> Duration {
        self.capped(self.raw_millis(retry))
    }

    fn raw_millis(&self, retry: u16) -> f64 {
        // retry 0 is treated as the first retry so powi never sees a negative exponent
        let exponent = i32::from(retry.max(1) - 1);
        self.base.as_millis() as f64 * self.factor.powi(exponent)
    }

    fn capped(&self, millis: f64) -> Duration {
        let cap_ms = self.cap.as_millis() as f64;
        if !millis.is_finite() || millis >= cap_ms {
            return self.cap;
        }
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

impl Iterator for Exponential {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.max_retries.is_some_and(|max| self.retries >= max) {
            return None;
        }
        self.retries = self.retries.saturating_add(1);

        if self.jitter == 0.0 {
            return Some(self.delay_for(self.retries));
        }
        let spread: f64 = rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter);
        Some(self.capped(self.raw_millis(self.retries) * spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let mut schedule = Exponential::from_millis(1000, 10_000);

        let waits: Vec<u64> = schedule.by_ref().take(6).map(|d| d.as_millis() as u64).collect();
        assert_eq!(waits, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
        assert_eq!(schedule.retries(), 6);
    }

    #[test]
    fn stops_after_max_retries() {
        let mut schedule = Exponential::from_millis(1000, 10_000).max_retries(2);

        assert_eq!(schedule.next(), Some(Duration::from_millis(1000)));
        assert_eq!(schedule.next(), Some(Duration::from_millis(2000)));
        assert_eq!(schedule.next(), None);
        assert_eq!(schedule.retries(), 2);
    }

    #[test]
    fn zero_retries_yields_nothing() {
        let mut schedule = Exponential::from_millis(1000, 10_000).max_retries(0);
        assert_eq!(schedule.next(), None);
    }

    #[test]
    fn reset_starts_over() {
        let mut schedule = Exponential::from_millis(100, 10_000).max_retries(2);
        schedule.next();
        schedule.next();
        assert_eq!(schedule.next(), None);

        schedule.reset();
        assert_eq!(schedule.next(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn custom_factor() {
        let schedule = Exponential::from_millis(100, 10_000).factor(3.0);
        assert_eq!(schedule.delay_for(1), Duration::from_millis(100));
        assert_eq!(schedule.delay_for(2), Duration::from_millis(300));
        assert_eq!(schedule.delay_for(3), Duration::from_millis(900));
    }

    #[test]
    fn huge_retry_numbers_stay_capped() {
        let schedule = Exponential::from_millis(1000, 10_000);
        assert_eq!(schedule.delay_for(0), Duration::from_millis(1000));
        assert_eq!(schedule.delay_for(u16::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn jitter_stays_in_range() {
        let mut schedule = Exponential::from_millis(1000, 10_000).jitter(0.5);
        for _ in 0..20 {
            schedule.reset();
            let wait = schedule.next().unwrap();
            assert!(wait >= Duration::from_millis(500));
            assert!(wait <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn jitter_is_clamped() {
        let mut schedule = Exponential::from_millis(1000, 10_000).jitter(4.0);
        let wait = schedule.next().unwrap();
        assert!(wait <= Duration::from_millis(2000));
    }
}
