use rand::Rng;

use super::Backoff;

/// Delays growing by `multiplier / multiplier_base` after every attempt.
/// The ratio keeps the arithmetic in integers.
#[derive(Clone, Copy, Debug)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    multiplier: u64,
    multiplier_base: u64,
}

impl ExponentialBackoff {
    /// # Panics
    ///
    /// If `multiplier_base` is zero.
    pub fn new(base_delay_ms: u64, multiplier: u64, multiplier_base: u64) -> Self {
        assert_ne!(multiplier_base, 0, "backoff multiplier base must be non-zero");
        Self {
            base_delay_ms,
            multiplier,
            multiplier_base,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 50,
            multiplier: 2,
            multiplier_base: 1,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64 {
        curr_delay_ms.saturating_mul(self.multiplier) / self.multiplier_base
    }
}

/// Adds a random delay of up to `max_jitter_ms` on top of another backoff so
/// that concurrent retriers spread out.
#[derive(Clone, Copy, Debug)]
pub struct JitteredBackoff<B> {
    inner: B,
    max_jitter_ms: u64,
}

impl<B: Backoff> JitteredBackoff<B> {
    pub fn new(inner: B, max_jitter_ms: u64) -> Self {
        Self {
            inner,
            max_jitter_ms,
        }
    }

    fn jitter(&self) -> u64 {
        if self.max_jitter_ms == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..=self.max_jitter_ms)
    }
}

impl<B: Backoff> Backoff for JitteredBackoff<B> {
    fn base_delay_ms(&self) -> u64 {
        self.inner.base_delay_ms() + self.jitter()
    }

    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64 {
        self.inner.next_delay_ms(curr_delay_ms) + self.jitter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let backoff = ExponentialBackoff::new(100, 15, 10);
        assert_eq!(backoff.base_delay_ms(), 100);
        assert_eq!(backoff.next_delay_ms(100), 150);
        assert_eq!(backoff.next_delay_ms(150), 225);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let backoff = JitteredBackoff::new(ExponentialBackoff::new(100, 2, 1), 10);
        for _ in 0..100 {
            let base = backoff.base_delay_ms();
            assert!((100..=110).contains(&base));
            let next = backoff.next_delay_ms(100);
            assert!((200..=210).contains(&next));
        }

        let no_jitter = JitteredBackoff::new(ExponentialBackoff::new(100, 2, 1), 0);
        assert_eq!(no_jitter.base_delay_ms(), 100);
    }
}
