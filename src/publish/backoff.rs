//! Waiting between commit attempts

use std::time::Duration;

/// Blocks the current flow of control for a while
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Sleeper + ?Sized> Sleeper for &T {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Wait after a failed attempt: `base * 2^attempt`, attempts counted from 1
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
    }

    #[test]
    fn delay_saturates() {
        let base = Duration::from_secs(u64::MAX / 2);
        assert_eq!(backoff_delay(base, 40), Duration::MAX);
    }

    #[test]
    fn zero_base_never_waits() {
        assert_eq!(backoff_delay(Duration::ZERO, 5), Duration::ZERO);
    }
}
