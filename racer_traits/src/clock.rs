use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source used by the control loop and background workers.
///
/// - now(): monotonic Instant
/// - sleep(): pause for the given duration (test impls may simulate)
/// - ms_since(): elapsed milliseconds since an epoch Instant
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        self.now().saturating_duration_since(epoch).as_millis() as u64
    }
}

/// Real clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}


#[cfg(test)]
mod tests {
    use super::test_clock::TestClock;
    use super::*;

    #[test]
    fn ms_since_tracks_advances() {
        let clk = TestClock::new();
        let epoch = clk.now();
        assert_eq!(clk.ms_since(epoch), 0);
        clk.advance(Duration::from_millis(520));
        assert_eq!(clk.ms_since(epoch), 520);
    }

    #[test]
    fn sleep_advances_without_blocking() {
        let clk = TestClock::new();
        let epoch = clk.now();
        clk.sleep(Duration::from_secs(3));
        assert_eq!(clk.ms_since(epoch), 3000);
    }

    #[test]
    fn ms_since_saturates_for_future_epoch() {
        let clk = MonotonicClock::new();
        let future = clk.now() + Duration::from_secs(60);
        assert_eq!(clk.ms_since(future), 0);
    }
}
