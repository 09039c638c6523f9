use std::time::{Duration, Instant};

/// Exponential, cancellable retry timer driving `cstream`'s `WAITING`
/// state. A poll-don't-push shape (`start`/`poll`/`reset_interval`) built
/// on plain `std::time::Instant`, since a millisecond-granularity
/// reconnect delay has no need for a calibrated high-resolution clock.
///
/// There is no asynchronous timer object to tear down on this platform, so
/// unlike the original nanomsg `nn_backoff`, `cancel` takes effect
/// immediately rather than requiring a later `TIMER_STOPPED` acknowledgment
/// — `cstream` can fold `STOPPING_BACKOFF` straight through in the same
/// call.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    cur: Duration,
    deadline: Option<Instant>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = if max.is_zero() { base } else { max };
        Self { base, max, cur: base, deadline: None }
    }

    /// Arms the timer at the current interval, then doubles the interval
    /// (capped at `max`) for the *next* call — so the Nth consecutive
    /// failure waits roughly `base * 2^(N-1)`, capped.
    pub fn start(&mut self) {
        self.deadline = Some(Instant::now() + self.cur);
        self.cur = self.cur.checked_mul(2).unwrap_or(self.max).min(self.max);
    }

    /// Disarms the timer. Returns whether it had been armed.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.deadline.is_none()
    }

    /// Returns `true` exactly once per arm, the tick the deadline elapses.
    pub fn poll(&mut self) -> bool {
        match self.deadline {
            Some(d) if Instant::now() >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Time remaining until the timer fires, for a worker poll timeout.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Resets the escalating interval back to `base`: a successful
    /// connection resets the interval so the next failure starts the
    /// backoff over from scratch.
    pub fn reset_interval(&mut self) {
        self.cur = self.base;
    }

    pub fn current_interval(&self) -> Duration {
        self.cur
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_and_caps() {
        let mut b = Backoff::new(Duration::from_millis(10), Duration::from_millis(40));
        assert_eq!(b.current_interval(), Duration::from_millis(10));
        b.start();
        assert_eq!(b.current_interval(), Duration::from_millis(20));
        b.start();
        assert_eq!(b.current_interval(), Duration::from_millis(40));
        b.start();
        assert_eq!(b.current_interval(), Duration::from_millis(40));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut b = Backoff::new(Duration::from_millis(5), Duration::from_millis(5));
        assert!(!b.cancel());
        b.start();
        assert!(b.cancel());
        assert!(!b.cancel());
        assert!(b.is_idle());
    }

    #[test]
    fn reset_restores_base_interval() {
        let mut b = Backoff::new(Duration::from_millis(10), Duration::from_millis(100));
        b.start();
        b.start();
        assert_eq!(b.current_interval(), Duration::from_millis(40));
        b.reset_interval();
        assert_eq!(b.current_interval(), Duration::from_millis(10));
    }
}
