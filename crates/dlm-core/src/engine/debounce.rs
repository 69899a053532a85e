//! Trailing-edge debounce: every trigger pushes the deadline out by `delay`.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub(crate) struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Cancel any pending deadline and schedule a new one `delay` after `now`.
    pub(crate) fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left until the deadline; `None` when nothing is scheduled.
    pub(crate) fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    /// Returns true (and clears the deadline) once it has passed.
    pub(crate) fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if d <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Clears the deadline regardless of time; true if one was pending.
    pub(crate) fn take(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_collapses_to_one_deadline() {
        let t0 = Instant::now();
        let mut d = Debounce::new(Duration::from_millis(100));
        assert!(!d.is_pending());
        assert_eq!(d.remaining(t0), None);

        for i in 0..10 {
            d.trigger(t0 + Duration::from_millis(i * 10));
        }
        // Last trigger at t0+90ms, so the deadline is t0+190ms.
        assert!(!d.take_due(t0 + Duration::from_millis(150)));
        assert_eq!(
            d.remaining(t0 + Duration::from_millis(150)),
            Some(Duration::from_millis(40))
        );
        assert!(d.take_due(t0 + Duration::from_millis(190)));
        assert!(!d.is_pending());
        assert!(!d.take_due(t0 + Duration::from_millis(500)));
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let t0 = Instant::now();
        let mut d = Debounce::new(Duration::from_millis(5));
        d.trigger(t0);
        assert_eq!(d.remaining(t0 + Duration::from_secs(1)), Some(Duration::ZERO));
    }

    #[test]
    fn take_clears_without_waiting() {
        let mut d = Debounce::new(Duration::from_secs(60));
        d.trigger(Instant::now());
        assert!(d.take());
        assert!(!d.take());
    }
}
