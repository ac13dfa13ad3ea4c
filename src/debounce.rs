//! Trailing-edge debouncer.
//!
//! Holds the most recent value and releases it once no newer value has
//! arrived for the quiet period. Time is passed in explicitly so the
//! owner can drive it from `tokio::time` (and pause the clock in tests).

use std::time::Duration;
use tokio::time::Instant;

/// Quiet period between the last keystroke and a translation
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);

#[derive(Debug)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self { quiet, pending: None }
    }

    /// Replace any pending value and restart the quiet period.
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.quiet));
    }

    /// When the pending value becomes due, if there is one
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }

    /// Take the pending value if its quiet period has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match self.pending {
            Some((_, due)) if due <= now => self.pending.take().map(|(value, _)| value),
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_pending() {
        let mut debouncer: Debouncer<String> = Debouncer::default();
        assert!(debouncer.deadline().is_none());
        assert!(debouncer.take_due(Instant::now()).is_none());
    }

    #[test]
    fn test_releases_after_quiet_period() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.push("a", start);

        assert!(debouncer.take_due(start + Duration::from_millis(99)).is_none());
        assert_eq!(debouncer.take_due(start + Duration::from_millis(100)), Some("a"));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_newer_value_restarts_period() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.push("h", start);
        debouncer.push("hi", start + Duration::from_millis(80));

        assert!(debouncer.take_due(start + Duration::from_millis(120)).is_none());
        assert_eq!(
            debouncer.deadline(),
            Some(start + Duration::from_millis(180))
        );
        assert_eq!(debouncer.take_due(start + Duration::from_millis(180)), Some("hi"));
    }

    #[test]
    fn test_cancel() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.push(1, start);
        debouncer.cancel();
        assert!(debouncer.take_due(start + Duration::from_secs(1)).is_none());
    }
}
