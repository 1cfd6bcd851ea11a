//! Per-stage debounce timers for coalescing rapid parameter edits.
//!
//! Dragging a slider produces a burst of parameter changes; recomputing
//! on every one wastes work on intermediate values nobody will see.
//! [`Debouncer`] holds a deadline per stage and only reports a stage as
//! due once its quiet period has elapsed with no further edits.
//!
//! The struct is pure data driven by explicit [`Instant`]s, so the host
//! loop supplies `Instant::now()` and tests supply fabricated times.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Quiet period applied when none is configured.
pub const DEFAULT_QUIET: Duration = Duration::from_millis(300);

/// Tracks one pending deadline per stage index.
///
/// [`request`](Self::request) restarts the timer for a stage rather
/// than queueing a second firing, so a burst of edits yields exactly
/// one due stage once the burst stops.
#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    deadlines: HashMap<usize, Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debouncer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_quiet(DEFAULT_QUIET)
    }

    #[must_use]
    pub fn with_quiet(quiet: Duration) -> Self {
        Self {
            quiet,
            deadlines: HashMap::new(),
        }
    }

    /// Arm (or restart) the timer for `index`. The deadline becomes
    /// `now + quiet` regardless of any earlier pending deadline.
    pub fn request(&mut self, index: usize, now: Instant) {
        self.deadlines.insert(index, now + self.quiet);
    }

    /// Drop the pending deadline for `index`, if any.
    pub fn cancel(&mut self, index: usize) {
        self.deadlines.remove(&index);
    }

    /// Drop every pending deadline.
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    /// Remove and return the stages whose quiet period has elapsed,
    /// in ascending index order.
    pub fn due(&mut self, now: Instant) -> Vec<usize> {
        let mut fired: Vec<usize> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(index, _)| *index)
            .collect();
        fired.sort_unstable();
        for index in &fired {
            self.deadlines.remove(index);
        }
        fired
    }

    /// The earliest pending deadline, for sizing a `recv_timeout`.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn fires_after_the_quiet_period() {
        let base = Instant::now();
        let mut debouncer = Debouncer::new();
        debouncer.request(2, base);

        assert!(debouncer.due(at(base, 299)).is_empty());
        assert_eq!(debouncer.due(at(base, 300)), vec![2]);
        assert!(debouncer.is_idle());
    }

    #[test]
    fn a_new_request_restarts_the_timer() {
        let base = Instant::now();
        let mut debouncer = Debouncer::new();
        debouncer.request(1, base);
        debouncer.request(1, at(base, 200));

        // The original deadline at base+300 has been superseded.
        assert!(debouncer.due(at(base, 350)).is_empty());
        assert_eq!(debouncer.due(at(base, 500)), vec![1]);
    }

    #[test]
    fn a_burst_collapses_to_one_firing() {
        let base = Instant::now();
        let mut debouncer = Debouncer::new();
        for step in 0..10 {
            debouncer.request(3, at(base, step * 20));
        }
        let fired = debouncer.due(at(base, 180 + 300));
        assert_eq!(fired, vec![3]);
        assert!(debouncer.due(at(base, 10_000)).is_empty());
    }

    #[test]
    fn due_stages_come_out_in_index_order() {
        let base = Instant::now();
        let mut debouncer = Debouncer::new();
        debouncer.request(4, base);
        debouncer.request(1, base);
        debouncer.request(2, base);

        assert_eq!(debouncer.due(at(base, 300)), vec![1, 2, 4]);
    }

    #[test]
    fn next_deadline_is_the_earliest() {
        let base = Instant::now();
        let mut debouncer = Debouncer::new();
        assert!(debouncer.next_deadline().is_none());

        debouncer.request(5, at(base, 100));
        debouncer.request(1, base);
        assert_eq!(debouncer.next_deadline(), Some(at(base, 300)));
    }

    #[test]
    fn cancel_drops_only_the_named_stage() {
        let base = Instant::now();
        let mut debouncer = Debouncer::with_quiet(Duration::from_millis(50));
        debouncer.request(1, base);
        debouncer.request(2, base);
        debouncer.cancel(1);

        assert_eq!(debouncer.due(at(base, 60)), vec![2]);
    }
}
