//! Per-slide wall clock budget.

use std::time::{Duration, Instant};

/// Advisory status shown once a slide has used a large share of its budget
pub const SLOW_NOTE: &str = "Slide heavily loaded with stained cells, processing takes longer";

/// Tracks the time spent on one slide against its timeout
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    timeout: Duration,
    slow_after: Duration,
    slow_signalled: bool,
}

impl Deadline {
    pub fn start(timeout: Duration, slow_after: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            slow_after,
            slow_signalled: false,
        }
    }

    /// Budget that never runs out
    pub fn unlimited() -> Self {
        Self::start(Duration::MAX, Duration::MAX)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Strictly past the budget
    pub fn expired(&self) -> bool {
        self.elapsed() > self.timeout
    }

    /// Returns the heavy-load note the first time the slow mark is crossed
    pub fn slow_note(&mut self) -> Option<&'static str> {
        if self.slow_signalled || self.elapsed() < self.slow_after {
            return None;
        }
        self.slow_signalled = true;
        Some(SLOW_NOTE)
    }

    pub fn slow_signalled(&self) -> bool {
        self.slow_signalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_expires_immediately() {
        let deadline = Deadline::start(Duration::ZERO, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(deadline.expired());
    }

    #[test]
    fn unlimited_never_expires() {
        let mut deadline = Deadline::unlimited();
        assert!(!deadline.expired());
        assert_eq!(deadline.slow_note(), None);
    }

    #[test]
    fn slow_note_fires_once() {
        let mut deadline = Deadline::start(Duration::from_secs(60), Duration::ZERO);
        assert_eq!(deadline.slow_note(), Some(SLOW_NOTE));
        assert_eq!(deadline.slow_note(), None);
        assert!(deadline.slow_signalled());
        assert!(!deadline.expired());
    }
}
