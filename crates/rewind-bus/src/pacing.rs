//! Inter-entry delay policy of the replay dispatch loop.
//!
//! The loop reproduces the recorded gap between consecutive entries, except
//! when the gap is implausible: non-positive (clock resets, duplicate
//! timestamps) or at least `max_gap` (long idle periods).  Those gaps are
//! replaced by a short fixed `fallback` interval, so replay neither stalls
//! nor bursts.

use std::time::Duration;

use tracing::debug;

/// Default upper bound of a reproduced gap.
pub const DEFAULT_MAX_GAP: Duration = Duration::from_secs(10);
/// Default delay used in place of an implausible gap.
pub const DEFAULT_FALLBACK: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub max_gap: Duration,
    pub fallback: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            max_gap: DEFAULT_MAX_GAP,
            fallback: DEFAULT_FALLBACK,
        }
    }
}

impl Pacing {
    pub fn new(max_gap: Duration, fallback: Duration) -> Self {
        Self { max_gap, fallback }
    }

    /// Delay before dispatching an entry stamped `current`, given the
    /// timestamp of the previously dispatched entry (`None` for the first).
    pub fn delay(&self, previous: Option<f64>, current: f64) -> Duration {
        let Some(previous) = previous else {
            return Duration::ZERO;
        };
        let gap = current - previous;
        if gap > 0.0 && gap < self.max_gap.as_secs_f64() {
            Duration::from_secs_f64(gap)
        } else {
            debug!(gap, fallback_ms = self.fallback.as_millis() as u64, "using fallback pacing");
            self.fallback
        }
    }
}
