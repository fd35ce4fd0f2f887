// Path: crates/consensus/src/timeout.rs
//! Adaptive per-phase timeouts (§4.3.5): `T_p = base * 2^k`, clamped to
//! `[T_min, T_max]`, where `base` tracks an EWMA over recent successful
//! phase durations and `k` counts consecutive view changes at a height.

use std::time::Duration;

/// EWMA smoothing factor. Fixed rather than configurable: the window size
/// (`ewma_window`) governs effective smoothing already via the caller's
/// sampling cadence, and a second tunable here would just let the two
/// fight each other.
const EWMA_ALPHA: f64 = 0.2;

/// Tracks the adaptive timeout for one replica's consensus phases.
#[derive(Debug, Clone)]
pub struct AdaptiveTimeout {
    base_ms: f64,
    t_min_ms: u64,
    t_max_ms: u64,
    consecutive_view_changes: u32,
}

impl AdaptiveTimeout {
    /// Builds a tracker seeded at `initial_base_ms`, clamped to `[t_min_ms, t_max_ms]`.
    pub fn new(initial_base_ms: u64, t_min_ms: u64, t_max_ms: u64) -> Self {
        Self { base_ms: initial_base_ms as f64, t_min_ms, t_max_ms, consecutive_view_changes: 0 }
    }

    /// The current timeout for the `k`th consecutive view change at a height.
    pub fn current(&self) -> Duration {
        let scaled = self.base_ms * 2f64.powi(self.consecutive_view_changes as i32);
        let clamped = scaled.clamp(self.t_min_ms as f64, self.t_max_ms as f64);
        Duration::from_millis(clamped as u64)
    }

    /// Records a phase timing out, escalating `k` for the next attempt.
    pub fn on_timeout(&mut self) {
        self.consecutive_view_changes = self.consecutive_view_changes.saturating_add(1);
    }

    /// Records a successful phase of `elapsed`, folding it into the EWMA
    /// base and resetting the view-change backoff.
    pub fn on_success(&mut self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.base_ms = EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * self.base_ms;
        self.consecutive_view_changes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_doubles_per_consecutive_view_change() {
        let mut t = AdaptiveTimeout::new(100, 50, 10_000);
        let first = t.current();
        t.on_timeout();
        let second = t.current();
        t.on_timeout();
        let third = t.current();
        assert_eq!(second, first * 2);
        assert_eq!(third, first * 4);
    }

    #[test]
    fn success_resets_backoff() {
        let mut t = AdaptiveTimeout::new(100, 50, 10_000);
        t.on_timeout();
        t.on_timeout();
        assert!(t.current() > Duration::from_millis(100));
        t.on_success(Duration::from_millis(100));
        assert_eq!(t.current(), Duration::from_millis(100));
    }

    #[test]
    fn timeout_is_clamped_to_t_max() {
        let mut t = AdaptiveTimeout::new(1000, 50, 2000);
        for _ in 0..10 {
            t.on_timeout();
        }
        assert_eq!(t.current(), Duration::from_millis(2000));
    }

    #[test]
    fn timeout_is_clamped_to_t_min() {
        let t = AdaptiveTimeout::new(10, 500, 10_000);
        assert_eq!(t.current(), Duration::from_millis(500));
    }
}
