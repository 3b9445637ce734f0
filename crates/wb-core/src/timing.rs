//! Opt-in timing of period calculations.
//!
//! Turned on by the `WB_TIMING` environment variable or [`enable_timing`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);

pub fn enable_timing() {
    ENABLED.store(true, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed) || std::env::var_os("WB_TIMING").is_some()
}

/// Wall-clock timer that only reports when timing is enabled at start.
pub struct Timer {
    start: Option<Instant>,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: is_enabled().then(Instant::now),
        }
    }

    /// Elapsed seconds, or `None` when timing is off.
    pub fn stop(self) -> Option<f64> {
        self.start.map(|s| s.elapsed().as_secs_f64())
    }
}

/// Running count and total of timed calculations.
pub struct TimingStats {
    total_ns: AtomicU64,
    count: AtomicU64,
}

impl TimingStats {
    pub const fn new() -> Self {
        Self {
            total_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn record(&self, seconds: f64) {
        self.total_ns
            .fetch_add((seconds * 1e9) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn average_seconds(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.total_ns.load(Ordering::Relaxed) as f64 / 1e9 / n as f64,
        }
    }

    /// One-line report, `None` when nothing was recorded.
    pub fn summary(&self, what: &str) -> Option<String> {
        let count = self.count();
        (count > 0).then(|| {
            format!(
                "{}: {} in {:.3} ms average",
                what,
                count,
                self.average_seconds() * 1e3
            )
        })
    }
}

impl Default for TimingStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Periods computed from scratch (cache misses only).
pub static PERIOD_CALCULATIONS: TimingStats = TimingStats::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_average_and_summary() {
        let stats = TimingStats::new();
        assert_eq!(stats.summary("periods"), None);
        stats.record(0.002);
        stats.record(0.004);
        assert_eq!(stats.count(), 2);
        assert!((stats.average_seconds() - 0.003).abs() < 1e-9);
        assert_eq!(stats.summary("periods").unwrap(), "periods: 2 in 3.000 ms average");
    }

    #[test]
    fn enabled_timer_reports_elapsed() {
        enable_timing();
        assert!(Timer::start().stop().is_some());
    }
}
