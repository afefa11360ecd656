//! Per-phase timings of the last world step.

use core::fmt::Write;
use std::time::{Duration, Instant};

use heapless::String;
use log::warn;

/// Capacity of [`StepProfile::summary`]: five lines of the longest label,
/// a full `u128` microsecond count and the separators.
pub const SUMMARY_CAPACITY: usize = 5 * ("narrowphase: ".len() + 39 + 1);

/// Phases of one internal tick, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Broadphase,
    Narrowphase,
    Solve,
    Integrate,
}

/// Wall-clock durations recorded while stepping with profiling enabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepProfile {
    pub broadphase: Duration,
    pub narrowphase: Duration,
    pub solve: Duration,
    pub integrate: Duration,
    /// Number of ticks recorded since creation.
    pub ticks: u64,
}

impl StepProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, phase: StepPhase, elapsed: Duration) {
        match phase {
            StepPhase::Broadphase => self.broadphase = elapsed,
            StepPhase::Narrowphase => self.narrowphase = elapsed,
            StepPhase::Solve => self.solve = elapsed,
            StepPhase::Integrate => self.integrate = elapsed,
        }
    }

    pub fn total(&self) -> Duration {
        self.broadphase + self.narrowphase + self.solve + self.integrate
    }

    /// One line per phase, durations in microseconds.
    pub fn summary(&self) -> String<SUMMARY_CAPACITY> {
        let mut text = String::new();
        for (label, d) in [
            ("broadphase", self.broadphase),
            ("narrowphase", self.narrowphase),
            ("solve", self.solve),
            ("integrate", self.integrate),
            ("total", self.total()),
        ] {
            if writeln!(text, "{}: {}", label, d.as_micros()).is_err() {
                warn!("profile summary truncated at {}", label);
                break;
            }
        }
        text
    }
}

/// Checkpoint timer feeding a [`StepProfile`]. Does nothing when disabled.
#[derive(Debug)]
pub(crate) struct PhaseTimer {
    last: Option<Instant>,
}

impl PhaseTimer {
    pub(crate) fn start(enabled: bool) -> Self {
        Self {
            last: enabled.then(Instant::now),
        }
    }

    /// Record the time since the previous checkpoint under `phase`.
    pub(crate) fn lap(&mut self, profile: &mut StepProfile, phase: StepPhase) {
        if let Some(last) = self.last {
            let now = Instant::now();
            profile.record(phase, now.duration_since(last));
            self.last = Some(now);
        }
    }

    /// Restart the checkpoint without recording, to leave out untimed work.
    pub(crate) fn discard(&mut self) {
        if self.last.is_some() {
            self.last = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_creation() {
        let p = StepProfile::new();
        assert_eq!(p.total(), Duration::ZERO);
        assert_eq!(p.ticks, 0);
    }

    #[test]
    fn test_summary_lists_phases() {
        let mut p = StepProfile::new();
        p.record(StepPhase::Solve, Duration::from_micros(250));
        let text = p.summary();
        assert!(text.contains("broadphase: 0"));
        assert!(text.contains("solve: 250"));
        assert!(text.contains("total: 250"));
    }

    #[test]
    fn test_summary_fits_longest_durations() {
        let mut p = StepProfile::new();
        for phase in [StepPhase::Broadphase, StepPhase::Narrowphase, StepPhase::Solve, StepPhase::Integrate] {
            p.record(phase, Duration::MAX / 8);
        }
        let text = p.summary();
        assert_eq!(text.lines().count(), 5);
        assert!(text.ends_with('\n'));
        assert!(text.contains("total: "));
    }

    #[test]
    fn test_timer_records_elapsed() {
        let mut p = StepProfile::new();
        let mut timer = PhaseTimer::start(true);
        std::thread::sleep(Duration::from_micros(100));
        timer.lap(&mut p, StepPhase::Broadphase);
        assert!(p.broadphase >= Duration::from_micros(100));
    }

    #[test]
    fn test_disabled_timer_records_nothing() {
        let mut p = StepProfile::new();
        let mut timer = PhaseTimer::start(false);
        std::thread::sleep(Duration::from_micros(100));
        timer.discard();
        timer.lap(&mut p, StepPhase::Narrowphase);
        assert_eq!(p.narrowphase, Duration::ZERO);
    }
}
