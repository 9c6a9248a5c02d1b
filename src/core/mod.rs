// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Core module - cycle scheduling and process lifecycle

mod engine;
mod scheduler;

pub use engine::Engine;
pub use scheduler::{CycleReport, CycleTiming, Scheduler, SchedulerState};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Time of the last action taken on a triggered decision.
///
/// Owned by the scheduler and only touched between cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CooldownState {
    last_action_time: Option<DateTime<Utc>>,
}

impl CooldownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State as if the last action happened `hours` before `now`. Spans
    /// that cannot be represented count as no action at all.
    pub fn hours_ago(hours: f64, now: DateTime<Utc>) -> Self {
        if !hours.is_finite() {
            return Self::new();
        }
        let last_action_time = std::time::Duration::try_from_secs_f64(hours.max(0.0) * 3600.0)
            .ok()
            .and_then(|offset| Duration::from_std(offset).ok())
            .and_then(|offset| now.checked_sub_signed(offset));

        Self { last_action_time }
    }

    pub fn last_action_time(&self) -> Option<DateTime<Utc>> {
        self.last_action_time
    }

    /// Hours elapsed since the last action, infinite if there was none
    pub fn hours_since(&self, now: DateTime<Utc>) -> f64 {
        match self.last_action_time {
            Some(at) => ((now - at).num_milliseconds() as f64 / 3_600_000.0).max(0.0),
            None => f64::INFINITY,
        }
    }

    pub fn record_action(&mut self, at: DateTime<Utc>) {
        self.last_action_time = Some(at);
    }
}

/// Running counters for the scheduler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub alerts_sent: u64,
    pub last_error: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hours_since() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();

        let mut state = CooldownState::new();
        assert!(state.hours_since(now).is_infinite());

        state.record_action(now - Duration::minutes(90));
        assert_eq!(state.hours_since(now), 1.5);

        let seeded = CooldownState::hours_ago(23.0, now);
        assert_eq!(seeded.hours_since(now), 23.0);
    }

    #[test]
    fn test_unrepresentable_offset_means_no_action() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();

        for hours in [f64::INFINITY, f64::NAN, 1e300] {
            let state = CooldownState::hours_ago(hours, now);
            assert!(state.last_action_time().is_none(), "hours = {}", hours);
            assert!(state.hours_since(now).is_infinite());
        }
        assert_eq!(CooldownState::hours_ago(-3.0, now).hours_since(now), 0.0);
    }

    #[test]
    fn test_clock_skew_is_clamped() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let mut state = CooldownState::new();
        state.record_action(now + Duration::hours(1));
        assert_eq!(state.hours_since(now), 0.0);
    }
}
