// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Rolling history of recent readings

use std::collections::VecDeque;
use chrono::Duration;

use crate::config::{AggregateKind, HistoryConfig};
use crate::sensors::Reading;

/// Fixed-capacity FIFO of the most recent readings.
///
/// By default the window is a count of cycles: it holds the last `capacity`
/// readings no matter how far apart they are. With a `max_age`, readings
/// older than `max_age` before the newest one are dropped as well, which turns
/// "last N points" into a real time-bounded window capped at N points.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    readings: VecDeque<Reading>,
    capacity: usize,
    max_age: Option<Duration>,
}

impl HistoryWindow {
    /// Count-based window. `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// An age too large to represent leaves the window count-based only
    pub fn from_config(config: &HistoryConfig) -> Self {
        let window = Self::new(config.capacity);
        match config
            .max_age_secs
            .and_then(|secs| Duration::from_std(std::time::Duration::from_secs(secs)).ok())
        {
            Some(max_age) => window.with_max_age(max_age),
            None => window,
        }
    }

    /// Append a reading, evicting from the front once over capacity
    pub fn add(&mut self, reading: Reading) {
        let newest = reading.timestamp();
        self.readings.push_back(reading);

        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }

        let cutoff = self.max_age.and_then(|age| newest.checked_sub_signed(age));
        if let Some(cutoff) = cutoff {
            while self
                .readings
                .front()
                .map_or(false, |r| r.timestamp() < cutoff)
            {
                self.readings.pop_front();
            }
        }
    }

    /// Sum of `field` across held readings. Missing or non-finite values
    /// count as zero.
    pub fn windowed_sum(&self, field: &str) -> f64 {
        self.readings
            .iter()
            .filter_map(|r| r.get(field))
            .filter(|v| v.is_finite())
            .sum()
    }

    /// Reduce `field` the way the decision config asks for
    pub fn aggregate(&self, field: &str, kind: AggregateKind) -> f64 {
        match kind {
            AggregateKind::Sum => self.windowed_sum(field),
            AggregateKind::Mean => self.windowed_mean(field).unwrap_or(0.0),
        }
    }

    /// Mean of `field` over the readings that carry a finite value
    pub fn windowed_mean(&self, field: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .readings
            .iter()
            .filter_map(|r| r.get(field))
            .filter(|v| v.is_finite())
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}
