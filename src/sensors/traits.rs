// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Reading type and the reading source trait

use std::collections::BTreeMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// One timestamped set of named measurements.
///
/// Fields are private: a reading is never mutated after it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sensor_id: Option<String>,
    measurements: BTreeMap<String, f64>,
}

impl Reading {
    /// Reading taken now
    pub fn new(measurements: BTreeMap<String, f64>) -> Self {
        Self::at(Utc::now(), measurements)
    }

    /// Reading taken at a given instant
    pub fn at(timestamp: DateTime<Utc>, measurements: BTreeMap<String, f64>) -> Self {
        Self {
            timestamp,
            sensor_id: None,
            measurements,
        }
    }

    /// Build from `(name, value)` pairs, timestamped now
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    pub fn with_sensor_id(mut self, sensor_id: impl Into<String>) -> Self {
        self.sensor_id = Some(sensor_id.into());
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn sensor_id(&self) -> Option<&str> {
        self.sensor_id.as_deref()
    }

    pub fn measurements(&self) -> &BTreeMap<String, f64> {
        &self.measurements
    }

    /// Value of a named measurement, if present
    pub fn get(&self, field: &str) -> Option<f64> {
        self.measurements.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

/// Anything that can produce one reading per poll: a local sensor, a
/// simulated generator or a remote telemetry feed.
#[async_trait]
pub trait ReadingSource: Send {
    /// Source name used in logs
    fn name(&self) -> &str;

    /// Produce the next reading.
    ///
    /// The scheduler bounds this call with a timeout, implementations do not
    /// need their own.
    async fn next(&mut self) -> Result<Reading, SourceError>;

    /// Called after an action was taken (alert dispatched). Sources that
    /// model a controlled environment can react to it.
    fn on_action(&mut self, _at: DateTime<Utc>) {}
}
