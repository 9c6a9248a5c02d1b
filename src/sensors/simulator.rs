// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Simulated field station for demo mode

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand_distr::{Normal, Uniform};
use std::collections::BTreeMap;

use super::{Reading, ReadingSource};
use crate::error::SourceError;

/// Generates soil and air readings for a single plot.
///
/// Soil moisture dries out with simulated time since the last action and
/// recovers when the scheduler reports one through [`ReadingSource::on_action`].
/// Each reading advances the simulated clock by `hours_per_reading`.
pub struct SimulatedSource {
    id: String,
    rng: StdRng,
    hours_per_reading: f64,
    hours_since_action: f64,
    rain_probability: f64,
}

impl SimulatedSource {
    pub fn new(id: &str) -> Self {
        Self::with_rng(id, StdRng::from_entropy())
    }

    /// Deterministic generator for tests
    pub fn seeded(id: &str, seed: u64) -> Self {
        Self::with_rng(id, StdRng::seed_from_u64(seed))
    }

    fn with_rng(id: &str, rng: StdRng) -> Self {
        Self {
            id: id.to_string(),
            rng,
            hours_per_reading: 1.0,
            hours_since_action: 23.0,
            rain_probability: 0.1,
        }
    }

    pub fn hours_per_reading(mut self, hours: f64) -> Self {
        self.hours_per_reading = hours.max(0.0);
        self
    }

    fn jitter(&mut self, spread: f64) -> f64 {
        self.rng.sample(Uniform::new_inclusive(-spread, spread))
    }

    fn generate(&mut self) -> BTreeMap<String, f64> {
        let base_moisture = (80.0 - self.hours_since_action * 2.0).max(10.0);
        let moisture = base_moisture + self.jitter(5.0);
        let soil_temp = 22.0 + self.jitter(3.0);
        let temperature = 25.0 + self.jitter(5.0);
        let humidity = 60.0 + self.jitter(10.0);

        let rainfall = if self.rng.gen::<f64>() < self.rain_probability {
            self.rng.gen_range(0.0..5.0)
        } else {
            0.0
        };

        // small sensor noise on top of the ambient model
        let noise = Normal::new(0.0, 0.05).map(|n| self.rng.sample(n)).unwrap_or(0.0);

        let mut values = BTreeMap::new();
        values.insert("moisture".to_string(), round1(moisture + noise));
        values.insert("soil_temp".to_string(), round1(soil_temp));
        values.insert("temperature".to_string(), round1(temperature));
        values.insert("humidity".to_string(), round1(humidity));
        values.insert("rainfall".to_string(), round1(rainfall));
        values
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[async_trait]
impl ReadingSource for SimulatedSource {
    fn name(&self) -> &str {
        &self.id
    }

    async fn next(&mut self) -> Result<Reading, SourceError> {
        let values = self.generate();
        self.hours_since_action += self.hours_per_reading;
        Ok(Reading::new(values).with_sensor_id(self.id.clone()))
    }

    fn on_action(&mut self, _at: DateTime<Utc>) {
        self.hours_since_action = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_fields() {
        let mut source = SimulatedSource::seeded("plot-a", 7);
        let reading = source.next().await.unwrap();

        for field in ["moisture", "soil_temp", "temperature", "humidity", "rainfall"] {
            assert!(reading.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(reading.sensor_id(), Some("plot-a"));

        let rainfall = reading.get("rainfall").unwrap();
        assert!((0.0..=5.0).contains(&rainfall));
    }

    #[tokio::test]
    async fn test_action_restores_moisture() {
        let mut source = SimulatedSource::seeded("plot-a", 1).hours_per_reading(10.0);
        for _ in 0..6 {
            source.next().await.unwrap();
        }
        let dry = source.next().await.unwrap().get("moisture").unwrap();
        assert!(dry < 20.0, "expected dry soil, got {}", dry);

        source.on_action(Utc::now());
        let wet = source.next().await.unwrap().get("moisture").unwrap();
        assert!(wet > 70.0, "expected wet soil, got {}", wet);
    }
}
