// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Configuration module

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::db::RESERVED_COLUMNS;
use crate::error::{is_valid_field_name, ConfigError};
use crate::notify::NotifyConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,

    /// Poll the simulated field station instead of a real source
    pub demo_mode: bool,

    /// Cycle timing
    pub scheduler: SchedulerConfig,

    /// Rolling history
    pub history: HistoryConfig,

    /// Decision rule
    pub decision: DecisionConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Notification sinks
    pub notify: NotifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            demo_mode: true,
            scheduler: SchedulerConfig::default(),
            history: HistoryConfig::default(),
            decision: DecisionConfig::default(),
            database: DatabaseConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("fieldwatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Check every section. Any error here is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.history.validate()?;
        self.decision.validate()?;
        self.database.validate()?;
        self.notify.validate()?;
        Ok(())
    }
}

fn positive(value: u64, key: &'static str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NotPositive { key });
    }
    Ok(())
}

fn unit_range(value: f64, key: &'static str) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfUnitRange { key, value });
    }
    Ok(())
}

/// Ten years; longer spans overflow timestamp arithmetic long before they
/// mean anything for a field deployment
const MAX_HOURS: f64 = 10.0 * 365.0 * 24.0;

fn bounded(value: f64, max: f64, key: &'static str) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 || value > max {
        return Err(ConfigError::OutOfRange { key, value, max });
    }
    Ok(())
}

fn field_name(name: &str) -> Result<(), ConfigError> {
    if !is_valid_field_name(name) {
        return Err(ConfigError::InvalidFieldName(name.to_string()));
    }
    Ok(())
}

/// Cycle timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between the end of one cycle and the start of the next
    pub poll_interval_secs: u64,

    /// Seconds to sleep after a failed cycle
    pub recovery_sleep_secs: u64,

    /// Upper bound for one reading source poll
    pub source_timeout_secs: u64,

    /// Upper bound for one store write
    pub storage_timeout_secs: u64,

    /// Pretend the last action happened this many hours before startup.
    /// Unset means no action has happened yet.
    pub initial_hours_since_action: Option<f64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            recovery_sleep_secs: 10,
            source_timeout_secs: 10,
            storage_timeout_secs: 5,
            initial_hours_since_action: None,
        }
    }
}

impl SchedulerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        positive(self.poll_interval_secs, "scheduler.poll_interval_secs")?;
        positive(self.recovery_sleep_secs, "scheduler.recovery_sleep_secs")?;
        positive(self.source_timeout_secs, "scheduler.source_timeout_secs")?;
        positive(self.storage_timeout_secs, "scheduler.storage_timeout_secs")?;
        if let Some(hours) = self.initial_hours_since_action {
            bounded(hours, MAX_HOURS, "scheduler.initial_hours_since_action")?;
        }
        Ok(())
    }
}

/// Rolling history.
///
/// The window holds the last `capacity` readings, i.e. a count of cycles.
/// Setting `max_age_secs` additionally drops readings older than that,
/// measured from the newest reading's timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub max_age_secs: Option<u64>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 24,
            max_age_secs: None,
        }
    }
}

impl HistoryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        positive(self.capacity as u64, "history.capacity")?;
        if let Some(age) = self.max_age_secs {
            positive(age, "history.max_age_secs")?;
            bounded(age as f64, MAX_HOURS * 3600.0, "history.max_age_secs")?;
        }
        Ok(())
    }
}

/// Which decision rule to run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Threshold,
    Scored,
}

/// How the aggregate field is reduced over the history window
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    /// Total, e.g. rainfall accumulated over the window
    #[default]
    Sum,
    /// Mean over readings that carry the field, 0 when none do
    Mean,
}

/// Upper limit for one monitored field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldThreshold {
    pub field: String,
    pub max: f64,
}

impl FieldThreshold {
    pub fn new(field: &str, max: f64) -> Self {
        Self {
            field: field.to_string(),
            max,
        }
    }
}

/// Banded confidence mapping for the scored policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoredConfig {
    /// Primary field; lower values mean action is more likely needed
    pub field: String,
    pub low_cut: f64,
    pub mid_cut: f64,
    pub high_confidence: f64,
    pub medium_confidence: f64,
    pub low_confidence: f64,
    /// Trigger when confidence is strictly above this
    pub decision_threshold: f64,
}

impl Default for ScoredConfig {
    fn default() -> Self {
        Self {
            field: "moisture".to_string(),
            low_cut: 30.0,
            mid_cut: 50.0,
            high_confidence: 0.8,
            medium_confidence: 0.5,
            low_confidence: 0.1,
            decision_threshold: 0.7,
        }
    }
}

impl ScoredConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        field_name(&self.field)?;
        // also rejects NaN cuts
        if !(self.low_cut < self.mid_cut) {
            return Err(ConfigError::CutsOutOfOrder {
                low_cut: self.low_cut,
                mid_cut: self.mid_cut,
            });
        }
        unit_range(self.high_confidence, "decision.scored.high_confidence")?;
        unit_range(self.medium_confidence, "decision.scored.medium_confidence")?;
        unit_range(self.low_confidence, "decision.scored.low_confidence")?;
        unit_range(self.decision_threshold, "decision.scored.decision_threshold")?;
        if self.high_confidence < self.medium_confidence || self.medium_confidence < self.low_confidence {
            return Err(ConfigError::ConfidencesOutOfOrder);
        }
        Ok(())
    }
}

/// Decision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub policy: PolicyKind,

    /// Field reduced over the history window and handed to the policy
    pub aggregate_field: String,

    pub aggregate: AggregateKind,

    /// Suppress triggers until this many hours passed since the last action
    pub min_hours_between_actions: Option<f64>,

    /// Used by the threshold policy, checked in order
    pub thresholds: Vec<FieldThreshold>,

    /// Used by the scored policy
    pub scored: ScoredConfig,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Threshold,
            aggregate_field: "rainfall".to_string(),
            aggregate: AggregateKind::Sum,
            min_hours_between_actions: None,
            thresholds: vec![
                FieldThreshold::new("temperature", 30.0),
                FieldThreshold::new("humidity", 80.0),
            ],
            scored: ScoredConfig::default(),
        }
    }
}

impl DecisionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        field_name(&self.aggregate_field)?;
        match self.policy {
            PolicyKind::Threshold => {
                if self.thresholds.is_empty() {
                    return Err(ConfigError::NoThresholds);
                }
                for t in &self.thresholds {
                    field_name(&t.field)?;
                }
            }
            PolicyKind::Scored => self.scored.validate()?,
        }
        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database path, `:memory:` for a private in-memory store
    pub path: PathBuf,

    /// Measurements that get their own column
    pub fields: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/fieldwatch.db"),
            fields: ["temperature", "humidity", "moisture", "soil_temp", "rainfall"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

impl DatabaseConfig {
    /// In-memory store with the given columns
    pub fn in_memory(fields: &[&str]) -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                key: "database.path",
                section: "database",
            });
        }
        // SQLite column names are case-insensitive
        let mut seen = HashSet::new();
        for field in &self.fields {
            field_name(field)?;
            let lower = field.to_ascii_lowercase();
            if RESERVED_COLUMNS.contains(&lower.as_str()) {
                return Err(ConfigError::InvalidFieldName(field.clone()));
            }
            if !seen.insert(lower) {
                return Err(ConfigError::DuplicateField(field.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_toml_round_trip_keeps_policy() {
        let mut config = Config::default();
        config.decision.policy = PolicyKind::Scored;
        config.history.max_age_secs = Some(86_400);

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed.decision.policy, PolicyKind::Scored);
        assert_eq!(parsed.history.max_age_secs, Some(86_400));
        assert_eq!(parsed.decision.thresholds, config.decision.thresholds);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [scheduler]
            poll_interval_secs = 60

            [decision]
            policy = "scored"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.scheduler.poll_interval_secs, 60);
        assert_eq!(parsed.scheduler.recovery_sleep_secs, 10);
        assert_eq!(parsed.decision.scored.decision_threshold, 0.7);
        assert_eq!(parsed.history.capacity, 24);
    }

    #[test]
    fn test_validation_rejections() {
        let mut config = Config::default();
        config.history.capacity = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive { key: "history.capacity" })
        );

        let mut config = Config::default();
        config.database.fields.push("soil temp".into());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFieldName(_))));

        let mut config = Config::default();
        config.database.fields.push("alert_sent".into());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFieldName(_))));

        let mut config = Config::default();
        config.decision.thresholds.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoThresholds));

        let mut config = Config::default();
        config.decision.policy = PolicyKind::Scored;
        config.decision.scored.mid_cut = 10.0;
        assert!(matches!(config.validate(), Err(ConfigError::CutsOutOfOrder { .. })));
    }

    #[test]
    fn test_rejects_unrepresentable_time_spans() {
        let mut config = Config::default();
        config.history.max_age_secs = Some(10_000_000_000_000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { key: "history.max_age_secs", .. })
        ));

        config.history.max_age_secs = Some(7 * 24 * 3600);
        assert_eq!(config.validate(), Ok(()));

        for hours in [f64::INFINITY, f64::NAN, -1.0, 1e9] {
            let mut config = Config::default();
            config.scheduler.initial_hours_since_action = Some(hours);
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::OutOfRange { key: "scheduler.initial_hours_since_action", .. })
                ),
                "hours = {}",
                hours
            );
        }

        let mut config = Config::default();
        config.scheduler.initial_hours_since_action = Some(23.0);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_scored_bands_must_be_monotone() {
        let mut config = Config::default();
        config.decision.policy = PolicyKind::Scored;
        config.decision.scored.low_confidence = 0.9;
        assert_eq!(config.validate(), Err(ConfigError::ConfidencesOutOfOrder));

        let mut config = Config::default();
        config.decision.policy = PolicyKind::Scored;
        config.decision.scored.low_cut = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::CutsOutOfOrder { .. })));
    }

    #[test]
    fn test_field_columns_compare_case_insensitively() {
        let mut config = Config::default();
        config.database.fields = vec!["ID".into()];
        assert_eq!(config.validate(), Err(ConfigError::InvalidFieldName("ID".into())));

        let mut config = Config::default();
        config.database.fields = vec!["temperature".into(), "Temperature".into()];
        assert_eq!(config.validate(), Err(ConfigError::DuplicateField("Temperature".into())));
    }

    #[test]
    fn test_aggregate_kind_from_toml() {
        let parsed: Config = toml::from_str(
            r#"
            [decision]
            aggregate = "mean"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.decision.aggregate, AggregateKind::Mean);
        assert_eq!(Config::default().decision.aggregate, AggregateKind::Sum);
    }
}
