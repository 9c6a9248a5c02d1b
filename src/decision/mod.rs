// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Decision module - alerting rules over the current reading and history
//!
//! A [`DecisionPolicy`] is a pure function of the reading and a couple of
//! derived inputs. Two policies ship: [`ThresholdPolicy`] (any field above
//! its limit) and [`ScoredPolicy`] (banded confidence against a decision
//! threshold). Anything implementing the trait, a real predictive model
//! included, can be dropped into [`DecisionEngine`] without touching the
//! scheduler.

mod threshold;
mod scored;

pub use threshold::ThresholdPolicy;
pub use scored::ScoredPolicy;

use serde::{Deserialize, Serialize};

use crate::config::{AggregateKind, DecisionConfig, PolicyKind};
use crate::error::DecisionError;
use crate::sensors::Reading;

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub triggered: bool,
    /// In [0, 1]
    pub confidence: f64,
    pub reason: String,
}

impl Decision {
    pub fn trigger(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            triggered: true,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }

    pub fn hold(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            triggered: false,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }
}

/// Features derived by the scheduler for one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionInputs {
    /// Hours since the last action, infinite if none was ever taken
    pub hours_since_last_action: f64,
    /// Sum or mean of the aggregate field over the history window
    pub windowed_aggregate: f64,
}

/// A decision rule
pub trait DecisionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, reading: &Reading, inputs: &DecisionInputs) -> Result<Decision, DecisionError>;
}

/// Finite value of a monitored field
pub(crate) fn finite_field(reading: &Reading, field: &str) -> Result<f64, DecisionError> {
    let value = reading
        .get(field)
        .ok_or_else(|| DecisionError::MissingField(field.to_string()))?;

    if !value.is_finite() {
        return Err(DecisionError::InvalidValue {
            field: field.to_string(),
            value,
        });
    }
    Ok(value)
}

/// Runs the configured policy and applies the optional cooldown gate.
///
/// Never touches the cooldown state itself; the scheduler passes in the
/// hours since the last action and records new actions.
pub struct DecisionEngine {
    policy: Box<dyn DecisionPolicy>,
    aggregate_field: String,
    aggregate_kind: AggregateKind,
    min_hours_between_actions: Option<f64>,
}

impl DecisionEngine {
    pub fn new(policy: Box<dyn DecisionPolicy>, aggregate_field: &str) -> Self {
        Self {
            policy,
            aggregate_field: aggregate_field.to_string(),
            aggregate_kind: AggregateKind::Sum,
            min_hours_between_actions: None,
        }
    }

    pub fn from_config(config: &DecisionConfig) -> Self {
        let policy: Box<dyn DecisionPolicy> = match config.policy {
            PolicyKind::Threshold => Box::new(ThresholdPolicy::new(config.thresholds.clone())),
            PolicyKind::Scored => Box::new(ScoredPolicy::new(config.scored.clone())),
        };

        let mut engine = Self::new(policy, &config.aggregate_field).with_aggregate(config.aggregate);
        engine.min_hours_between_actions = config.min_hours_between_actions;
        engine
    }

    pub fn with_aggregate(mut self, kind: AggregateKind) -> Self {
        self.aggregate_kind = kind;
        self
    }

    pub fn with_cooldown(mut self, min_hours: f64) -> Self {
        self.min_hours_between_actions = Some(min_hours);
        self
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Field the scheduler reduces over the history window
    pub fn aggregate_field(&self) -> &str {
        &self.aggregate_field
    }

    pub fn aggregate_kind(&self) -> AggregateKind {
        self.aggregate_kind
    }

    pub fn evaluate(
        &self,
        reading: &Reading,
        hours_since_last_action: f64,
        windowed_aggregate: f64,
    ) -> Result<Decision, DecisionError> {
        let inputs = DecisionInputs {
            hours_since_last_action,
            windowed_aggregate,
        };
        let decision = self.policy.evaluate(reading, &inputs)?;

        match self.min_hours_between_actions {
            Some(min) if decision.triggered && hours_since_last_action < min => Ok(Decision::hold(
                decision.confidence,
                format!(
                    "cooldown active ({:.1}h since last action, {:.1}h required): {}",
                    hours_since_last_action, min, decision.reason
                ),
            )),
            _ => Ok(decision),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldThreshold;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(
            Box::new(ThresholdPolicy::new(vec![FieldThreshold::new("temperature", 30.0)])),
            "rainfall",
        )
    }

    #[test]
    fn test_engine_passes_through() {
        let reading = Reading::from_pairs([("temperature", 35.0)]);
        let decision = engine().evaluate(&reading, f64::INFINITY, 0.0).unwrap();
        assert!(decision.triggered);
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn test_cooldown_gate() {
        let engine = engine().with_cooldown(6.0);
        let reading = Reading::from_pairs([("temperature", 35.0)]);

        let held = engine.evaluate(&reading, 2.0, 0.0).unwrap();
        assert!(!held.triggered);
        assert!(held.reason.starts_with("cooldown active"));

        let fired = engine.evaluate(&reading, 6.5, 0.0).unwrap();
        assert!(fired.triggered);

        let never = engine.evaluate(&reading, f64::INFINITY, 0.0).unwrap();
        assert!(never.triggered);
    }

    #[test]
    fn test_from_config_picks_policy() {
        let mut config = DecisionConfig::default();
        assert_eq!(DecisionEngine::from_config(&config).policy_name(), "threshold");

        config.policy = PolicyKind::Scored;
        config.aggregate = AggregateKind::Mean;
        let engine = DecisionEngine::from_config(&config);
        assert_eq!(engine.policy_name(), "scored");
        assert_eq!(engine.aggregate_field(), "rainfall");
        assert_eq!(engine.aggregate_kind(), AggregateKind::Mean);
    }

    #[test]
    fn test_finite_field() {
        let reading = Reading::from_pairs([("moisture", f64::NAN)]);
        assert_eq!(
            finite_field(&reading, "humidity"),
            Err(DecisionError::MissingField("humidity".into()))
        );
        assert!(matches!(
            finite_field(&reading, "moisture"),
            Err(DecisionError::InvalidValue { .. })
        ));
    }
}
