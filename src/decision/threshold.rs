//! Simple threshold policy

use super::{finite_field, Decision, DecisionInputs, DecisionPolicy};
use crate::config::FieldThreshold;
use crate::error::DecisionError;
use crate::sensors::Reading;

/// Triggers when any monitored field is strictly above its limit.
///
/// Confidence carries no information here: 1.0 when triggered, 0.0 otherwise.
pub struct ThresholdPolicy {
    thresholds: Vec<FieldThreshold>,
}

impl ThresholdPolicy {
    pub fn new(thresholds: Vec<FieldThreshold>) -> Self {
        Self { thresholds }
    }
}

impl DecisionPolicy for ThresholdPolicy {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn evaluate(&self, reading: &Reading, _inputs: &DecisionInputs) -> Result<Decision, DecisionError> {
        // every monitored field must be readable before anything fires
        let values = self
            .thresholds
            .iter()
            .map(|t| finite_field(reading, &t.field).map(|v| (t, v)))
            .collect::<Result<Vec<_>, _>>()?;

        let exceeded: Vec<String> = values
            .iter()
            .filter(|(t, v)| *v > t.max)
            .map(|(t, v)| format!("{} {} exceeds threshold {}", t.field, v, t.max))
            .collect();

        if exceeded.is_empty() {
            Ok(Decision::hold(0.0, "all monitored fields within thresholds"))
        } else {
            Ok(Decision::trigger(1.0, exceeded.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ThresholdPolicy {
        ThresholdPolicy::new(vec![
            FieldThreshold::new("temperature", 30.0),
            FieldThreshold::new("humidity", 80.0),
        ])
    }

    fn inputs() -> DecisionInputs {
        DecisionInputs {
            hours_since_last_action: f64::INFINITY,
            windowed_aggregate: 0.0,
        }
    }

    fn eval(temperature: f64, humidity: f64) -> Decision {
        let reading = Reading::from_pairs([("temperature", temperature), ("humidity", humidity)]);
        policy().evaluate(&reading, &inputs()).unwrap()
    }

    #[test]
    fn test_strict_inequality_temperature() {
        let at = eval(30.0, 50.0);
        assert!(!at.triggered);
        assert_eq!(at.confidence, 0.0);

        let above = eval(30.0 + 1e-9, 50.0);
        assert!(above.triggered);
        assert_eq!(above.confidence, 1.0);
    }

    #[test]
    fn test_strict_inequality_humidity() {
        assert!(!eval(25.0, 80.0).triggered);
        assert!(eval(25.0, 80.0 + 1e-9).triggered);
    }

    #[test]
    fn test_reason_names_fields() {
        let decision = eval(31.0, 85.0);
        assert_eq!(
            decision.reason,
            "temperature 31 exceeds threshold 30; humidity 85 exceeds threshold 80"
        );
    }

    #[test]
    fn test_missing_or_nan_does_not_trigger() {
        let reading = Reading::from_pairs([("temperature", 45.0)]);
        assert_eq!(
            policy().evaluate(&reading, &inputs()),
            Err(DecisionError::MissingField("humidity".into()))
        );

        let reading = Reading::from_pairs([("temperature", 45.0), ("humidity", f64::NAN)]);
        assert!(matches!(
            policy().evaluate(&reading, &inputs()),
            Err(DecisionError::InvalidValue { .. })
        ));
    }
}
