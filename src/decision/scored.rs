//! Scored policy: banded confidence against a decision threshold

use super::{finite_field, Decision, DecisionInputs, DecisionPolicy};
use crate::config::ScoredConfig;
use crate::error::DecisionError;
use crate::sensors::Reading;

/// Maps the primary field to a confidence that action is needed.
///
/// Lower values mean higher confidence:
///
/// ```text
///   value <  low_cut            -> high_confidence
///   low_cut <= value < mid_cut  -> medium_confidence
///   value >= mid_cut            -> low_confidence
/// ```
///
/// Triggers when the confidence is strictly above `decision_threshold`.
/// History and recency inputs are accepted but not used by the banding; a
/// model that wants them can implement [`DecisionPolicy`] directly.
pub struct ScoredPolicy {
    config: ScoredConfig,
}

impl ScoredPolicy {
    pub fn new(config: ScoredConfig) -> Self {
        Self { config }
    }

    /// Confidence band for a primary field value
    pub fn score(&self, value: f64) -> f64 {
        let c = &self.config;
        if value < c.low_cut {
            c.high_confidence
        } else if value < c.mid_cut {
            c.medium_confidence
        } else {
            c.low_confidence
        }
    }
}

impl DecisionPolicy for ScoredPolicy {
    fn name(&self) -> &'static str {
        "scored"
    }

    fn evaluate(&self, reading: &Reading, _inputs: &DecisionInputs) -> Result<Decision, DecisionError> {
        let field = &self.config.field;
        let value = finite_field(reading, field)?;
        let confidence = self.score(value);
        let threshold = self.config.decision_threshold;

        if confidence > threshold {
            Ok(Decision::trigger(
                confidence,
                format!(
                    "{} {} gives confidence {:.2} above decision threshold {:.2}",
                    field, value, confidence, threshold
                ),
            ))
        } else {
            Ok(Decision::hold(
                confidence,
                format!(
                    "{} {} gives confidence {:.2}, decision threshold {:.2} not reached",
                    field, value, confidence, threshold
                ),
            ))
        }
    }
}
