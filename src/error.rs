// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Error taxonomy for the ingestion pipeline
//!
//! Every step of a cycle has its own error type. [`CycleError`] wraps the
//! cycle-local kinds so the scheduler can log which step failed and carry on.
//! [`ConfigError`] is the only kind that stops the process, and only at startup.

use std::time::Duration;
use thiserror::Error;

/// Reading source failures
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading source '{0}' is unavailable: {1}")]
    Unavailable(String, String),

    #[error("reading source timed out after {0:?}")]
    Timeout(Duration),

    #[error("reading source returned an empty reading")]
    Empty,
}

/// Persistence store failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode measurements: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("record {0} not found or already flagged")]
    NotFound(i64),

    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage worker failed: {0}")]
    Worker(String),

    #[error("store connection is poisoned")]
    Poisoned,
}

/// Decision engine failures: the reading cannot be judged
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecisionError {
    #[error("reading has no '{0}' measurement")]
    MissingField(String),

    #[error("measurement '{field}' is not a finite number ({value})")]
    InvalidValue { field: String, value: f64 },
}

/// Notification dispatch failures
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("sink '{sink}' failed: {reason}")]
    Sink { sink: String, reason: String },

    #[error("sink '{sink}' timed out after {timeout:?}")]
    Timeout { sink: String, timeout: Duration },

    #[error("all sinks failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("failed to encode alert payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Invalid configuration, fatal at startup
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be greater than zero")]
    NotPositive { key: &'static str },

    #[error("{key} must be within [0, 1], got {value}")]
    OutOfUnitRange { key: &'static str, value: f64 },

    #[error("invalid measurement field name '{0}'")]
    InvalidFieldName(String),

    #[error("threshold policy needs at least one threshold")]
    NoThresholds,

    #[error("scored policy cuts must satisfy low_cut < mid_cut (got {low_cut} >= {mid_cut})")]
    CutsOutOfOrder { low_cut: f64, mid_cut: f64 },

    #[error("{key} is required when {section} is enabled")]
    Missing { key: &'static str, section: &'static str },

    #[error("{key} must be a finite number within [0, {max}], got {value}")]
    OutOfRange { key: &'static str, value: f64, max: f64 },

    #[error("scored policy confidences must satisfy high >= medium >= low")]
    ConfidencesOutOfOrder,

    #[error("measurement field '{0}' is listed more than once")]
    DuplicateField(String),
}

/// A failed cycle, tagged with the step that failed
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl CycleError {
    /// Name of the pipeline step that produced the error
    pub fn step(&self) -> &'static str {
        match self {
            CycleError::Source(_) => "acquire",
            CycleError::Storage(_) => "persist",
            CycleError::Decision(_) => "evaluate",
            CycleError::Dispatch(_) => "dispatch",
        }
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, the names usable as SQL columns
pub fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names() {
        assert!(is_valid_field_name("soil_temp"));
        assert!(is_valid_field_name("_x1"));
        assert!(!is_valid_field_name("1abc"));
        assert!(!is_valid_field_name("rain fall"));
        assert!(!is_valid_field_name("x;DROP"));
        assert!(!is_valid_field_name(""));
    }

    #[test]
    fn test_cycle_error_step() {
        let err: CycleError = SourceError::Empty.into();
        assert_eq!(err.step(), "acquire");

        let err: CycleError = DecisionError::MissingField("moisture".into()).into();
        assert_eq!(err.step(), "evaluate");
        assert_eq!(err.to_string(), "reading has no 'moisture' measurement");
    }
}
