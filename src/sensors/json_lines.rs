//! Line-delimited JSON reading source
//!
//! Each non-blank line is one reading:
//!
//! ```text
//! {"timestamp": "2026-05-01T12:00:00Z", "sensor_id": "plot-3", "moisture": 18.5, "rainfall": 0.0}
//! ```
//!
//! `timestamp` and `sensor_id` are optional; every other key must carry a
//! number. A missing timestamp means "now".

use std::collections::BTreeMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::debug;

use super::{Reading, ReadingSource};
use crate::error::SourceError;

#[derive(Debug, Deserialize)]
struct LineRecord {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    sensor_id: Option<String>,
    #[serde(flatten)]
    measurements: BTreeMap<String, f64>,
}

/// Reads one reading per line from any buffered async reader (stdin, a
/// file, a socket)
pub struct JsonLinesSource<R> {
    name: String,
    lines: Lines<R>,
    line_no: u64,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            lines: reader.lines(),
            line_no: 0,
        }
    }

    fn unavailable(&self, reason: String) -> SourceError {
        SourceError::Unavailable(self.name.clone(), reason)
    }
}

impl JsonLinesSource<tokio::io::BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new("stdin", tokio::io::BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ReadingSource for JsonLinesSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next(&mut self) -> Result<Reading, SourceError> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Err(self.unavailable("end of input".to_string())),
                Err(e) => return Err(self.unavailable(e.to_string())),
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let record: LineRecord = serde_json::from_str(line)
                .map_err(|e| self.unavailable(format!("line {}: {}", self.line_no, e)))?;
            debug!("Parsed line {} from {}", self.line_no, self.name);

            let reading = Reading::at(record.timestamp.unwrap_or_else(Utc::now), record.measurements);
            return Ok(match record.sensor_id {
                Some(id) => reading.with_sensor_id(id),
                None => reading,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source(input: &'static str) -> JsonLinesSource<&'static [u8]> {
        JsonLinesSource::new("test", input.as_bytes())
    }

    #[tokio::test]
    async fn test_parses_lines() {
        let mut src = source(
            "{\"timestamp\":\"2026-05-01T12:00:00Z\",\"sensor_id\":\"plot-3\",\"moisture\":18.5}\n\
             \n\
             {\"temperature\":31,\"humidity\":50.5}\n",
        );

        let first = src.next().await.unwrap();
        assert_eq!(first.timestamp(), Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap());
        assert_eq!(first.sensor_id(), Some("plot-3"));
        assert_eq!(first.get("moisture"), Some(18.5));
        assert_eq!(first.len(), 1);

        let second = src.next().await.unwrap();
        assert_eq!(second.get("temperature"), Some(31.0));
        assert_eq!(second.sensor_id(), None);
    }

    #[tokio::test]
    async fn test_end_of_input_is_unavailable() {
        let mut src = source("");
        assert!(matches!(src.next().await, Err(SourceError::Unavailable(_, _))));
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_stop_source() {
        let mut src = source("{\"moisture\": \"wet\"}\n{\"moisture\": 40}\n");

        let err = src.next().await.unwrap_err();
        assert!(err.to_string().contains("line 1"));

        assert_eq!(src.next().await.unwrap().get("moisture"), Some(40.0));
    }
}
