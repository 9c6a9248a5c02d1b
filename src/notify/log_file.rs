//! Append-only notification log

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use super::{AlertPayload, NotificationSink};
use crate::error::DispatchError;

/// Writes one JSON object per line and flushes after every alert
pub struct LogFileSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl LogFileSink {
    pub fn open(path: &Path) -> Result<Self, DispatchError> {
        let fail = |e: std::io::Error| DispatchError::Sink {
            sink: "log_file".to_string(),
            reason: format!("cannot open {:?}: {}", path, e),
        };

        // Create directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(fail)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(fail)?;

        info!("Notification log at {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, line: &str) -> Result<(), DispatchError> {
        let fail = |reason: String| DispatchError::Sink {
            sink: "log_file".to_string(),
            reason,
        };

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| fail("writer lock poisoned".to_string()))?;
        writeln!(writer, "{}", line).map_err(|e| fail(e.to_string()))?;
        writer.flush().map_err(|e| fail(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for LogFileSink {
    fn name(&self) -> &str {
        "log_file"
    }

    async fn publish(&self, payload: &AlertPayload) -> Result<(), DispatchError> {
        let line = serde_json::to_string(payload)?;
        self.write_line(&line)
    }

    async fn close(&self) -> Result<(), DispatchError> {
        let mut writer = self.writer.lock().map_err(|_| DispatchError::Sink {
            sink: "log_file".to_string(),
            reason: "writer lock poisoned".to_string(),
        })?;
        writer.flush().map_err(|e| DispatchError::Sink {
            sink: "log_file".to_string(),
            reason: e.to_string(),
        })
    }
}
