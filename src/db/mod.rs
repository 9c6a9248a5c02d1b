// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Database module for persistent storage
//!
//! Readings are stored append-only in a single `readings` table. Every
//! configured measurement gets its own `REAL` column and the full measurement
//! map is kept as JSON in `data`. The only in-place update is the one-shot
//! `alert_sent` flag.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::StorageError;
use crate::sensors::Reading;

/// Column names owned by the schema itself
pub const RESERVED_COLUMNS: &[&str] = &["id", "timestamp", "sensor_id", "data", "alert_sent"];

/// Identifier of a stored reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Durable, append-only storage for readings
pub trait ReadingStore: Send + Sync {
    /// Create the storage target if absent. Safe to call on every startup.
    fn initialize(&self) -> Result<(), StorageError>;

    /// Write a new record with `alert_sent = false`, committed before returning
    fn append(&self, reading: &Reading) -> Result<RecordId, StorageError>;

    /// Flag a record as alerted. A record is flagged at most once.
    fn mark_alert_sent(&self, id: RecordId) -> Result<(), StorageError>;
}

/// SQLite-backed reading store
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    config: DatabaseConfig,
}

impl Database {
    /// Open or create the database file. Call [`ReadingStore::initialize`]
    /// before writing.
    pub fn open(config: &DatabaseConfig) -> Result<Self, StorageError> {
        // Create parent directories
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;

        info!("Database opened at {:?}", config.path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
        })
    }

    /// Open and initialize in one step
    pub fn open_initialized(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let db = Self::open(config)?;
        db.initialize()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn insert_sql(&self) -> String {
        let mut columns = vec!["timestamp".to_string(), "sensor_id".to_string(), "data".to_string()];
        columns.extend(self.config.fields.iter().map(|f| format!("\"{}\"", f)));

        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO readings ({}) VALUES ({})",
            columns.join(", "),
            placeholders
        )
    }

    /// Fetch one record by id
    pub fn get(&self, id: RecordId) -> Result<Option<StoredRecord>, StorageError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, sensor_id, data, alert_sent FROM readings WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.0])?;

        match rows.next()? {
            Some(row) => Ok(Some(StoredRecord::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Most recent records, oldest first
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredRecord>, StorageError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, sensor_id, data, alert_sent FROM readings
             ORDER BY id DESC LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(StoredRecord::from_row(row)?);
        }
        results.reverse();

        Ok(results)
    }

    /// Number of stored readings
    pub fn count(&self) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of readings flagged as alerted
    pub fn alert_count(&self) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM readings WHERE alert_sent = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DatabaseStats, StorageError> {
        let record_count = self.count()?;
        let alerts_sent = self.alert_count()?;

        let conn = self.lock()?;
        let size_bytes: i64 = conn
            .query_row(
                "SELECT page_count * page_size as size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(DatabaseStats {
            record_count,
            alerts_sent,
            size_bytes: size_bytes as u64,
        })
    }
}

impl ReadingStore for Database {
    fn initialize(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                sensor_id TEXT,
                data TEXT NOT NULL,
                alert_sent INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings(timestamp);
            "#,
        )?;

        let existing: HashSet<String> = {
            let mut stmt = tx.prepare("SELECT name FROM pragma_table_info('readings')")?;
            let names = stmt.query_map([], |row| row.get::<_, String>(0).map(|n| n.to_ascii_lowercase()))?;
            names.collect::<Result<_, _>>()?
        };

        for field in &self.config.fields {
            if !existing.contains(&field.to_ascii_lowercase()) {
                tx.execute_batch(&format!("ALTER TABLE readings ADD COLUMN \"{}\" REAL", field))?;
                debug!("Added column '{}'", field);
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn append(&self, reading: &Reading) -> Result<RecordId, StorageError> {
        let data = serde_json::to_string(reading.measurements())?;

        let mut values = vec![
            Value::Text(reading.timestamp().to_rfc3339()),
            reading
                .sensor_id()
                .map(|s| Value::Text(s.to_string()))
                .unwrap_or(Value::Null),
            Value::Text(data),
        ];
        for field in &self.config.fields {
            values.push(reading.get(field).map(Value::Real).unwrap_or(Value::Null));
        }

        let conn = self.lock()?;
        conn.execute(&self.insert_sql(), params_from_iter(values.iter()))?;

        Ok(RecordId(conn.last_insert_rowid()))
    }

    fn mark_alert_sent(&self, id: RecordId) -> Result<(), StorageError> {
        let conn = self.lock()?;

        let updated = conn.execute(
            "UPDATE readings SET alert_sent = 1 WHERE id = ?1 AND alert_sent = 0",
            params![id.0],
        )?;

        if updated == 0 {
            return Err(StorageError::NotFound(id.0));
        }
        Ok(())
    }
}

/// A reading as stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub timestamp: String,
    pub sensor_id: Option<String>,
    pub measurements: BTreeMap<String, f64>,
    pub alert_sent: bool,
}

impl StoredRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> Result<Self, StorageError> {
        let data: String = row.get(3)?;
        // non-finite values were written as JSON null
        let raw: BTreeMap<String, Option<f64>> = serde_json::from_str(&data)?;

        Ok(Self {
            id: RecordId(row.get(0)?),
            timestamp: row.get(1)?,
            sensor_id: row.get(2)?,
            measurements: raw
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
            alert_sent: row.get::<_, i64>(4)? != 0,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseStats {
    pub record_count: usize,
    pub alerts_sent: usize,
    pub size_bytes: u64,
}
