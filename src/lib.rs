// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! FieldWatch - Sensor Ingestion and Alerting Pipeline
//!
//! Polls a reading source on a fixed interval and, for every reading:
//! - persists it durably before anything else looks at it
//! - appends it to a bounded rolling history
//! - evaluates a threshold or scored decision rule
//! - publishes an alert (MQTT, webhook, log file) when the rule triggers
//! - flags the stored record once the alert is acknowledged
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     FieldWatch Engine                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌──────────┐  ┌───────────┐  ┌────────────┐  │
//! │  │ Reading │→ │ Database │→ │ Decision  │→ │ Dispatcher │  │
//! │  │ Source  │  │ (SQLite) │  │ Engine    │  │ (sinks)    │  │
//! │  └─────────┘  └──────────┘  └───────────┘  └────────────┘  │
//! │       ↑            ↓             ↑              ↓          │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │       Scheduler (history window, cooldown)          │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failure in any step ends that cycle only. The scheduler logs it,
//! sleeps for the recovery interval and polls again.

pub mod config;
pub mod core;
pub mod db;
pub mod decision;
pub mod error;
pub mod history;
pub mod notify;
pub mod sensors;

// Re-exports for convenience
pub use config::Config;
pub use crate::core::{CooldownState, CycleReport, Engine, Scheduler};
pub use db::{Database, ReadingStore, RecordId};
pub use decision::{Decision, DecisionEngine, DecisionPolicy, ScoredPolicy, ThresholdPolicy};
pub use error::{ConfigError, CycleError, DecisionError, DispatchError, SourceError, StorageError};
pub use history::HistoryWindow;
pub use notify::{AlertPayload, Dispatcher, NotificationSink};
pub use sensors::{JsonLinesSource, Reading, ReadingSource, SimulatedSource};

/// FieldWatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// FieldWatch name
pub const NAME: &str = "FieldWatch";
