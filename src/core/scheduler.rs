// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! Fixed-interval ingestion loop
//!
//! ```text
//!            timer fires, not cancelled
//!   Idle ───────────────────────────────► Running
//!    ▲                                       │
//!    └───────────────────────────────────────┘
//!        cycle done (ok: poll interval,
//!        failed: recovery interval)
//! ```
//!
//! One cycle runs to completion before the next starts, so the history
//! window and cooldown state need no locking. Cancellation is checked
//! before each cycle and cuts sleeps short, but never interrupts a cycle.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CooldownState, SchedulerStats};
use crate::config::SchedulerConfig;
use crate::db::{ReadingStore, RecordId};
use crate::decision::{Decision, DecisionEngine};
use crate::error::{CycleError, SourceError, StorageError};
use crate::history::HistoryWindow;
use crate::notify::{Ack, Dispatcher};
use crate::sensors::{Reading, ReadingSource};

/// Loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Sleeps and per-call bounds
#[derive(Debug, Clone, Copy)]
pub struct CycleTiming {
    pub poll_interval: Duration,
    pub recovery_interval: Duration,
    pub source_timeout: Duration,
    pub storage_timeout: Duration,
}

impl CycleTiming {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            recovery_interval: Duration::from_secs(config.recovery_sleep_secs),
            source_timeout: Duration::from_secs(config.source_timeout_secs),
            storage_timeout: Duration::from_secs(config.storage_timeout_secs),
        }
    }
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// Result of one successful cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub record_id: RecordId,
    pub decision: Decision,
    /// Present when an alert went out
    pub ack: Option<Ack>,
}

impl CycleReport {
    pub fn alerted(&self) -> bool {
        self.ack.is_some()
    }
}

/// Owns every per-cycle collaborator plus the history and cooldown state
pub struct Scheduler {
    source: Box<dyn ReadingSource>,
    store: Arc<dyn ReadingStore>,
    history: HistoryWindow,
    engine: DecisionEngine,
    dispatcher: Dispatcher,
    cooldown: CooldownState,
    timing: CycleTiming,
    publish_readings: bool,
    state: SchedulerState,
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(
        source: Box<dyn ReadingSource>,
        store: Arc<dyn ReadingStore>,
        history: HistoryWindow,
        engine: DecisionEngine,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            source,
            store,
            history,
            engine,
            dispatcher,
            cooldown: CooldownState::new(),
            timing: CycleTiming::default(),
            publish_readings: false,
            state: SchedulerState::Idle,
            stats: SchedulerStats::default(),
        }
    }

    /// Apply timings and the initial cooldown from config
    pub fn with_config(mut self, config: &SchedulerConfig) -> Self {
        self.timing = CycleTiming::from_config(config);
        if let Some(hours) = config.initial_hours_since_action {
            self.cooldown = CooldownState::hours_ago(hours, Utc::now());
        }
        self
    }

    pub fn with_timing(mut self, timing: CycleTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_cooldown(mut self, cooldown: CooldownState) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn publish_readings(mut self, enabled: bool) -> Self {
        self.publish_readings = enabled;
        self
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    pub fn cooldown(&self) -> &CooldownState {
        &self.cooldown
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run until `cancel` fires. Failed cycles are logged and followed by
    /// the recovery sleep; nothing here ends the loop except cancellation.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            "Scheduler started: source '{}', policy '{}', every {:?}",
            self.source.name(),
            self.engine.policy_name(),
            self.timing.poll_interval
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let pause = match self.run_cycle().await {
                Ok(_) => self.timing.poll_interval,
                Err(e) => {
                    error!(step = e.step(), "Cycle failed: {}", e);
                    self.timing.recovery_interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => break,
            }
        }

        info!(
            "Scheduler stopped after {} cycles ({} failed, {} alerts)",
            self.stats.cycles, self.stats.failed_cycles, self.stats.alerts_sent
        );
    }

    /// Execute exactly one cycle
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.state = SchedulerState::Running;
        let result = self.cycle().await;
        self.state = SchedulerState::Idle;

        self.stats.cycles += 1;
        self.stats.last_cycle_at = Some(Utc::now());
        match &result {
            Ok(report) if report.alerted() => self.stats.alerts_sent += 1,
            Ok(_) => {}
            Err(e) => {
                self.stats.failed_cycles += 1;
                self.stats.last_error = Some(format!("{}: {}", e.step(), e));
            }
        }

        result
    }

    async fn cycle(&mut self) -> Result<CycleReport, CycleError> {
        let reading = self.acquire().await?;
        let record_id = self.persist(&reading).await?;
        debug!("Stored reading {} {:?}", record_id, reading.measurements());

        if self.publish_readings {
            self.dispatcher.publish_reading(&reading).await;
        }

        self.history.add(reading.clone());

        let hours_since = self.cooldown.hours_since(Utc::now());
        let aggregate = self
            .history
            .aggregate(self.engine.aggregate_field(), self.engine.aggregate_kind());
        let decision = self.engine.evaluate(&reading, hours_since, aggregate)?;

        if !decision.triggered {
            debug!("No action: {}", decision.reason);
            return Ok(CycleReport {
                record_id,
                decision,
                ack: None,
            });
        }

        info!(
            "Decision triggered (confidence {:.2}): {}",
            decision.confidence, decision.reason
        );
        let ack = self.dispatcher.send(&decision, &reading).await?;

        let now = Utc::now();
        self.cooldown.record_action(now);
        self.source.on_action(now);

        if let Err(e) = self.mark_alert_sent(record_id).await {
            warn!("Alert sent but record {} not flagged: {}", record_id, e);
        }

        Ok(CycleReport {
            record_id,
            decision,
            ack: Some(ack),
        })
    }

    async fn acquire(&mut self) -> Result<Reading, SourceError> {
        let timeout = self.timing.source_timeout;
        let reading = match tokio::time::timeout(timeout, self.source.next()).await {
            Ok(result) => result?,
            Err(_) => return Err(SourceError::Timeout(timeout)),
        };

        if reading.is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(reading)
    }

    async fn persist(&self, reading: &Reading) -> Result<RecordId, StorageError> {
        let store = Arc::clone(&self.store);
        let reading = reading.clone();
        self.blocking(move || store.append(&reading)).await
    }

    async fn mark_alert_sent(&self, id: RecordId) -> Result<(), StorageError> {
        let store = Arc::clone(&self.store);
        self.blocking(move || store.mark_alert_sent(id)).await
    }

    /// Run a store call off the async workers, bounded by the storage timeout.
    /// A call that times out may still complete in the background.
    async fn blocking<T, F>(&self, call: F) -> Result<T, StorageError>
    where
        F: FnOnce() -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = self.timing.storage_timeout;
        match tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StorageError::Worker(join.to_string())),
            Err(_) => Err(StorageError::Timeout(timeout)),
        }
    }
}
