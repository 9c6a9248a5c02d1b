//! Process-scoped resources: store, notification transports and the scheduler

use std::sync::Arc;
use std::time::Instant;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{CycleReport, Scheduler, SchedulerStats};
use crate::config::Config;
use crate::db::{Database, ReadingStore};
use crate::decision::DecisionEngine;
use crate::history::HistoryWindow;
use crate::notify::Dispatcher;
use crate::sensors::ReadingSource;

/// Owns the database connection and the notification transports for the
/// lifetime of the process.
///
/// Both are opened once in [`Engine::start`] and released in
/// [`Engine::shutdown`]. A startup failure releases whatever was opened
/// before it.
pub struct Engine {
    pub config: Arc<Config>,
    db: Database,
    scheduler: Scheduler,
    start_time: Option<Instant>,
}

impl Engine {
    pub async fn start(config: Config, source: Box<dyn ReadingSource>) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        info!("Starting FieldWatch engine...");

        let db = Database::open(&config.database).context("failed to open database")?;
        db.initialize().context("failed to initialize database")?;

        // db is dropped, and its connection closed, if this fails
        let dispatcher = Dispatcher::from_config(&config.notify)
            .await
            .context("failed to open notification transport")?;
        info!("Notification sinks: {:?}", dispatcher.sink_names());

        let scheduler = Scheduler::new(
            source,
            Arc::new(db.clone()),
            HistoryWindow::from_config(&config.history),
            DecisionEngine::from_config(&config.decision),
            dispatcher,
        )
        .with_config(&config.scheduler)
        .publish_readings(config.notify.publish_readings);

        Ok(Self {
            config: Arc::new(config),
            db,
            scheduler,
            start_time: None,
        })
    }

    /// Run the loop until cancelled, then release resources
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SchedulerStats> {
        self.start_time = Some(Instant::now());
        self.scheduler.run(cancel).await;
        self.shutdown().await;
        Ok(self.scheduler.stats().clone())
    }

    /// Run a single cycle, then release resources
    pub async fn run_once(mut self) -> Result<CycleReport> {
        self.start_time = Some(Instant::now());
        let result = self.scheduler.run_cycle().await;
        self.shutdown().await;
        result.with_context(|| "cycle failed".to_string())
    }

    pub async fn shutdown(&self) {
        info!("Stopping FieldWatch engine...");
        self.scheduler.dispatcher().shutdown().await;

        match self.db.stats() {
            Ok(stats) => info!(
                "Store holds {} readings, {} alerted, {} bytes",
                stats.record_count, stats.alerts_sent, stats.size_bytes
            ),
            Err(e) => warn!("Could not read store stats: {}", e),
        }
        info!("FieldWatch engine stopped after {}s", self.uptime());
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }
}
