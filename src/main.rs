// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch

//! FieldWatch - Sensor Ingestion and Alerting Pipeline
//!
//! Reads JSON lines from stdin (or a simulated field station in demo mode),
//! stores every reading, and raises alerts when the decision rule triggers.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use fieldwatch::{Config, Engine, JsonLinesSource, ReadingSource, SimulatedSource, NAME, VERSION};

/// FieldWatch - Sensor Ingestion and Alerting Pipeline
#[derive(Parser, Debug)]
#[command(name = "fieldwatch")]
#[command(author = "FieldWatch Project")]
#[command(version = VERSION)]
#[command(about = "Periodic sensor ingestion with threshold alerting")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with a simulated field station
    #[arg(long)]
    demo: bool,

    /// Database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// MQTT broker address (enables the MQTT sink)
    #[arg(long)]
    mqtt_broker: Option<String>,

    /// Poll interval in seconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{} v{} - Sensor Ingestion and Alerting Pipeline", NAME, VERSION);

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(db) = args.db {
        config.database.path = db;
    }
    if let Some(broker) = args.mqtt_broker {
        config.notify.mqtt.enabled = true;
        config.notify.mqtt.broker = broker;
    }
    if let Some(interval) = args.interval {
        config.scheduler.poll_interval_secs = interval;
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args.once))
}

async fn run(config: Config, once: bool) -> Result<()> {
    let source: Box<dyn ReadingSource> = if config.demo_mode {
        Box::new(SimulatedSource::new("demo-station"))
    } else {
        Box::new(JsonLinesSource::stdin())
    };
    info!("Reading source: {}", source.name());

    let engine = Engine::start(config, source)
        .await
        .context("startup failed")?;

    if once {
        let report = engine.run_once().await?;
        info!(
            "Stored reading {}; triggered: {} ({})",
            report.record_id, report.decision.triggered, report.decision.reason
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, cleaning up...");
                stopper.cancel();
            }
            Err(e) => warn!("Could not listen for shutdown signal: {}", e),
        }
    });

    info!("FieldWatch running, press Ctrl+C to shutdown");
    let stats = engine.run(cancel).await?;
    info!(
        "FieldWatch shutdown complete: {} cycles, {} failed, {} alerts",
        stats.cycles, stats.failed_cycles, stats.alerts_sent
    );

    Ok(())
}
