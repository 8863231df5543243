mod config;
mod headers;
mod spool;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nightwatch_core::{
    CalibrationProcessor, RecipeRunner, Scheduler, SchedulerState, StateStore, SubprocessConfig,
    SubprocessInvoker, TriggerProcessor,
};
use nightwatch_core::recipe::LogNotifier;

use config::load_config;
use headers::SidecarHeaders;
use spool::SpoolDirectorySource;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("NIGHTWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    info!("Spool directory: {:?}", config.spool_dir);
    info!("State directory: {:?}", config.state_dir);
    info!("Recipes directory: {:?}", config.recipes.directory);

    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("Failed to create state dir {:?}", config.state_dir))?;

    // Recipe invocation stack
    let invoker = Arc::new(SubprocessInvoker::new(SubprocessConfig {
        recipes_dir: config.recipes.directory.clone(),
        interpreter: config.recipes.interpreter.clone(),
    }));
    let runner = Arc::new(
        RecipeRunner::new(invoker, Arc::new(LogNotifier))
            .with_ignored_programs(config.recipes.ignored_programs.clone())
            .with_trace(config.recipes.trace),
    );
    if config.recipes.trace {
        info!("Trace mode: recipe commands are logged but not executed");
    }

    // Trigger side: header access and the calibration state machine
    let headers = Arc::new(SidecarHeaders::new(config.spool_dir.clone()));
    let calibration = CalibrationProcessor::new(config.calibration.clone(), Arc::clone(&runner));
    let trigger = Arc::new(TriggerProcessor::new(
        headers.clone(),
        runner,
        calibration,
        config.state_dir.join("calibrations.json"),
    ));

    // Scheduler with persisted crash-recovery state
    let source = Arc::new(SpoolDirectorySource::new(config.spool_dir.clone()));
    let store: StateStore<SchedulerState> =
        StateStore::new(config.state_dir.join("scheduler.json"));
    let mut scheduler = Scheduler::new(config.scheduler.clone(), source, headers, store)
        .context("Failed to create scheduler")?;

    let stop = scheduler.stop_signal();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping scheduler");
        stop.stop();
    });

    scheduler.run(trigger).await;
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
