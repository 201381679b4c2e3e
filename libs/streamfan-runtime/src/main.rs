// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! streamfan runtime binary
//!
//! Builds the configured pipeline, publishes one relay endpoint per input
//! slot, runs until end of stream, an error or Ctrl+C, then drains.
//! Exit codes: 0 normal shutdown, 1 startup failure, 2 runtime failure.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use streamfan::{
    EXIT_STARTUP_FAILURE, LoopEvent, MainLoop, NodeCatalog, PipelineConfig, PipelineMode,
    RunOutcome, Scheduler, Session, StreamServer,
};
use tracing_appender::non_blocking::WorkerGuard;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Multistream,
    Tiled,
}

impl From<ModeArg> for PipelineMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Multistream => PipelineMode::Multistream,
            ModeArg::Tiled => PipelineMode::Tiled,
        }
    }
}

#[derive(Parser)]
#[command(name = "streamfan-runtime")]
#[command(author, version, about = "Dynamic fan-out video pipeline", long_about = None)]
struct Args {
    /// Pipeline configuration file (TOML)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Pipeline layout, overrides the config file
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Input URI, can be given multiple times; replaces the configured sources
    #[arg(long = "source", value_name = "URI")]
    sources: Vec<String>,

    /// Also write logs to this file
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn setup_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
            let dir = dir.unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_name = path
                .file_name()
                .with_context(|| format!("Log path {} has no file name", path.display()))?;

            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    if !args.sources.is_empty() {
        config.sources = args.sources.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {:#}", e);
            return ExitCode::from(EXIT_STARTUP_FAILURE as u8);
        }
    };

    match run(args) {
        Ok(outcome) => {
            tracing::info!("Exiting: {:?}", outcome);
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(e) => {
            tracing::error!("Startup failed: {:#}", e);
            ExitCode::from(EXIT_STARTUP_FAILURE as u8)
        }
    }
}

/// Returns `Err` only for startup failures; runtime failures come back as
/// a [`RunOutcome`] after the pipeline has drained.
fn run(args: Args) -> Result<RunOutcome> {
    let config = load_config(&args)?;

    let main_loop = Arc::new(MainLoop::new());
    let scheduler: Arc<dyn Scheduler> = main_loop.clone();
    let mut session = Session::build(config, Arc::new(NodeCatalog::builtin()), scheduler)
        .context("Failed to build pipeline")?;

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let server = if session.mounts().is_empty() {
        None
    } else {
        let config = session.config();
        let host: IpAddr = config.server_host.parse().with_context(|| {
            format!("server_host '{}' is not an IP address", config.server_host)
        })?;
        let bind = SocketAddr::new(host, config.service_port);
        let mounts = session.mounts().clone();
        Some(
            tokio_runtime
                .block_on(StreamServer::attach(mounts, bind, host))
                .context("Failed to start stream server")?,
        )
    };

    let quit_loop = Arc::clone(&main_loop);
    ctrlc::set_handler(move || quit_loop.post(LoopEvent::Quit))
        .context("Failed to install Ctrl+C handler")?;

    let controller = session.controller_mut();
    controller.start().context("Failed to start pipeline")?;
    let outcome = controller.run();
    let report = controller.stop();

    tracing::info!(
        "Drained {} nodes, {} branches",
        report.released_nodes,
        report.branches.len()
    );
    if let Some(server) = &server {
        tracing::info!(
            "{} of {} relays received data",
            server.active_relays(),
            session.mounts().len()
        );
    }
    let stats = session.data_stats();
    tracing::info!(
        "Units produced {}, delivered {}, dropped {}",
        stats.produced(),
        stats.delivered(),
        stats.dropped()
    );

    if let Some(server) = server {
        tokio_runtime.block_on(server.shutdown());
    }
    Ok(outcome)
}
