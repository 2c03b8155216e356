// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! wxcore - Weather Station Engine
//!
//! Runs the engine against the configured station until it is interrupted
//! or the station runs dry. SIGINT shuts down gracefully, SIGHUP rebuilds
//! the engine from a freshly read configuration.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wxcore::core::RetryPolicy;
use wxcore::station::SimulatorMode;
use wxcore::{Config, ControlHandle, Engine, Runner, ServiceRegistry, StationRegistry, VERSION};

/// wxcore - Weather Station Engine
#[derive(Parser, Debug)]
#[command(name = "wxcore")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Event-driven weather station engine")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Exit on station I/O errors instead of retrying
    #[arg(short, long)]
    exit: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Run the simulator as a fast generator
    #[arg(long)]
    generator: bool,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

/// Read the configuration and apply command line overrides
fn load_config(path: &Path, args: &Args) -> Result<Config> {
    let mut config = Config::load_or_create(path)?;
    if args.exit {
        config.engine.exit_on_io_error = true;
    }
    if args.generator {
        config.station.station_type = "simulator".to_string();
        config.simulator.mode = SimulatorMode::Generator;
    }
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    Ok(config)
}

fn init_logging(args: &Args, config: &Config) -> Result<()> {
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Translate process signals into engine control requests
fn spawn_signal_thread(control: ControlHandle) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || runtime.block_on(wait_for_signals(control)))?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signals(control: ControlHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("SIGHUP handler not installed: {}", e);
            wait_for_interrupt(control).await;
            return;
        }
    };

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Interrupt handler failed: {}", e);
                }
                info!("Interrupt received, shutting down");
                control.request_shutdown();
                return;
            }
            _ = hangup.recv() => {
                info!("SIGHUP received, restarting engine");
                control.request_restart();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(control: ControlHandle) {
    wait_for_interrupt(control).await;
}

async fn wait_for_interrupt(control: ControlHandle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, shutting down"),
        Err(e) => warn!("Interrupt handler failed: {}", e),
    }
    control.request_shutdown();
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let config = load_config(&config_path, &args)?;
    init_logging(&args, &config)?;

    info!("wxcore v{} - Weather Station Engine", VERSION);
    info!("Configuration loaded from {:?}", config_path);
    info!("Station type: {}", config.station.station_type);

    let control = ControlHandle::new();
    spawn_signal_thread(control.clone())?;

    let stations = StationRegistry::with_builtins();
    let services = ServiceRegistry::with_builtins();
    let policy = RetryPolicy::from_config(&config.engine);

    // The first engine uses the configuration loaded above; rebuilds re-read it
    let mut loaded = Some(config);
    let mut runner = Runner::new(policy, control.clone(), |policy: &mut RetryPolicy| {
        let config = match loaded.take() {
            Some(config) => config,
            None => load_config(&config_path, &args)?,
        };
        *policy = RetryPolicy::from_config(&config.engine);
        Engine::build(&config, &stations, &services, control.clone())
    });
    runner.run()?;

    info!("wxcore shutdown complete");
    Ok(())
}
