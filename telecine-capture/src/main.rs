//! Telecine capture client: entry point.
//!
//! ```text
//! telecine-capture                       Connect with defaults
//! telecine-capture --config <path>       Use custom config TOML
//! telecine-capture --scanner host:port   Override the scanner address
//! telecine-capture --gen-config          Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use telecine_core::network;
use telecine_core::{CalibrationEngine, FrameSaver, Notifier, ProtocolReceiver};

use telecine_capture::config::CaptureConfig;
use telecine_capture::events::EventLog;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "telecine-capture", about = "Telecine frame capture client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "telecine-capture.toml")]
    config: PathBuf,

    /// Scanner address (overrides config). Example: 192.168.1.50:8000
    #[arg(short, long)]
    scanner: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&CaptureConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = CaptureConfig::load(&cli.config);
    if let Some(addr) = cli.scanner {
        config.network.set_address(&addr);
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("telecine-capture v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Build the worker ─────────────────────────────────────

    let calibration = CalibrationEngine::open(
        &config.calibration.path,
        config.processing.apply_calibration,
    );
    let (notifier, mut events) = Notifier::channel();
    let mut worker = ProtocolReceiver::new(
        config.processing.clone(),
        calibration,
        FrameSaver::new(config.output.clone()),
        notifier,
    );
    let mut log = EventLog::new(worker.status());

    // ── 2. Connect to the scanner ───────────────────────────────

    let addr = config.network.address();
    let stream = network::connect(&addr, config.network.timeout()).await?;

    let worker_handle = tokio::spawn(async move { network::receive(stream, &mut worker).await });

    // ── 3. Consume events ───────────────────────────────────────

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log.handle(event),
                // Worker finished and dropped the notifier.
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                worker_handle.abort();
                break;
            }
        }
    }

    // ── 4. Shutdown ─────────────────────────────────────────────

    match worker_handle.await {
        Ok(Ok(())) => info!("session ended"),
        Ok(Err(e)) => error!("session failed: {e}"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!("worker task failed: {e}"),
    }
    info!(summary = ?log.summary(), "capture summary");

    Ok(())
}
