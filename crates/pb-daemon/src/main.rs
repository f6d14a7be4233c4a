//! prompt-bridge daemon -- serializes HTTP prompts onto one agent session.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use pb_core::config::Config;
use pb_daemon::daemon::Daemon;
use pb_harness::shutdown::ShutdownReason;
use pb_telemetry::logging::{self, LogFormat};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "pb-daemon", version, about = "prompt-bridge daemon")]
struct Args {
    /// Config file (default: ~/.prompt-bridge/config.toml or $PROMPT_BRIDGE_CONFIG).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `[daemon] port`.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let dotenv = pb_daemon::environment::load_dotenv();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load config")?,
    };
    if let Some(port) = args.port {
        config.daemon.port = port;
    }

    logging::init(
        "pb-daemon",
        &config.general.log_level,
        LogFormat::from_config(&config.general.log_format),
    );
    info!(version = env!("CARGO_PKG_VERSION"), "prompt-bridge daemon starting");
    dotenv.log();

    let daemon = Daemon::new(config)?;
    let shutdown = daemon.shutdown_handle();

    // Wire ctrl-c to trigger graceful shutdown.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger(ShutdownReason::Interrupted);
    });

    match daemon.run().await? {
        ShutdownReason::Interrupted => Ok(()),
        ShutdownReason::Fatal(why) => bail!("bridge halted: {why}"),
    }
}
