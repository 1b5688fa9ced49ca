//! lacp-convergence command line entry point.
//!
//! Validates LACP state captured from two switches, or prints the default
//! configuration.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lacp_convergence::{
    poll_until_converged, BudgetConfig, ConvergenceConfig, CrossPeerValidator, DeviceDump,
    DumpDevice, LacpMode, LinkModes, Peer, PeerLinks, VERIFY_LACP_STEP,
};

/// LACP convergence verification
#[derive(Parser, Debug)]
#[command(name = "lacp-convergence")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the LAG links between two captured switch dumps
    Validate {
        /// Configuration file (defaults apply when omitted)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// LACP mode configured on the first switch
        #[arg(long, default_value = "active")]
        mode_a: LacpMode,

        /// LACP mode configured on the second switch
        #[arg(long, default_value = "passive")]
        mode_b: LacpMode,

        /// JSON dump of the first switch
        dump_a: PathBuf,

        /// JSON dump of the second switch
        dump_b: PathBuf,
    },

    /// Print the default configuration as TOML
    Defaults,
}

/// Initialize tracing/logging.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();
}

fn load_peer(path: &Path) -> anyhow::Result<Peer> {
    let dump = DeviceDump::load(path)
        .with_context(|| format!("loading switch dump {}", path.display()))?;
    Ok(Arc::new(DumpDevice::new(dump)))
}

async fn validate(
    config: Option<PathBuf>,
    modes: LinkModes,
    dump_a: PathBuf,
    dump_b: PathBuf,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => ConvergenceConfig::load(&path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => ConvergenceConfig::default(),
    };

    let links = PeerLinks::new(
        load_peer(&dump_a)?,
        load_peer(&dump_b)?,
        config.lag.ports.clone(),
    );
    let validator = CrossPeerValidator::new(config.mode_table());
    // A dump never changes, one attempt is enough.
    let policy =
        BudgetConfig::new(1, 1).policy(VERIFY_LACP_STEP, "Captured state does not converge");

    let report =
        poll_until_converged(&config.poller(), &links, &validator, modes, &policy).await?;
    info!(
        "{} link(s) of LAG {} consistent in {} mode",
        report.links, config.lag.id, report.modes
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let result = match args.command {
        Command::Validate {
            config,
            mode_a,
            mode_b,
            dump_a,
            dump_b,
        } => validate(config, LinkModes::new(mode_a, mode_b), dump_a, dump_b).await,
        Command::Defaults => ConvergenceConfig::default()
            .to_toml_string()
            .map(|toml| print!("{}", toml))
            .map_err(anyhow::Error::from),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("lacp-convergence: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
