//! Flock runner binary
//!
//! Executes one command script against a physical swarm.
//!
//! Usage:
//!   flock <script> [--roster roster.json] [--log-dir ./log] [--frame enu|ned]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use flock_engine::{run_session, Roster, Script, Swarm, SwarmConfig};
use flock_transport::{TelloConfig, TelloTransport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "flock", version, about = "Run a drone swarm command script")]
struct Args {
    /// Command script to execute
    script: PathBuf,

    /// JSON roster of preset id/serial/address bindings
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Directory for the session log
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Initial coordinate convention (enu or ned)
    #[arg(long)]
    frame: Option<String>,

    /// Abort the script when a sync times out
    #[arg(long)]
    strict_sync: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flock_cli=info,flock_engine=info,flock_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = SwarmConfig::from_env().context("invalid environment configuration")?;
    if let Some(path) = &args.roster {
        config.roster = Roster::load(path)
            .with_context(|| format!("failed to load roster {}", path.display()))?;
    }
    if let Some(dir) = args.log_dir {
        config.log_dir = dir;
    }
    if let Some(frame) = &args.frame {
        config.convention = frame.parse()?;
    }
    config.sync_timeout_fatal |= args.strict_sync;

    let script = Script::load(&args.script)
        .with_context(|| format!("failed to read script {}", args.script.display()))?;

    let transport = TelloTransport::bind(TelloConfig::from_env())
        .await
        .context("failed to open the command socket")?;
    tracing::info!("Listening on {}", transport.local_addr()?);

    let mut swarm = Swarm::new(Arc::new(transport), config);
    let report = run_session(&mut swarm, &script, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await;

    if let Some(path) = &report.log_path {
        tracing::info!("Session log: {}", path.display());
    }

    let code = report.outcome.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
