//! Session lifecycle.
//!
//! Runs a script to completion, failure or interrupt. Whatever the outcome,
//! every known node is told to land and the session log is written.

use std::future::Future;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::error::SwarmError;
use crate::script::Script;
use crate::swarm::Swarm;

/// How a session ended.
#[derive(Debug)]
pub enum Outcome {
    Completed,
    Failed(SwarmError),
    Interrupted,
}

impl Outcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Failed(_) => 1,
            Self::Interrupted => 130,
        }
    }
}

/// Result of [`run_session`].
#[derive(Debug)]
pub struct SessionReport {
    pub outcome: Outcome,
    /// Where the log was written, if writing succeeded.
    pub log_path: Option<PathBuf>,
}

/// Run `script` on `swarm` until it finishes or `interrupt` resolves.
pub async fn run_session(
    swarm: &mut Swarm,
    script: &Script,
    interrupt: impl Future<Output = ()>,
) -> SessionReport {
    let outcome = tokio::select! {
        result = swarm.run(script) => match result {
            Ok(()) => Outcome::Completed,
            Err(e) => Outcome::Failed(e),
        },
        _ = interrupt => Outcome::Interrupted,
    };

    match &outcome {
        Outcome::Completed => info!("Script finished"),
        Outcome::Failed(e) => {
            error!("[EXCEPTION] {} ({})", e, e.code());
            swarm.land_all().await;
        }
        Outcome::Interrupted => {
            warn!("[EXCEPTION] Interrupted");
            swarm.land_all().await;
        }
    }

    let log_path = match swarm.save_log().await {
        Ok(path) => Some(path),
        Err(e) => {
            error!("Failed to save log: {}", e);
            None
        }
    };

    SessionReport { outcome, log_path }
}
