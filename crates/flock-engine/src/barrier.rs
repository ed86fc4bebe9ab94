//! Two-phase synchronization barrier.
//!
//! Phase one waits until every queue has been drained by its worker; phase
//! two waits until every node's last command has been answered. Each phase
//! has its own deadline. Workers bump a [`Progress`] counter whenever they
//! take an entry or record a reply, and the barrier re-checks its condition
//! only on those changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::error::{Result, SwarmError};
use crate::ledger::Ledger;
use crate::worker::Fleet;

/// Barrier phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Every queue has been taken by its worker.
    QueuesDrained,
    /// Every node's last command has a reply.
    ResponsesReceived,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueuesDrained => write!(f, "all queues were not empty"),
            Self::ResponsesReceived => write!(f, "all responses were not received"),
        }
    }
}

/// Change counter shared between workers and barriers.
#[derive(Debug, Clone)]
pub struct Progress {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Signal that some queue or ledger state changed.
    pub fn bump(&self) {
        self.tx.send_modify(|n| *n = n.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

/// Waits for a fleet to converge.
pub struct Barrier<'a> {
    fleet: Option<&'a Fleet>,
    ledger: &'a Ledger,
    progress: &'a Progress,
}

impl<'a> Barrier<'a> {
    pub fn new(fleet: Option<&'a Fleet>, ledger: &'a Ledger, progress: &'a Progress) -> Self {
        Self {
            fleet,
            ledger,
            progress,
        }
    }

    /// Run both phases, each bounded by `timeout`.
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        self.wait_for(Phase::QueuesDrained, timeout).await?;
        debug!("Barrier: all queues drained");
        self.wait_for(Phase::ResponsesReceived, timeout).await?;
        debug!("Barrier: all responses received");
        Ok(())
    }

    /// Wait for one phase to hold.
    pub async fn wait_for(&self, phase: Phase, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut changes = self.progress.subscribe();
        loop {
            changes.borrow_and_update();
            if self.holds(phase).await {
                return Ok(());
            }
            match timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return Err(SwarmError::SyncTimeout { phase, timeout }),
            }
        }
    }

    async fn holds(&self, phase: Phase) -> bool {
        match phase {
            Phase::QueuesDrained => self.fleet.map_or(true, Fleet::all_empty),
            Phase::ResponsesReceived => self.ledger.all_answered().await,
        }
    }
}
