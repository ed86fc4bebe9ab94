//! Per-node command queues.
//!
//! The orchestrator is the only producer and the node's worker the only
//! consumer. `pending` counts entries pushed but not yet taken by the
//! worker; it is raised before the entry enters the channel, so a queue is
//! never reported empty while an entry is in transit.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flock_transport::{curve_command, CurvePoint};
use tokio::sync::mpsc;
use tracing::warn;

/// One unit of work for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEntry {
    /// An SDK command string, sent verbatim.
    Text(String),
    /// A curve, sent through the transport's curve primitive.
    Curve { entry: CurvePoint, exit: CurvePoint },
}

impl CommandEntry {
    pub fn text(command: impl Into<String>) -> Self {
        Self::Text(command.into())
    }

    /// The SDK string this entry puts on the wire.
    pub fn render(&self, curve_speed: u32) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Curve { entry, exit } => curve_command(*entry, *exit, curve_speed),
        }
    }
}

/// Producer half of one node's FIFO queue.
#[derive(Debug)]
pub struct CommandQueue {
    address: SocketAddr,
    tx: mpsc::UnboundedSender<CommandEntry>,
    pending: Arc<AtomicUsize>,
}

/// Consumer half, owned by the node's worker.
#[derive(Debug)]
pub struct QueueReceiver {
    pub(crate) rx: mpsc::UnboundedReceiver<CommandEntry>,
    pub(crate) pending: Arc<AtomicUsize>,
}

impl QueueReceiver {
    /// Wait for the next entry; `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<CommandEntry> {
        self.rx.recv().await
    }

    /// Mark one entry as taken.
    pub fn consumed(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CommandQueue {
    /// Create a queue for the node at `address`.
    pub fn new(address: SocketAddr) -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let queue = Self {
            address,
            tx,
            pending: Arc::clone(&pending),
        };
        (queue, QueueReceiver { rx, pending })
    }

    /// Append an entry. Returns false if the worker has gone away.
    pub fn push(&self, entry: CommandEntry) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(entry).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("Worker for {} is gone; command dropped", self.address);
            return false;
        }
        true
    }

    /// Entries not yet taken by the worker.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}
