//! Dispatcher workers.
//!
//! One task per node drains that node's queue and drives the transport. A
//! node never has two commands in flight. Transport failures are recorded as
//! [`NO_RESPONSE`] and never stop the loop.

use std::net::SocketAddr;
use std::sync::Arc;

use flock_transport::Transport;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::barrier::Progress;
use crate::ledger::{Ledger, NO_RESPONSE};
use crate::queue::{CommandEntry, CommandQueue, QueueReceiver};

struct Worker {
    address: SocketAddr,
    history: usize,
    queue: QueueReceiver,
    transport: Arc<dyn Transport>,
    ledger: Arc<Ledger>,
    progress: Progress,
}

impl Worker {
    async fn run(mut self) {
        while let Some(entry) = self.queue.next().await {
            let request = entry.render(self.transport.curve_speed());

            // Record before releasing the queue slot so a drained queue
            // always has its last command visible in the ledger.
            let seq = self.ledger.begin(self.history, &request).await;
            self.queue.consumed();
            self.progress.bump();

            let reply = match entry {
                CommandEntry::Text(text) => self.transport.send(self.address, &text).await,
                CommandEntry::Curve { entry, exit } => {
                    self.transport.send_curve(self.address, entry, exit).await
                }
            };
            let response = match reply {
                Ok(response) => response,
                Err(e) => {
                    warn!("{} failed on {}: {}", request, self.address, e);
                    NO_RESPONSE.to_string()
                }
            };
            debug!("{} <- {:?}: {:?}", self.address, request, response);

            self.ledger.complete(self.history, seq, response).await;
            self.progress.bump();
        }
        debug!("Worker for {} stopped", self.address);
    }
}

/// The queues and workers created by one `scan`.
///
/// Dropping a fleet closes its queues; workers finish what was already
/// queued and then exit.
pub struct Fleet {
    queues: Vec<CommandQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl Fleet {
    /// Open a queue and spawn a worker for every address, in slot order.
    pub async fn spawn(
        addresses: &[SocketAddr],
        transport: Arc<dyn Transport>,
        ledger: Arc<Ledger>,
        progress: Progress,
    ) -> Self {
        let histories = ledger.register(addresses).await;
        let mut queues = Vec::with_capacity(addresses.len());
        let mut workers = Vec::with_capacity(addresses.len());

        for (address, history) in addresses.iter().zip(histories) {
            let (queue, receiver) = CommandQueue::new(*address);
            let worker = Worker {
                address: *address,
                history,
                queue: receiver,
                transport: Arc::clone(&transport),
                ledger: Arc::clone(&ledger),
                progress: progress.clone(),
            };
            workers.push(tokio::spawn(worker.run()));
            queues.push(queue);
        }

        Self { queues, workers }
    }

    /// Queue for worker `slot`.
    pub fn queue(&self, slot: usize) -> Option<&CommandQueue> {
        self.queues.get(slot)
    }

    pub fn queues(&self) -> &[CommandQueue] {
        &self.queues
    }

    /// Push `entry` onto every queue.
    pub fn broadcast(&self, entry: CommandEntry) {
        for queue in &self.queues {
            queue.push(entry.clone());
        }
    }

    pub fn all_empty(&self) -> bool {
        self.queues.iter().all(CommandQueue::is_empty)
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Workers still running.
    pub fn live_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::Barrier;
    use crate::testing::MockTransport;
    use std::time::Duration;

    #[tokio::test]
    async fn each_node_sees_its_commands_in_order() {
        let transport = Arc::new(MockTransport::new(2));
        let nodes = transport.nodes();
        let ledger = Arc::new(Ledger::new());
        let progress = Progress::new();
        let fleet = Fleet::spawn(&nodes, transport.clone(), Arc::clone(&ledger), progress.clone()).await;
        assert_eq!(fleet.len(), 2);
        assert_eq!(fleet.live_workers(), 2);

        for cmd in ["takeoff", "up 50", "land"] {
            fleet.queue(0).unwrap().push(CommandEntry::text(cmd));
        }
        fleet.queue(1).unwrap().push(CommandEntry::text("battery?"));

        Barrier::new(Some(&fleet), &ledger, &progress)
            .wait(Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(transport.sent_to(nodes[0]), vec!["takeoff", "up 50", "land"]);
        assert_eq!(transport.sent_to(nodes[1]), vec!["battery?"]);
    }

    #[tokio::test]
    async fn transport_failures_become_sentinel_responses() {
        let transport = MockTransport::new(1);
        let node = transport.nodes()[0];
        let transport = Arc::new(transport.failing(node));
        let ledger = Arc::new(Ledger::new());
        let progress = Progress::new();
        let fleet = Fleet::spawn(&[node], transport, Arc::clone(&ledger), progress.clone()).await;

        fleet.broadcast(CommandEntry::text("takeoff"));
        fleet.broadcast(CommandEntry::text("land"));
        Barrier::new(Some(&fleet), &ledger, &progress)
            .wait(Duration::from_secs(5))
            .await
            .unwrap();

        let history = &ledger.histories().await[0];
        assert_eq!(history.records.len(), 2);
        assert!(history
            .records
            .iter()
            .all(|r| r.response.as_deref() == Some(NO_RESPONSE)));
        assert_eq!(fleet.live_workers(), 1);
    }

    #[tokio::test]
    async fn dropping_the_fleet_stops_workers() {
        let transport = Arc::new(MockTransport::new(2));
        let nodes = transport.nodes();
        let ledger = Arc::new(Ledger::new());
        let fleet = Fleet::spawn(&nodes, transport, ledger, Progress::new()).await;
        let Fleet { queues, workers } = fleet;
        drop(queues);
        for worker in workers {
            tokio::time::timeout(Duration::from_secs(1), worker)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
