//! Scripted in-memory transport for engine tests.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use flock_transport::{Result, Transport, TransportError};

pub(crate) struct MockTransport {
    nodes: Vec<SocketAddr>,
    replies: HashMap<(SocketAddr, String), String>,
    stalled: HashSet<SocketAddr>,
    failing: HashSet<SocketAddr>,
    sent: Mutex<Vec<(SocketAddr, String)>>,
}

impl MockTransport {
    /// `count` nodes at 10.0.0.1.. that answer `ok` to everything.
    pub fn new(count: u8) -> Self {
        Self::with_addresses(
            (1..=count)
                .map(|host| SocketAddr::from(([10, 0, 0, host], 8889)))
                .collect(),
        )
    }

    pub fn with_addresses(nodes: Vec<SocketAddr>) -> Self {
        Self {
            nodes,
            replies: HashMap::new(),
            stalled: HashSet::new(),
            failing: HashSet::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn nodes(&self) -> Vec<SocketAddr> {
        self.nodes.clone()
    }

    /// Answer `command` on `addr` with `reply`.
    pub fn reply(mut self, addr: SocketAddr, command: &str, reply: &str) -> Self {
        self.replies.insert((addr, command.to_string()), reply.to_string());
        self
    }

    /// Never answer anything sent to `addr`.
    pub fn stalled(mut self, addr: SocketAddr) -> Self {
        self.stalled.insert(addr);
        self
    }

    /// Fail every send to `addr` with a timeout error.
    pub fn failing(mut self, addr: SocketAddr) -> Self {
        self.failing.insert(addr);
        self
    }

    pub fn sent(&self) -> Vec<(SocketAddr, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, addr: SocketAddr) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, cmd)| cmd)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn discover(&self, count: usize) -> Result<Vec<SocketAddr>> {
        if self.nodes.len() < count {
            return Err(TransportError::Discovery {
                requested: count,
                found: self.nodes.len(),
            });
        }
        Ok(self.nodes[..count].to_vec())
    }

    async fn send(&self, addr: SocketAddr, command: &str) -> Result<String> {
        self.sent.lock().unwrap().push((addr, command.to_string()));
        if self.stalled.contains(&addr) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&addr) {
            return Err(TransportError::Timeout {
                addr,
                timeout: Duration::from_secs(15),
            });
        }
        tokio::task::yield_now().await;
        Ok(self
            .replies
            .get(&(addr, command.to_string()))
            .cloned()
            .unwrap_or_else(|| "ok".to_string()))
    }

    async fn addresses(&self) -> Vec<SocketAddr> {
        self.nodes.clone()
    }
}
