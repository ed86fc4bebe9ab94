//! Response ledger.
//!
//! Each node has an append-only history of [`ResponseRecord`]s. Only the
//! node's own worker appends to it; the orchestrator reads the last record
//! of every node during barrier and battery checks, and the whole history
//! when the session log is written.

use std::net::SocketAddr;

use chrono::{DateTime, Local};
use tokio::sync::RwLock;

/// Response text recorded when the transport gave no usable reply.
pub const NO_RESPONSE: &str = "none_response";

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// One command sent to one node and what came back.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    /// Per-node ordinal, starting at 0.
    pub seq: usize,
    pub address: SocketAddr,
    pub request: String,
    pub response: Option<String>,
    pub sent_at: DateTime<Local>,
    pub received_at: Option<DateTime<Local>>,
}

impl ResponseRecord {
    /// Whether a reply (or the no-reply sentinel) has been recorded.
    pub fn got_response(&self) -> bool {
        self.response.is_some()
    }

    /// Round-trip time in seconds, once answered.
    pub fn duration_secs(&self) -> Option<f64> {
        self.received_at
            .map(|at| (at - self.sent_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Single-line rendering used in session logs.
    pub fn delimited(&self) -> String {
        let none = || "none".to_string();
        format!(
            "id={}, command={}, response={}, start_time={}, end_time={}, duration={}",
            self.seq,
            self.request,
            self.response.clone().unwrap_or_else(none),
            self.sent_at.format(TS_FORMAT),
            self.received_at
                .map(|at| at.format(TS_FORMAT).to_string())
                .unwrap_or_else(none),
            self.duration_secs()
                .map(|d| format!("{d:.3}"))
                .unwrap_or_else(none),
        )
    }
}

/// Full history of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHistory {
    pub address: SocketAddr,
    pub records: Vec<ResponseRecord>,
}

#[derive(Debug, Default)]
struct Books {
    histories: Vec<NodeHistory>,
    /// Worker slot → index into `histories` for the current fleet.
    active: Vec<usize>,
}

/// Per-node response tracking for a session.
#[derive(Debug, Default)]
pub struct Ledger {
    books: RwLock<Books>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open one history per address and make them the active fleet.
    ///
    /// Returns the history index for each address, in order. Histories of a
    /// previous fleet are kept for the session log.
    pub async fn register(&self, addresses: &[SocketAddr]) -> Vec<usize> {
        let mut books = self.books.write().await;
        let first = books.histories.len();
        books.histories.extend(addresses.iter().map(|address| NodeHistory {
            address: *address,
            records: Vec::new(),
        }));
        books.active = (first..first + addresses.len()).collect();
        books.active.clone()
    }

    /// Append an unanswered record; returns its sequence number.
    pub async fn begin(&self, history: usize, request: &str) -> usize {
        let mut books = self.books.write().await;
        let Some(node) = books.histories.get_mut(history) else {
            return 0;
        };
        let seq = node.records.len();
        node.records.push(ResponseRecord {
            seq,
            address: node.address,
            request: request.to_string(),
            response: None,
            sent_at: Local::now(),
            received_at: None,
        });
        seq
    }

    /// Fill in the reply for record `seq`.
    pub async fn complete(&self, history: usize, seq: usize, response: String) {
        let mut books = self.books.write().await;
        if let Some(record) = books
            .histories
            .get_mut(history)
            .and_then(|node| node.records.get_mut(seq))
        {
            record.response = Some(response);
            record.received_at = Some(Local::now());
        }
    }

    /// Last record of every active node, in slot order.
    pub async fn last_records(&self) -> Vec<Option<ResponseRecord>> {
        let books = self.books.read().await;
        books
            .active
            .iter()
            .map(|&i| books.histories[i].records.last().cloned())
            .collect()
    }

    /// Whether every active node's last command has been answered.
    ///
    /// A node that has never been sent anything counts as answered.
    pub async fn all_answered(&self) -> bool {
        let books = self.books.read().await;
        books.active.iter().all(|&i| {
            books.histories[i]
                .records
                .last()
                .map_or(true, ResponseRecord::got_response)
        })
    }

    /// Every history recorded this session, in registration order.
    pub async fn histories(&self) -> Vec<NodeHistory> {
        self.books.read().await.histories.clone()
    }
}
