//! Engine configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use flock_formation::Convention;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// One preset identity binding. Ids are 1-based, as in scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: usize,
    pub serial: String,
    pub address: SocketAddr,
}

/// Preset serial/address/id bindings known before discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    pub entries: Vec<RosterEntry>,
}

impl Roster {
    /// Load a roster from a JSON array of entries.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Configuration for a swarm session.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Directory for session log files
    pub log_dir: PathBuf,

    /// Per-phase bound for implicit barrier waits
    pub join_timeout: Duration,

    /// Pause before a `sync` barrier starts
    pub sync_settle: Duration,

    /// Abort the script when `sync` times out
    pub sync_timeout_fatal: bool,

    /// Initial coordinate convention
    pub convention: Convention,

    /// Preset identity bindings
    pub roster: Roster,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./log"),
            join_timeout: Duration::from_secs(300),
            sync_settle: Duration::from_secs(1),
            sync_timeout_fatal: false,
            convention: Convention::Enu,
            roster: Roster::default(),
        }
    }
}

impl SwarmConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let roster = match std::env::var("FLOCK_ROSTER") {
            Ok(path) => Roster::load(Path::new(&path))?,
            Err(_) => Roster::default(),
        };

        Ok(Self {
            log_dir: std::env::var("FLOCK_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            join_timeout: Duration::from_secs_f64(env_or(
                "FLOCK_JOIN_TIMEOUT_SECS",
                defaults.join_timeout.as_secs_f64(),
            )),
            sync_settle: Duration::from_millis(env_or(
                "FLOCK_SYNC_SETTLE_MS",
                defaults.sync_settle.as_millis() as u64,
            )),
            sync_timeout_fatal: env_or("FLOCK_SYNC_TIMEOUT_FATAL", defaults.sync_timeout_fatal),
            convention: env_or("FLOCK_CONVENTION", defaults.convention),
            roster,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
