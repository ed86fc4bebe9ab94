//! Error types for the swarm engine.
//!
//! Two severities exist. A [`Severity::Recoverable`] error is logged and the
//! script continues; everything else aborts the script (the session still
//! lands every node and flushes the log).

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::barrier::Phase;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SwarmError>;

/// How an error affects the running script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged; the next script line runs.
    Recoverable,
    /// Aborts the remaining script.
    Fatal,
}

/// Errors that can occur while orchestrating a swarm.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Fewer nodes answered than `scan` asked for.
    #[error("discovery found {found} of {requested} nodes")]
    Discovery { requested: usize, found: usize },

    /// A target or assignment named an id outside the known range.
    #[error("unknown drone id {0}")]
    UnknownId(usize),

    /// A serial has no known address.
    #[error("serial {0} has no known address")]
    UnresolvedSerial(String),

    /// An address is not served by any worker.
    #[error("address {0} is not bound to a worker")]
    UnboundAddress(SocketAddr),

    /// A node reported a battery level below the threshold.
    #[error("Battery check failed! {address} at {level}% (threshold {threshold}%)")]
    BatteryThreshold {
        address: SocketAddr,
        level: i64,
        threshold: i64,
    },

    /// A battery reply was not an integer percentage.
    #[error("unreadable battery reply {response:?} from {address}")]
    BatteryReading { address: SocketAddr, response: String },

    /// A barrier phase did not converge in time.
    #[error("Sync failed since {phase} within {timeout:?}")]
    SyncTimeout { phase: Phase, timeout: Duration },

    /// A recognized command had malformed arguments.
    #[error("line {line}: cannot parse {text:?}: {reason}")]
    Parse {
        line: usize,
        text: String,
        reason: String,
    },

    /// A command that needs workers ran before `scan`.
    #[error("{0} requires a prior scan")]
    NotScanned(&'static str),

    /// Formation generation failed.
    #[error("formation error: {0}")]
    Formation(#[from] flock_formation::FormationError),

    /// Transport failure outside a worker (discovery, land-all).
    #[error("transport error: {0}")]
    Transport(flock_transport::TransportError),

    /// Roster could not be decoded.
    #[error("roster error: {0}")]
    Roster(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwarmError {
    /// Stable machine-readable code for this error category.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Discovery { .. } => "E_DISCOVERY",
            Self::UnknownId(_) => "E_UNKNOWN_ID",
            Self::UnresolvedSerial(_) => "E_UNRESOLVED_SERIAL",
            Self::UnboundAddress(_) => "E_UNBOUND_ADDRESS",
            Self::BatteryThreshold { .. } => "E_BATTERY_THRESHOLD",
            Self::BatteryReading { .. } => "E_BATTERY_READING",
            Self::SyncTimeout { .. } => "E_SYNC_TIMEOUT",
            Self::Parse { .. } => "E_PARSE",
            Self::NotScanned(_) => "E_NOT_SCANNED",
            Self::Formation(_) => "E_FORMATION",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Roster(_) => "E_ROSTER",
            Self::Io(_) => "E_IO",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::SyncTimeout { .. } => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl From<flock_transport::TransportError> for SwarmError {
    fn from(e: flock_transport::TransportError) -> Self {
        match e {
            flock_transport::TransportError::Discovery { requested, found } => {
                SwarmError::Discovery { requested, found }
            }
            other => SwarmError::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_sync_timeouts_are_recoverable() {
        let timeout = SwarmError::SyncTimeout {
            phase: Phase::QueuesDrained,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(timeout.severity(), Severity::Recoverable);
        assert!(!timeout.is_fatal());

        assert!(SwarmError::UnknownId(4).is_fatal());
        assert!(SwarmError::UnresolvedSerial("X".into()).is_fatal());
    }

    #[test]
    fn discovery_shortfall_keeps_its_category() {
        let err: SwarmError = flock_transport::TransportError::Discovery {
            requested: 3,
            found: 1,
        }
        .into();
        assert_eq!(err.code(), "E_DISCOVERY");
    }
}
