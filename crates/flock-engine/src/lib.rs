//! Flock Engine - script-driven orchestration for drone swarms
//!
//! This crate provides:
//! - Script classification into [`Command`]s
//! - An identity [`Registry`] keeping serials, addresses and script ids consistent
//! - One dispatcher worker and FIFO queue per node ([`Fleet`])
//! - A two-phase [`Barrier`] for `sync` and implicit waits
//! - A response [`Ledger`] and the per-session log file
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flock_engine::{run_session, Script, Swarm, SwarmConfig};
//! use flock_transport::{TelloConfig, TelloTransport};
//!
//! let transport = Arc::new(TelloTransport::bind(TelloConfig::from_env()).await?);
//! let mut swarm = Swarm::new(transport, SwarmConfig::from_env()?);
//! let script = Script::load("flight.txt".as_ref())?;
//! let report = run_session(&mut swarm, &script, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await;
//! ```

pub mod barrier;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logbook;
pub mod queue;
pub mod registry;
pub mod script;
pub mod session;
pub mod swarm;
pub mod worker;

#[cfg(test)]
mod testing;

pub use barrier::{Barrier, Phase, Progress};
pub use config::{Roster, RosterEntry, SwarmConfig};
pub use error::{Result, Severity, SwarmError};
pub use ledger::{Ledger, NodeHistory, ResponseRecord, NO_RESPONSE};
pub use queue::{CommandEntry, CommandQueue};
pub use registry::{LogicalId, NodeIdentity, Registry, Resolved};
pub use script::{classify, Command, Script, Targets};
pub use session::{run_session, Outcome, SessionReport};
pub use swarm::Swarm;
pub use worker::Fleet;
