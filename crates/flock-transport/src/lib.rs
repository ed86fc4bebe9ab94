//! Flock Transport - the port between the swarm engine and physical nodes
//!
//! This crate provides:
//! - The [`Transport`] trait the orchestration engine drives
//! - [`TelloTransport`], a UDP implementation of the Tello EDU text SDK
//!
//! # Wire model
//!
//! Every command is a short ASCII string sent in one datagram to the node's
//! command port. The node answers with one datagram (`ok`, `error`, or a
//! query value such as a battery percentage). A node never has two commands
//! in flight; the caller awaits the reply before sending the next one.
//!
//! # Example
//!
//! ```rust,ignore
//! use flock_transport::{TelloConfig, TelloTransport, Transport};
//!
//! let transport = TelloTransport::bind(TelloConfig::from_env()).await?;
//! let nodes = transport.discover(3).await?;
//! let battery = transport.send(nodes[0], "battery?").await?;
//! ```

use std::net::SocketAddr;

use async_trait::async_trait;

pub mod error;
pub mod tello;

pub use error::{Result, TransportError};
pub use tello::{TelloConfig, TelloTransport};

/// Default curve speed in cm/s.
pub const DEFAULT_CURVE_SPEED: u32 = 30;

/// A point in the node's body frame, in whole centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CurvePoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CurvePoint {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Render the SDK `curve` command through `entry` to `exit` at `speed` cm/s.
pub fn curve_command(entry: CurvePoint, exit: CurvePoint, speed: u32) -> String {
    format!(
        "curve {} {} {} {} {} {} {}",
        entry.x, entry.y, entry.z, exit.x, exit.y, exit.z, speed
    )
}

/// Capabilities the orchestration engine consumes from the network layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Find exactly `count` reachable nodes, in discovery order.
    async fn discover(&self, count: usize) -> Result<Vec<SocketAddr>>;

    /// Send one command and wait for its reply.
    async fn send(&self, addr: SocketAddr, command: &str) -> Result<String>;

    /// Fly a curve through `entry` ending at `exit`.
    async fn send_curve(
        &self,
        addr: SocketAddr,
        entry: CurvePoint,
        exit: CurvePoint,
    ) -> Result<String> {
        let command = curve_command(entry, exit, self.curve_speed());
        self.send(addr, &command).await
    }

    /// All currently connected node addresses.
    async fn addresses(&self) -> Vec<SocketAddr>;

    /// Speed used for curve commands, in cm/s.
    fn curve_speed(&self) -> u32 {
        DEFAULT_CURVE_SPEED
    }
}
