//! Identity registry.
//!
//! Three mappings are kept mutually consistent:
//!
//! - serial → address (which physical node answers where)
//! - logical id → serial (which physical node a script id refers to)
//! - address → worker slot (which dispatcher worker owns an address)
//!
//! Serial ↔ address is a bijection at all times: binding a serial to an
//! address drops whichever other serial held that address, and logical ids
//! bound to the dropped serial follow the new one. Id → serial is one-to-one:
//! an id whose serial is already held elsewhere is unbound and then adopts a
//! free serial, preferring the one at its own worker's address. All updates
//! happen under a single write lock, so readers never see a half-applied
//! change.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use flock_transport::Transport;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::Roster;
use crate::error::{Result, SwarmError};

/// Dense 0-based node handle, stable for a session.
pub type LogicalId = usize;

/// A node as the registry currently sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub logical_id: LogicalId,
    pub serial: String,
    pub address: SocketAddr,
}

/// Result of resolving a logical id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub serial: String,
    pub address: SocketAddr,
    /// Index of the worker that owns `address`.
    pub slot: usize,
}

#[derive(Debug, Default)]
struct Tables {
    serial_to_address: HashMap<String, SocketAddr>,
    id_to_serial: BTreeMap<LogicalId, String>,
    address_to_slot: HashMap<SocketAddr, usize>,
    slots: Vec<SocketAddr>,
}

impl Tables {
    fn serial_at(&self, addr: SocketAddr) -> Option<&str> {
        self.serial_to_address
            .iter()
            .find(|(_, a)| **a == addr)
            .map(|(s, _)| s.as_str())
    }

    fn holds(&self, serial: &str) -> bool {
        self.id_to_serial.values().any(|s| s == serial)
    }

    /// Bind `serial` to `addr`, dropping any other serial at `addr`.
    ///
    /// Ids bound to a dropped serial follow `serial` unless another id
    /// already holds it; such ids are left for [`Tables::adopt_orphans`].
    fn bind(&mut self, serial: &str, addr: SocketAddr) {
        let displaced: Vec<String> = self
            .serial_to_address
            .iter()
            .filter(|(s, a)| **a == addr && s.as_str() != serial)
            .map(|(s, _)| s.clone())
            .collect();

        for old in displaced {
            debug!("Serial {} displaced from {} by {}", old, addr, serial);
            self.serial_to_address.remove(&old);
            let orphans: Vec<LogicalId> = self
                .id_to_serial
                .iter()
                .filter(|(_, s)| **s == old)
                .map(|(id, _)| *id)
                .collect();
            for id in orphans {
                if self.holds(serial) {
                    self.id_to_serial.remove(&id);
                } else {
                    self.id_to_serial.insert(id, serial.to_string());
                }
            }
        }

        self.serial_to_address.insert(serial.to_string(), addr);
    }

    /// Give every unbound id in `0..slots` a serial no other id holds,
    /// preferring the serial at its own slot's address.
    fn adopt_orphans(&mut self) {
        for id in 0..self.slots.len() {
            if self.id_to_serial.contains_key(&id) {
                continue;
            }
            let preferred = std::iter::once(self.slots[id]);
            let others = self.slots.iter().copied().filter(|a| *a != self.slots[id]);
            let free = preferred
                .chain(others)
                .filter_map(|addr| self.serial_at(addr))
                .find(|serial| !self.holds(serial))
                .map(str::to_string);
            match free {
                Some(serial) => {
                    debug!("Id {} adopts serial {}", id + 1, serial);
                    self.id_to_serial.insert(id, serial);
                }
                None => warn!("No free serial for id {}", id + 1),
            }
        }
    }
}

/// Internally synchronized identity registry.
#[derive(Debug, Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-seeded with preset bindings.
    pub fn with_roster(roster: &Roster) -> Self {
        let mut tables = Tables::default();
        for entry in &roster.entries {
            if entry.id == 0 {
                warn!("Ignoring roster entry with id 0 for {}", entry.serial);
                continue;
            }
            tables.bind(&entry.serial, entry.address);
            tables.id_to_serial.insert(entry.id - 1, entry.serial.clone());
        }
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Discover exactly `count` nodes and bind worker slots `0..count`.
    ///
    /// Addresses without a known serial get a provisional one equal to the
    /// address text. Logical ids without a binding are bound to their slot's
    /// serial; preset bindings are kept.
    pub async fn discover(
        &self,
        transport: &dyn Transport,
        count: usize,
    ) -> Result<Vec<NodeIdentity>> {
        let mut addresses = transport.discover(count).await?;
        if addresses.len() < count {
            return Err(SwarmError::Discovery {
                requested: count,
                found: addresses.len(),
            });
        }
        addresses.truncate(count);

        let mut tables = self.tables.write().await;
        tables.address_to_slot = addresses
            .iter()
            .enumerate()
            .map(|(slot, addr)| (*addr, slot))
            .collect();
        tables.slots = addresses.clone();

        for addr in &addresses {
            if tables.serial_at(*addr).is_none() {
                tables.bind(&addr.to_string(), *addr);
            }
        }
        tables.adopt_orphans();

        let identities = addresses
            .into_iter()
            .enumerate()
            .map(|(id, addr)| NodeIdentity {
                logical_id: id,
                serial: tables.serial_at(addr).unwrap_or_default().to_string(),
                address: addr,
            })
            .collect();
        Ok(identities)
    }

    /// Resolve a logical id to its serial, address and worker slot.
    pub async fn resolve(&self, id: LogicalId) -> Result<Resolved> {
        let tables = self.tables.read().await;
        if id >= tables.slots.len() {
            return Err(SwarmError::UnknownId(id + 1));
        }
        let serial = tables
            .id_to_serial
            .get(&id)
            .ok_or(SwarmError::UnknownId(id + 1))?;
        let address = *tables
            .serial_to_address
            .get(serial)
            .ok_or_else(|| SwarmError::UnresolvedSerial(serial.clone()))?;
        let slot = *tables
            .address_to_slot
            .get(&address)
            .ok_or(SwarmError::UnboundAddress(address))?;
        Ok(Resolved {
            serial: serial.clone(),
            address,
            slot,
        })
    }

    /// Record that `serial` now answers at `address`.
    pub async fn update_address(&self, serial: &str, address: SocketAddr) {
        let mut tables = self.tables.write().await;
        tables.bind(serial, address);
        tables.adopt_orphans();
    }

    /// Point logical `id` at the node with `serial`.
    ///
    /// If another id held `serial`, it takes over the serial `id` had, so
    /// no two ids ever target the same node. Returns the serial's address.
    pub async fn reassign_serial(&self, id: LogicalId, serial: &str) -> Result<SocketAddr> {
        let mut tables = self.tables.write().await;
        let address = *tables
            .serial_to_address
            .get(serial)
            .ok_or_else(|| SwarmError::UnresolvedSerial(serial.to_string()))?;

        let previous = tables.id_to_serial.insert(id, serial.to_string());
        let holder = tables
            .id_to_serial
            .iter()
            .find(|(other, s)| **other != id && s.as_str() == serial)
            .map(|(other, _)| *other);
        if let Some(other) = holder {
            match previous {
                Some(prev) => {
                    tables.id_to_serial.insert(other, prev);
                }
                None => {
                    tables.id_to_serial.remove(&other);
                }
            }
        }
        Ok(address)
    }

    /// Current address of `serial`, if known.
    pub async fn address_of(&self, serial: &str) -> Option<SocketAddr> {
        self.tables.read().await.serial_to_address.get(serial).copied()
    }

    /// Worker addresses in slot order.
    pub async fn addresses(&self) -> Vec<SocketAddr> {
        self.tables.read().await.slots.clone()
    }

    /// Number of discovered nodes.
    pub async fn node_count(&self) -> usize {
        self.tables.read().await.slots.len()
    }
}
