//! Swarm orchestrator.
//!
//! Runs a script one line at a time on a single task. Movement and query
//! commands are pushed onto per-node queues and return immediately; only
//! `delay`, `sync` and the commands that need replies (`battery_check`,
//! `correct_ip`, `read_pad`) suspend the orchestrator.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use flock_formation::{plan, polygon, round_cm, Maneuver, Shape, SwarmOrigin, Vec3, POLYGON_EDGE};
use flock_transport::{CurvePoint, Transport};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::barrier::{Barrier, Phase, Progress};
use crate::config::SwarmConfig;
use crate::error::{Result, SwarmError};
use crate::ledger::{Ledger, ResponseRecord, NO_RESPONSE};
use crate::logbook;
use crate::queue::CommandEntry;
use crate::registry::{LogicalId, NodeIdentity, Registry};
use crate::script::{classify, Command, Script, Targets};
use crate::worker::Fleet;

const BATTERY_QUERY: &str = "battery?";
const SERIAL_QUERY: &str = "sn?";
const PAD_QUERY: &str = "mid?";

/// Orchestration state for one session.
pub struct Swarm {
    transport: Arc<dyn Transport>,
    registry: Registry,
    ledger: Arc<Ledger>,
    progress: Progress,
    fleet: Option<Fleet>,
    origin: SwarmOrigin,
    config: SwarmConfig,
    started_at: DateTime<Local>,
}

impl Swarm {
    /// Create a session over `transport`.
    pub fn new(transport: Arc<dyn Transport>, config: SwarmConfig) -> Self {
        Self {
            transport,
            registry: Registry::with_roster(&config.roster),
            ledger: Arc::new(Ledger::new()),
            progress: Progress::new(),
            fleet: None,
            origin: SwarmOrigin::new(Vec3::ZERO, config.convention),
            config,
            started_at: Local::now(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn fleet(&self) -> Option<&Fleet> {
        self.fleet.as_ref()
    }

    pub fn origin(&self) -> SwarmOrigin {
        self.origin
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Run every line of `script`, then wait for the fleet to settle.
    ///
    /// Recoverable errors (sync timeouts) are logged and the next line runs,
    /// unless the config makes them fatal.
    pub async fn run(&mut self, script: &Script) -> Result<()> {
        for (line_no, line) in script.lines() {
            let Some(command) = classify(line_no, line)? else {
                continue;
            };
            if let Err(e) = self.execute(command).await {
                if e.is_fatal() || self.config.sync_timeout_fatal {
                    return Err(e);
                }
                warn!("Line {}: continuing after {} ({})", line_no, e, e.code());
            }
        }
        self.join().await;
        Ok(())
    }

    /// Execute one classified command.
    pub async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Comment(text) => {
                info!("[COMMENT] {}", text);
                Ok(())
            }
            Command::Scan(count) => self.scan(count).await.map(|_| ()),
            Command::Target { targets, action } => self.target(targets, &action).await,
            Command::BatteryCheck(threshold) => self.battery_check(threshold).await,
            Command::Delay(duration) => {
                info!("[DELAY] Start Delay for {} second", duration.as_secs_f64());
                tokio::time::sleep(duration).await;
                Ok(())
            }
            Command::CorrectIp => self.correct_ip().await,
            Command::Assign { id, serial } => self.assign(id, &serial).await,
            Command::Sync(timeout) => self.sync(timeout).await,
            Command::ReadPad => self.read_pad().await,
            Command::Poly(sides) => self.poly(sides),
            Command::Formation(shape) => self.formation(shape).await,
            Command::Home(position) => {
                self.origin.position = position;
                info!("[ORIGIN] Home = {}, {}", position, self.origin.convention);
                Ok(())
            }
            Command::Frame(convention) => {
                self.origin.convention = convention;
                info!("[ORIGIN] Home = {}, {}", self.origin.position, convention);
                Ok(())
            }
        }
    }

    /// Discover `count` nodes and start one worker per node.
    pub async fn scan(&mut self, count: usize) -> Result<Vec<NodeIdentity>> {
        let nodes = self.registry.discover(self.transport.as_ref(), count).await?;
        let addresses: Vec<SocketAddr> = nodes.iter().map(|n| n.address).collect();

        self.fleet = Some(
            Fleet::spawn(
                &addresses,
                Arc::clone(&self.transport),
                Arc::clone(&self.ledger),
                self.progress.clone(),
            )
            .await,
        );

        for node in &nodes {
            info!("[SCAN] IP = {}, ID = {}", node.address, node.logical_id);
        }
        Ok(nodes)
    }

    async fn target(&self, targets: Targets, action: &str) -> Result<()> {
        let ids: Vec<LogicalId> = match targets {
            Targets::All => (0..self.registry.node_count().await).collect(),
            Targets::One(0) => return Err(SwarmError::UnknownId(0)),
            Targets::One(id) => vec![id - 1],
        };

        // Resolve everything first so a bad id enqueues nothing.
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            resolved.push(self.registry.resolve(id).await?);
        }

        let fleet = self.fleet.as_ref().ok_or(SwarmError::NotScanned("target"))?;
        for node in resolved {
            if let Some(queue) = fleet.queue(node.slot) {
                queue.push(CommandEntry::text(action));
            }
            info!(
                "[ACTION] SN = {}, IP = {}, ID = {}, ACTION = {}",
                node.serial, node.address, node.slot, action
            );
        }
        Ok(())
    }

    async fn battery_check(&self, threshold: i64) -> Result<()> {
        let fleet = self.fleet.as_ref().ok_or(SwarmError::NotScanned("battery_check"))?;
        fleet.broadcast(CommandEntry::text(BATTERY_QUERY));
        if let Err(e) = self.barrier().wait(self.config.join_timeout).await {
            warn!("[BATTERY] {}", e);
        }

        let mut low = None;
        for (slot, record) in self.ledger.last_records().await.into_iter().enumerate() {
            let address = fleet.queues()[slot].address();
            let level = battery_level(address, record.as_ref())?;
            info!("[BATTERY] IP = {}, LIFE = {}%", address, level);
            if level < threshold && low.is_none() {
                low = Some((address, level));
            }
        }

        match low {
            Some((address, level)) => Err(SwarmError::BatteryThreshold {
                address,
                level,
                threshold,
            }),
            None => {
                info!("[BATTERY] Passed battery check");
                Ok(())
            }
        }
    }

    async fn correct_ip(&self) -> Result<()> {
        let fleet = self.fleet.as_ref().ok_or(SwarmError::NotScanned("correct_ip"))?;
        fleet.broadcast(CommandEntry::text(SERIAL_QUERY));
        if let Err(e) = self.barrier().wait(self.config.join_timeout).await {
            warn!("[CORRECT_IP] {}", e);
        }

        for record in self.ledger.last_records().await.into_iter().flatten() {
            match answer_to(&record, SERIAL_QUERY) {
                Some(serial) => {
                    let previous = self.registry.address_of(serial).await;
                    self.registry.update_address(serial, record.address).await;
                    match previous {
                        Some(old) if old != record.address => info!(
                            "[CORRECT_IP] SN = {}, IP = {} (was {})",
                            serial, record.address, old
                        ),
                        _ => info!("[CORRECT_IP] SN = {}, IP = {}", serial, record.address),
                    }
                }
                None => warn!("[CORRECT_IP] No serial from {}", record.address),
            }
        }
        Ok(())
    }

    async fn assign(&self, id: usize, serial: &str) -> Result<()> {
        if id == 0 {
            return Err(SwarmError::UnknownId(0));
        }
        let address = self.registry.reassign_serial(id - 1, serial).await?;
        info!("[IP_SN_ID] IP = {}, SN = {}, ID = {}", address, serial, id);
        Ok(())
    }

    async fn sync(&self, timeout: Duration) -> Result<()> {
        info!("[SYNC] Sync for {} seconds", timeout.as_secs_f64());
        tokio::time::sleep(self.config.sync_settle).await;

        let result = self.sync_phases(timeout).await;
        if let Err(e) = &result {
            warn!("[SYNC] Failed to sync; timeout exceeded ({})", e);
        }
        result
    }

    async fn sync_phases(&self, timeout: Duration) -> Result<()> {
        let barrier = self.barrier();
        barrier.wait_for(Phase::QueuesDrained, timeout).await?;
        info!("[SYNC] All queues empty and all commands sent");
        barrier.wait_for(Phase::ResponsesReceived, timeout).await?;
        info!("[SYNC] All response received");
        Ok(())
    }

    async fn read_pad(&self) -> Result<()> {
        let fleet = self.fleet.as_ref().ok_or(SwarmError::NotScanned("read_pad"))?;
        for command in ["command", "mon", "takeoff", PAD_QUERY] {
            fleet.broadcast(CommandEntry::text(command));
        }
        if let Err(e) = self.barrier().wait(self.config.join_timeout).await {
            warn!("[READ_PAD] {}", e);
        }

        for record in self.ledger.last_records().await.into_iter().flatten() {
            let pad = answer_to(&record, PAD_QUERY).unwrap_or("none");
            info!("[READ_PAD] IP = {}, PAD = {}", record.address, pad);
        }
        fleet.broadcast(CommandEntry::text("land"));
        Ok(())
    }

    fn poly(&self, sides: u32) -> Result<()> {
        let fleet = self.fleet.as_ref().ok_or(SwarmError::NotScanned("poly"))?;
        let legs = polygon(sides, POLYGON_EDGE)?;
        info!("[POLY] {} sides, {}", sides, legs[0].turn);

        for queue in fleet.queues() {
            for leg in &legs {
                queue.push(CommandEntry::text(leg.advance.to_string()));
                queue.push(CommandEntry::text(leg.turn.to_string()));
            }
        }
        Ok(())
    }

    async fn formation(&mut self, shape: Shape) -> Result<()> {
        let fleet = self.fleet.as_ref().ok_or(SwarmError::NotScanned(shape.name()))?;
        let keyframes = plan(shape, &self.origin, fleet.len())?;
        info!(
            "[FORMATION] {} with {} keyframe(s), {}",
            shape,
            keyframes.len(),
            self.origin.convention
        );

        // Node index in the tables is the logical id.
        let mut slots = Vec::with_capacity(fleet.len());
        for id in 0..fleet.len() {
            slots.push(self.registry.resolve(id).await?.slot);
        }

        for keyframe in keyframes {
            for (maneuver, &slot) in keyframe.maneuvers.iter().zip(&slots) {
                let Some(queue) = fleet.queue(slot) else {
                    continue;
                };
                match maneuver {
                    Maneuver::Steps(steps) => {
                        for step in steps {
                            queue.push(CommandEntry::text(step.to_string()));
                        }
                    }
                    Maneuver::Curve { entry, exit } => {
                        queue.push(CommandEntry::Curve {
                            entry: curve_point(*entry),
                            exit: curve_point(*exit),
                        });
                    }
                }
            }
            info!("[FORMATION] {} keyframe {} queued", shape, keyframe.index + 1);
        }

        // Table formations finish on the origin, which becomes the new frame zero.
        if shape != Shape::Circle && !self.origin.position.is_negligible() {
            self.origin.position = Vec3::ZERO;
            info!("[ORIGIN] Home reached; home = {}, {}", Vec3::ZERO, self.origin.convention);
        }
        Ok(())
    }

    /// Wait for the fleet to settle; timeouts are logged, not raised.
    pub async fn join(&self) {
        if let Err(e) = self.barrier().wait(self.config.join_timeout).await {
            warn!("[SYNC] {}", e);
        }
    }

    /// Send `land` to every known address, concurrently.
    ///
    /// Known means connected according to the transport or served by a
    /// worker of the current fleet.
    pub async fn land_all(&self) {
        let mut addresses = self.transport.addresses().await;
        for addr in self.registry.addresses().await {
            if !addresses.contains(&addr) {
                addresses.push(addr);
            }
        }

        let mut landings = JoinSet::new();
        for addr in addresses {
            let transport = Arc::clone(&self.transport);
            landings.spawn(async move { (addr, transport.send(addr, "land").await) });
        }
        while let Some(joined) = landings.join_next().await {
            match joined {
                Ok((addr, Ok(_))) => info!("[QUIT_ALL] {} landing", addr),
                Ok((addr, Err(e))) => error!("[QUIT_ALL] {} did not acknowledge land: {}", addr, e),
                Err(e) => error!("[QUIT_ALL] land task failed: {}", e),
            }
        }
    }

    /// Write the session log.
    pub async fn save_log(&self) -> Result<PathBuf> {
        logbook::save(&self.config.log_dir, self.started_at, &self.ledger.histories().await)
    }

    fn barrier(&self) -> Barrier<'_> {
        Barrier::new(self.fleet.as_ref(), &self.ledger, &self.progress)
    }
}

/// Reply text of `record` if it answers `query`.
fn answer_to<'r>(record: &'r ResponseRecord, query: &str) -> Option<&'r str> {
    if record.request != query {
        return None;
    }
    record
        .response
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty() && *r != NO_RESPONSE)
}

fn battery_level(address: SocketAddr, record: Option<&ResponseRecord>) -> Result<i64> {
    let response = record.and_then(|r| answer_to(r, BATTERY_QUERY));
    response
        .and_then(|r| r.parse().ok())
        .ok_or_else(|| SwarmError::BatteryReading {
            address,
            response: response.unwrap_or(NO_RESPONSE).to_string(),
        })
}

fn curve_point(v: Vec3) -> CurvePoint {
    CurvePoint::new(round_cm(v.x) as i32, round_cm(v.y) as i32, round_cm(v.z) as i32)
}
