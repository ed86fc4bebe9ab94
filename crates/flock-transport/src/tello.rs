//! UDP transport for Tello EDU nodes.
//!
//! One socket is shared by every node. A background task receives replies
//! and routes them by source address to a per-node inbox, so each caller of
//! [`Transport::send`] only ever sees replies from the node it addressed.
//!
//! Discovery sweeps a /24 subnet with the SDK `command` keyword (which also
//! switches the node into SDK mode) and collects every address that answers
//! `ok`. Nodes with a command in flight are skipped by the sweep, and their
//! `ok` always goes to the waiting caller.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::{Transport, DEFAULT_CURVE_SPEED};

/// SDK command port on every Tello.
pub const TELLO_PORT: u16 = 8889;

/// Keyword that enters SDK mode; nodes answer `ok`.
const SDK_ENTER: &str = "command";

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TelloConfig {
    /// Local address to bind to
    pub bind: SocketAddr,
    /// Command port on each node
    pub drone_port: u16,
    /// Network address of the /24 subnet swept during discovery
    pub subnet: Ipv4Addr,
    /// How long to wait for each reply
    pub response_timeout: Duration,
    /// How long discovery keeps sweeping before giving up
    pub discovery_timeout: Duration,
    /// Curve speed in cm/s
    pub curve_speed: u32,
}

impl Default for TelloConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, TELLO_PORT)),
            drone_port: TELLO_PORT,
            subnet: Ipv4Addr::new(192, 168, 10, 0),
            response_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(5),
            curve_speed: DEFAULT_CURVE_SPEED,
        }
    }
}

impl TelloConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: env_or("FLOCK_BIND", defaults.bind),
            drone_port: env_or("FLOCK_DRONE_PORT", defaults.drone_port),
            subnet: env_or("FLOCK_SUBNET", defaults.subnet),
            response_timeout: Duration::from_secs_f64(env_or(
                "FLOCK_RESPONSE_TIMEOUT_SECS",
                defaults.response_timeout.as_secs_f64(),
            )),
            discovery_timeout: Duration::from_secs_f64(env_or(
                "FLOCK_DISCOVERY_TIMEOUT_SECS",
                defaults.discovery_timeout.as_secs_f64(),
            )),
            curve_speed: env_or("FLOCK_CURVE_SPEED", defaults.curve_speed),
        }
    }
}

/// Read and parse `key`, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Reply inbox for one node.
struct Inbox {
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    /// Set while a `send` waits for this node's reply.
    awaiting: AtomicBool,
}

impl Inbox {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            awaiting: AtomicBool::new(false),
        }
    }

    fn is_awaiting(&self) -> bool {
        self.awaiting.load(Ordering::Acquire)
    }
}

/// Clears [`Inbox::awaiting`] when the send finishes or is cancelled.
struct AwaitGuard<'a>(&'a Inbox);

impl<'a> AwaitGuard<'a> {
    fn new(inbox: &'a Inbox) -> Self {
        inbox.awaiting.store(true, Ordering::Release);
        Self(inbox)
    }
}

impl Drop for AwaitGuard<'_> {
    fn drop(&mut self) {
        self.0.awaiting.store(false, Ordering::Release);
    }
}

/// State shared with the receive loop.
#[derive(Default)]
struct Shared {
    inboxes: RwLock<HashMap<SocketAddr, Arc<Inbox>>>,
    discovery: Mutex<Option<mpsc::UnboundedSender<SocketAddr>>>,
    nodes: RwLock<Vec<SocketAddr>>,
}

/// Tello EDU transport over a single UDP socket.
pub struct TelloTransport {
    socket: Arc<UdpSocket>,
    shared: Arc<Shared>,
    config: TelloConfig,
}

impl TelloTransport {
    /// Bind the command socket and start the receive loop.
    pub async fn bind(config: TelloConfig) -> Result<Self> {
        let domain = if config.bind.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.bind(&config.bind.into())?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);

        info!("Tello transport bound to {}", socket.local_addr()?);

        let shared = Arc::new(Shared::default());
        tokio::spawn(receive_loop(Arc::clone(&socket), Arc::clone(&shared)));

        Ok(Self {
            socket,
            shared,
            config,
        })
    }

    /// Local address the command socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    async fn inbox(&self, addr: SocketAddr) -> Arc<Inbox> {
        if let Some(inbox) = self.shared.inboxes.read().await.get(&addr) {
            return Arc::clone(inbox);
        }
        let mut inboxes = self.shared.inboxes.write().await;
        Arc::clone(inboxes.entry(addr).or_insert_with(|| Arc::new(Inbox::new())))
    }

    async fn sweep(&self, skip: &[SocketAddr]) {
        let busy: Vec<SocketAddr> = self
            .shared
            .inboxes
            .read()
            .await
            .iter()
            .filter(|(_, inbox)| inbox.is_awaiting())
            .map(|(addr, _)| *addr)
            .collect();

        let [a, b, c, _] = self.config.subnet.octets();
        for host in 1..=254u8 {
            let addr = SocketAddr::from((Ipv4Addr::new(a, b, c, host), self.config.drone_port));
            if skip.contains(&addr) || busy.contains(&addr) {
                continue;
            }
            if let Err(e) = self.socket.send_to(SDK_ENTER.as_bytes(), addr).await {
                debug!("Discovery probe to {} failed: {}", addr, e);
            }
        }
    }
}

#[async_trait]
impl Transport for TelloTransport {
    async fn discover(&self, count: usize) -> Result<Vec<SocketAddr>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.shared.discovery.lock().await = Some(tx);

        let deadline = Instant::now() + self.config.discovery_timeout;
        let mut resweep = tokio::time::interval(Duration::from_secs(1));
        let mut found: Vec<SocketAddr> = Vec::with_capacity(count);

        while found.len() < count {
            tokio::select! {
                _ = resweep.tick() => self.sweep(&found).await,
                reply = timeout_at(deadline, rx.recv()) => match reply {
                    Ok(Some(addr)) => {
                        if !found.contains(&addr) {
                            info!("Found node at {}", addr);
                            found.push(addr);
                        }
                    }
                    Ok(None) | Err(_) => break,
                },
            }
        }

        *self.shared.discovery.lock().await = None;

        if found.len() < count {
            return Err(TransportError::Discovery {
                requested: count,
                found: found.len(),
            });
        }

        for addr in &found {
            self.inbox(*addr).await;
        }
        *self.shared.nodes.write().await = found.clone();
        Ok(found)
    }

    async fn send(&self, addr: SocketAddr, command: &str) -> Result<String> {
        let inbox = self.inbox(addr).await;
        let mut rx = inbox.rx.lock().await;
        let _awaiting = AwaitGuard::new(&inbox);

        // Late replies to an earlier, timed-out command are not ours.
        while rx.try_recv().is_ok() {}

        self.socket.send_to(command.as_bytes(), addr).await?;
        debug!("Sent {:?} to {}", command, addr);

        match timeout(self.config.response_timeout, rx.recv()).await {
            Ok(Some(reply)) => {
                debug!("Reply {:?} from {}", reply, addr);
                Ok(reply)
            }
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout {
                addr,
                timeout: self.config.response_timeout,
            }),
        }
    }

    async fn addresses(&self) -> Vec<SocketAddr> {
        self.shared.nodes.read().await.clone()
    }

    fn curve_speed(&self) -> u32 {
        self.config.curve_speed
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>) {
    let mut buf = vec![0u8; 2048];
    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("UDP receive failed: {}", e);
                continue;
            }
        };
        let text = String::from_utf8_lossy(&buf[..len]).trim().to_string();

        let inbox = shared.inboxes.read().await.get(&from).cloned();
        let awaited = inbox.as_ref().is_some_and(|i| i.is_awaiting());

        if text == "ok" && !awaited {
            if let Some(tx) = shared.discovery.lock().await.as_ref() {
                let _ = tx.send(from);
                continue;
            }
        }

        match inbox {
            Some(inbox) => {
                let _ = inbox.tx.send(text);
            }
            None => debug!("Dropping {:?} from unknown sender {}", text, from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> TelloConfig {
        TelloConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            response_timeout: Duration::from_millis(300),
            discovery_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    /// A node that answers `ok` to `command` and `reply` to everything else.
    async fn fake_node(reply: &'static str) -> SocketAddr {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            while let Ok((n, from)) = sock.recv_from(&mut buf).await {
                let answer = if &buf[..n] == SDK_ENTER.as_bytes() { "ok" } else { reply };
                let _ = sock.send_to(answer.as_bytes(), from).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_send_returns_reply() {
        let node = fake_node("87").await;
        let transport = TelloTransport::bind(loopback_config()).await.unwrap();

        let reply = transport.send(node, "battery?").await.unwrap();
        assert_eq!(reply, "87");
    }

    #[tokio::test]
    async fn test_silent_node_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();
        let transport = TelloTransport::bind(loopback_config()).await.unwrap();

        let err = transport.send(addr, "takeoff").await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        drop(silent);
    }

    #[tokio::test]
    async fn test_discovery_finds_loopback_node() {
        let node = fake_node("ok").await;
        let config = TelloConfig {
            subnet: Ipv4Addr::new(127, 0, 0, 0),
            drone_port: node.port(),
            ..loopback_config()
        };
        let transport = TelloTransport::bind(config).await.unwrap();

        let found = transport.discover(1).await.unwrap();
        assert_eq!(found, vec![node]);
        assert_eq!(transport.addresses().await, vec![node]);
    }

    #[tokio::test]
    async fn test_reply_in_flight_is_not_taken_by_discovery() {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let node = sock.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            while let Ok((n, from)) = sock.recv_from(&mut buf).await {
                if &buf[..n] != SDK_ENTER.as_bytes() {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                let _ = sock.send_to(b"ok", from).await;
            }
        });
        let transport = Arc::new(
            TelloTransport::bind(TelloConfig {
                subnet: Ipv4Addr::new(127, 0, 0, 0),
                drone_port: node.port(),
                response_timeout: Duration::from_secs(1),
                discovery_timeout: Duration::from_secs(3),
                ..loopback_config()
            })
            .await
            .unwrap(),
        );

        let sender = Arc::clone(&transport);
        let takeoff = tokio::spawn(async move { sender.send(node, "takeoff").await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let found = transport.discover(1).await.unwrap();
        assert_eq!(takeoff.await.unwrap().unwrap(), "ok");
        assert_eq!(found, vec![node]);
    }

    #[tokio::test]
    async fn test_discovery_reports_shortfall() {
        let node = fake_node("ok").await;
        let config = TelloConfig {
            subnet: Ipv4Addr::new(127, 0, 0, 0),
            drone_port: node.port(),
            ..loopback_config()
        };
        let transport = TelloTransport::bind(config).await.unwrap();

        let err = transport.discover(2).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Discovery {
                requested: 2,
                found: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_curve_uses_configured_speed() {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap();
        let transport = TelloTransport::bind(TelloConfig {
            curve_speed: 45,
            ..loopback_config()
        })
        .await
        .unwrap();

        let echo = tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let (n, from) = sock.recv_from(&mut buf).await.unwrap();
            sock.send_to(b"ok", from).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        let reply = transport
            .send_curve(
                addr,
                crate::CurvePoint::new(60, 60, 0),
                crate::CurvePoint::new(60, -60, 0),
            )
            .await
            .unwrap();
        assert_eq!(reply, "ok");
        assert_eq!(echo.await.unwrap(), "curve 60 60 0 60 -60 0 45");
    }
}
