//! UDP transport without native broadcast
//!
//! Handles the datagram side of the protocol:
//! - `Connect` from an unknown address registers a connection (subject to capacity)
//! - `Disconnect` or silence longer than the timeout removes it
//! - every other packet from a known address becomes a message event
//!
//! Socket I/O lives in spawned tasks. They talk to the adapter only through
//! unbounded channels, so the registry is touched by a single task.

use crate::adapter::{BoundCallback, Publisher, ServerAdapter, SocketAdapter, Sockets};
use crate::error::ServerError;
use crate::events::{DisconnectReason, EventEmitter, ServerEvent};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, CLIENT_VERSION, MAX_PACKET_SIZE};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages sent from network tasks to the adapter
#[derive(Debug)]
enum Inbound {
    Datagram { packet: Packet, addr: SocketAddr },
    Close { id: String, reason: String },
    TimeoutCheck,
}

/// Datagram queued for the sender task
#[derive(Debug)]
struct Outbound {
    data: Vec<u8>,
    addr: SocketAddr,
}

/// Connection handle for one UDP peer
#[derive(Debug, Clone)]
pub struct UdpConnection {
    id: String,
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Outbound>,
    control: mpsc::UnboundedSender<Inbound>,
}

impl SocketAdapter for UdpConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn send(&self, message: &[u8], _is_binary: bool) -> Result<(), ServerError> {
        self.outbound
            .send(Outbound {
                data: message.to_vec(),
                addr: self.addr,
            })
            .map_err(|_| ServerError::ConnectionClosed {
                id: self.id.clone(),
            })
    }

    fn close(&self, reason: &str) {
        let packet = Packet::Disconnected {
            reason: reason.to_string(),
        };
        match serialize(&packet) {
            Ok(data) => {
                if let Err(e) = self.send(&data, true) {
                    debug!("Could not notify {} about close: {}", self.id, e);
                }
            }
            Err(e) => error!("Failed to encode close notice: {}", e),
        }

        let _ = self.control.send(Inbound::Close {
            id: self.id.clone(),
            reason: reason.to_string(),
        });
    }
}

pub struct UdpServer {
    host: String,
    max_clients: usize,
    timeout: Duration,
    listening: bool,

    registry: HashMap<String, UdpConnection>,
    peers: HashMap<SocketAddr, String>,
    last_seen: HashMap<String, Instant>,
    next_connection_id: u32,
    pending: VecDeque<ServerEvent>,
    events: EventEmitter,

    // Communication channels
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
}

impl UdpServer {
    pub fn new(host: impl Into<String>, max_clients: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Self {
            host: host.into(),
            max_clients,
            timeout: DEFAULT_TIMEOUT,
            listening: false,
            registry: HashMap::new(),
            peers: HashMap::new(),
            last_seen: HashMap::new(),
            next_connection_id: 1,
            pending: VecDeque::new(),
            events: EventEmitter::new(),
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_receiver(&self, socket: Arc<UdpSocket>) {
        let inbound_tx = self.inbound_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if inbound_tx.send(Inbound::Datagram { packet, addr }).is_err() {
                                debug!("Adapter dropped, stopping UDP receiver");
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outgoing datagram queue
    fn spawn_sender(&self, socket: Arc<UdpSocket>, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>) {
        tokio::spawn(async move {
            while let Some(Outbound { data, addr }) = outbound_rx.recv().await {
                if let Err(e) = socket.send_to(&data, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that periodically asks the adapter to expire silent peers
    fn spawn_timeout_checker(&self) {
        let inbound_tx = self.inbound_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;
                if inbound_tx.send(Inbound::TimeoutCheck).is_err() {
                    break;
                }
            }
        });
    }

    fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        match serialize(packet) {
            Ok(data) => {
                if let Err(e) = self.outbound_tx.send(Outbound { data, addr }) {
                    error!("Failed to queue packet for {}: {}", addr, e);
                }
            }
            Err(e) => error!("Failed to encode packet for {}: {}", addr, e),
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Datagram { packet, addr } => self.handle_datagram(packet, addr),
            Inbound::Close { id, reason } => self.remove(&id, DisconnectReason::Closed(reason)),
            Inbound::TimeoutCheck => self.expire_silent_peers(Instant::now()),
        }
    }

    fn handle_datagram(&mut self, packet: Packet, addr: SocketAddr) {
        let Some(id) = self.peers.get(&addr).cloned() else {
            match packet {
                Packet::Connect { client_version } => self.accept(client_version, addr),
                _ => warn!("Packet from unknown peer {}", addr),
            }
            return;
        };

        self.last_seen.insert(id.clone(), Instant::now());

        match packet {
            Packet::Connect { .. } => {
                // Handshake retry after a lost reply
                self.send_packet(&Packet::Connected { connection_id: id }, addr);
            }
            Packet::Disconnect => self.remove(&id, DisconnectReason::ClientLeft),
            packet => self.pending.push_back(ServerEvent::Message { id, packet }),
        }
    }

    fn accept(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != CLIENT_VERSION {
            let reason = "Protocol version mismatch".to_string();
            self.send_packet(&Packet::Disconnected { reason }, addr);
            return;
        }

        if self.registry.len() >= self.max_clients {
            let reason = "Server full".to_string();
            self.send_packet(&Packet::Disconnected { reason }, addr);
            return;
        }

        let id = self.next_connection_id.to_string();
        self.next_connection_id += 1;

        let connection = UdpConnection {
            id: id.clone(),
            addr,
            outbound: self.outbound_tx.clone(),
            control: self.inbound_tx.clone(),
        };
        self.registry.insert(id.clone(), connection);
        self.peers.insert(addr, id.clone());
        self.last_seen.insert(id.clone(), Instant::now());
        info!("Connection {} registered from {}", id, addr);

        self.send_packet(
            &Packet::Connected {
                connection_id: id.clone(),
            },
            addr,
        );
        self.pending.push_back(ServerEvent::Connection { id, addr });
    }

    /// Drops a connection from the registry. Unknown ids are ignored, so a
    /// connection produces at most one disconnect event.
    fn remove(&mut self, id: &str, reason: DisconnectReason) {
        let Some(connection) = self.registry.remove(id) else {
            return;
        };
        self.peers.remove(&connection.addr);
        self.last_seen.remove(id);
        info!("Connection {} disconnected ({})", id, reason);

        self.pending.push_back(ServerEvent::Disconnect {
            id: id.to_string(),
            reason,
        });
    }

    fn expire_silent_peers(&mut self, now: Instant) {
        let timed_out: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) > self.timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in timed_out {
            self.remove(&id, DisconnectReason::TimedOut);
        }
    }
}

impl ServerAdapter for UdpServer {
    type Socket = UdpConnection;

    fn events(&mut self) -> &mut EventEmitter {
        &mut self.events
    }

    fn publisher(&self) -> Option<&dyn Publisher> {
        None
    }

    fn listen(
        &mut self,
        port: u16,
        on_bound: Option<BoundCallback>,
    ) -> Result<SocketAddr, ServerError> {
        if self.listening {
            return Err(ServerError::AlreadyListening);
        }

        let std_socket =
            std::net::UdpSocket::bind((self.host.as_str(), port)).map_err(|source| {
                ServerError::Bind {
                    addr: format!("{}:{}", self.host, port),
                    source,
                }
            })?;
        std_socket.set_nonblocking(true)?;
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);
        let local_addr = socket.local_addr()?;

        let outbound_rx = self
            .outbound_rx
            .take()
            .ok_or(ServerError::AlreadyListening)?;
        self.spawn_receiver(Arc::clone(&socket));
        self.spawn_sender(socket, outbound_rx);
        self.spawn_timeout_checker();
        self.listening = true;

        info!("UDP server listening on {}", local_addr);
        if let Some(callback) = on_bound {
            callback(local_addr);
        }
        Ok(local_addr)
    }

    fn sockets(&self) -> Sockets<'_, UdpConnection> {
        Sockets::new(&self.registry)
    }

    async fn next_event(&mut self) -> Option<ServerEvent> {
        if !self.listening {
            return None;
        }

        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let inbound = self.inbound_rx.recv().await?;
            self.handle_inbound(inbound);
        }
    }
}
