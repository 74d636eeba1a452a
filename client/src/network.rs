//! UDP uplink: forwards aggregated input to the server and tracks the session

use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, CLIENT_VERSION, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Interval between `Connect` attempts until the server answers
pub const CONNECT_RETRY: Duration = Duration::from_millis(500);

/// Session state published to the frame loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UplinkStatus {
    pub connection_id: Option<String>,
    pub tick: u32,
    pub peers: usize,
    pub last_processed_input: Option<u32>,
    pub disconnect_reason: Option<String>,
}

#[derive(Debug)]
pub struct Uplink {
    socket: UdpSocket,
    server_addr: SocketAddr,
    status: watch::Sender<UplinkStatus>,
    connect_retry: Duration,
}

impl Uplink {
    pub async fn connect(
        server_addr: &str,
    ) -> Result<(Self, watch::Receiver<UplinkStatus>), Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;
        let (status, status_rx) = watch::channel(UplinkStatus::default());

        Ok((
            Uplink {
                socket,
                server_addr,
                status,
                connect_retry: CONNECT_RETRY,
            },
            status_rx,
        ))
    }

    pub fn with_connect_retry(mut self, connect_retry: Duration) -> Self {
        self.connect_retry = connect_retry;
        self
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.status.borrow().connection_id.is_some()
    }

    /// No answer yet. An explicit rejection ends the handshake too.
    fn awaiting_handshake(&self) -> bool {
        let status = self.status.borrow();
        status.connection_id.is_none() && status.disconnect_reason.is_none()
    }

    fn handle_packet(&self, packet: Packet) {
        match packet {
            Packet::Connected { connection_id } => {
                info!("Connected! Connection ID: {}", connection_id);
                self.status.send_modify(|s| {
                    s.connection_id = Some(connection_id);
                    s.disconnect_reason = None;
                });
            }

            Packet::ControlSnapshot {
                tick,
                last_processed_input,
                controls,
                ..
            } => {
                self.status.send_modify(|s| {
                    s.tick = tick;
                    s.peers = controls.len();
                    s.last_processed_input = s
                        .connection_id
                        .as_ref()
                        .and_then(|id| last_processed_input.get(id).copied());
                });
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.status.send_modify(|s| {
                    s.connection_id = None;
                    s.disconnect_reason = Some(reason);
                });
            }

            other => warn!("Unexpected packet type: {:?}", other),
        }
    }

    /// Runs until the input channel closes, then says goodbye to the server.
    ///
    /// `Connect` is resent every `connect_retry` until the server answers, so
    /// a lost handshake datagram does not strand the session. Input produced
    /// before the handshake completes is dropped; the aggregator's keep-alive
    /// resends the current state afterwards.
    pub async fn run(
        &mut self,
        mut input_rx: mpsc::UnboundedReceiver<Packet>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server at {}...", self.server_addr);

        let mut buffer = vec![0u8; MAX_PACKET_SIZE];
        let mut retry = interval(self.connect_retry);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = retry.tick(), if self.awaiting_handshake() => {
                    debug!("Sending Connect to {}", self.server_addr);
                    self.send_packet(&Packet::Connect {
                        client_version: CLIENT_VERSION,
                    })
                    .await?;
                }

                result = self.socket.recv_from(&mut buffer) => match result {
                    Ok((len, addr)) if addr == self.server_addr => {
                        match deserialize::<Packet>(&buffer[..len]) {
                            Ok(packet) => self.handle_packet(packet),
                            Err(e) => warn!("Failed to deserialize packet: {}", e),
                        }
                    }
                    Ok((_, addr)) => debug!("Ignoring datagram from {}", addr),
                    Err(e) => error!("Error receiving packet: {}", e),
                },

                packet = input_rx.recv() => match packet {
                    Some(packet) => {
                        if !self.is_connected() {
                            continue;
                        }
                        if let Err(e) = self.send_packet(&packet).await {
                            error!("Error sending input: {}", e);
                        }
                    }
                    None => break,
                },
            }
        }

        if self.is_connected() {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }
        info!("Uplink closed");
        Ok(())
    }
}
