//! WebSocket transport with native topic broadcast
//!
//! A connection is subscribed to [`BROADCAST_TOPIC`] only once the adapter
//! has admitted it into the registry, so native publish and the per-socket
//! fallback reach the same set of peers.
//! Publishing wraps the payload in a single [`Message`] whose buffer is a
//! reference-counted [`Bytes`]; each subscriber receives a clone of the same
//! allocation, so a broadcast costs one encode no matter how many peers are
//! connected.

use crate::adapter::{BoundCallback, Publisher, ServerAdapter, SocketAdapter, Sockets};
use crate::error::ServerError;
use crate::events::{DisconnectReason, EventEmitter, ServerEvent};
use bincode::{deserialize, serialize};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{Packet, BROADCAST_TOPIC};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

/// Per-topic broadcast buffer depth before slow subscribers start lagging
pub const TOPIC_CAPACITY: usize = 64;

/// Topic subscription handed to a connection task once it is admitted
type Admission = oneshot::Sender<broadcast::Receiver<Message>>;

/// Messages sent from connection tasks to the adapter
#[derive(Debug)]
enum WsInbound {
    Opened {
        connection: WsConnection,
        admit: Admission,
    },
    Frame { id: String, packet: Packet },
    Closed { id: String, reason: DisconnectReason },
}

/// Topic registry backing the native publish
#[derive(Debug, Clone, Default)]
pub struct TopicHub {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Message>>>>,
}

impl TopicHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Message> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.get(topic).map_or(0, broadcast::Sender::receiver_count)
    }
}

impl Publisher for TopicHub {
    fn publish(&self, topic: &str, message: Bytes, is_binary: bool) -> bool {
        let message = if is_binary {
            Message::Binary(message)
        } else {
            match Utf8Bytes::try_from(message) {
                Ok(text) => Message::Text(text),
                Err(e) => {
                    warn!("Refusing to publish invalid UTF-8 on '{}': {}", topic, e);
                    return false;
                }
            }
        };

        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        match topics.get(topic) {
            Some(sender) => match sender.send(message) {
                Ok(receivers) => {
                    debug!("Published on '{}' to {} subscribers", topic, receivers);
                    true
                }
                Err(_) => false,
            },
            None => false,
        }
    }
}

/// Connection handle for one WebSocket peer
#[derive(Debug, Clone)]
pub struct WsConnection {
    id: String,
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Message>,
}

impl WsConnection {
    fn queue(&self, message: Message) -> Result<(), ServerError> {
        self.outbound
            .send(message)
            .map_err(|_| ServerError::ConnectionClosed {
                id: self.id.clone(),
            })
    }
}

impl SocketAdapter for WsConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn send(&self, message: &[u8], is_binary: bool) -> Result<(), ServerError> {
        let message = if is_binary {
            Message::Binary(Bytes::copy_from_slice(message))
        } else {
            let text = std::str::from_utf8(message).map_err(|_| ServerError::InvalidText)?;
            Message::Text(Utf8Bytes::from(text.to_string()))
        };
        self.queue(message)
    }

    fn close(&self, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Utf8Bytes::from(reason.to_string()),
        };
        if let Err(e) = self.queue(Message::Close(Some(frame))) {
            debug!("Close requested for finished connection: {}", e);
        }
    }
}

pub struct WsServer {
    host: String,
    max_clients: usize,
    listening: bool,

    registry: HashMap<String, WsConnection>,
    events: EventEmitter,
    topics: TopicHub,
    next_connection_id: Arc<AtomicU32>,

    inbound_tx: mpsc::UnboundedSender<WsInbound>,
    inbound_rx: mpsc::UnboundedReceiver<WsInbound>,
}

impl WsServer {
    pub fn new(host: impl Into<String>, max_clients: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Self {
            host: host.into(),
            max_clients,
            listening: false,
            registry: HashMap::new(),
            events: EventEmitter::new(),
            topics: TopicHub::new(),
            next_connection_id: Arc::new(AtomicU32::new(1)),
            inbound_tx,
            inbound_rx,
        }
    }

    pub fn topics(&self) -> &TopicHub {
        &self.topics
    }

    /// Applies a connection-task notification to the registry.
    fn handle_inbound(&mut self, inbound: WsInbound) -> Option<ServerEvent> {
        match inbound {
            WsInbound::Opened { connection, admit } => self.register(connection, admit),
            WsInbound::Frame { id, packet } => {
                if !self.registry.contains_key(&id) {
                    return None;
                }
                match packet {
                    Packet::Connect { .. } => None,
                    Packet::Disconnect => {
                        let connection = self.registry.remove(&id)?;
                        connection.close("client left");
                        info!("Connection {} from {} left", id, connection.addr);
                        Some(ServerEvent::Disconnect {
                            id,
                            reason: DisconnectReason::ClientLeft,
                        })
                    }
                    packet => Some(ServerEvent::Message { id, packet }),
                }
            }
            WsInbound::Closed { id, reason } => {
                let connection = self.registry.remove(&id)?;
                info!(
                    "Connection {} from {} disconnected ({})",
                    id, connection.addr, reason
                );
                Some(ServerEvent::Disconnect { id, reason })
            }
        }
    }

    /// Admits a freshly opened connection, or rejects it when the server is
    /// full. Dropping `admit` tells the task it was rejected.
    fn register(&mut self, connection: WsConnection, admit: Admission) -> Option<ServerEvent> {
        if self.registry.len() >= self.max_clients {
            warn!("Rejecting {}: server full", connection.addr);
            notify(&connection, &Packet::Disconnected {
                reason: "Server full".to_string(),
            });
            connection.close("Server full");
            return None;
        }

        let id = connection.id.clone();
        let addr = connection.addr;
        if admit.send(self.topics.subscribe(BROADCAST_TOPIC)).is_err() {
            debug!("Connection {} from {} ended before admission", id, addr);
            return None;
        }
        notify(&connection, &Packet::Connected {
            connection_id: id.clone(),
        });
        self.registry.insert(id.clone(), connection);
        info!("Connection {} registered from {}", id, addr);

        Some(ServerEvent::Connection { id, addr })
    }
}

fn notify(connection: &WsConnection, packet: &Packet) {
    match serialize(packet) {
        Ok(data) => {
            if let Err(e) = connection.send(&data, true) {
                debug!("Failed to notify {}: {}", connection.id, e);
            }
        }
        Err(e) => error!("Failed to encode packet for {}: {}", connection.id, e),
    }
}

async fn accept_loop(
    listener: TcpListener,
    inbound_tx: mpsc::UnboundedSender<WsInbound>,
    next_connection_id: Arc<AtomicU32>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if inbound_tx.is_closed() {
                    break;
                }
                let id = next_connection_id.fetch_add(1, Ordering::Relaxed).to_string();
                tokio::spawn(handle_connection(stream, addr, id, inbound_tx.clone()));
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: String,
    inbound_tx: mpsc::UnboundedSender<WsInbound>,
) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut sink, mut frames) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let (admit, admitted) = oneshot::channel();

    let connection = WsConnection {
        id: id.clone(),
        addr,
        outbound: outbound_tx,
    };
    if inbound_tx.send(WsInbound::Opened { connection, admit }).is_err() {
        return;
    }

    let mut published = match admitted.await {
        Ok(receiver) => receiver,
        Err(_) => {
            // Rejected: flush the queued reason and close frame, then stop.
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
            let _ = sink.close().await;
            return;
        }
    };

    let reason = loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(Message::Binary(data))) => match deserialize::<Packet>(&data) {
                    Ok(packet) => {
                        let frame = WsInbound::Frame { id: id.clone(), packet };
                        if inbound_tx.send(frame).is_err() {
                            break DisconnectReason::Closed("server shut down".to_string());
                        }
                    }
                    Err(e) => warn!("Failed to deserialize frame from {}: {}", addr, e),
                },
                Some(Ok(Message::Text(_))) => warn!("Ignoring text frame from {}", addr),
                Some(Ok(Message::Close(_))) | None => break DisconnectReason::ClientLeft,
                Some(Ok(_)) => {}
                Some(Err(e)) => break DisconnectReason::TransportError(e.to_string()),
            },

            outgoing = outbound_rx.recv() => match outgoing {
                Some(message) => {
                    let close_reason = match &message {
                        Message::Close(frame) => Some(
                            frame
                                .as_ref()
                                .map(|f| f.reason.as_str().to_string())
                                .unwrap_or_default(),
                        ),
                        _ => None,
                    };
                    if let Err(e) = sink.send(message).await {
                        break DisconnectReason::TransportError(e.to_string());
                    }
                    if let Some(reason) = close_reason {
                        break DisconnectReason::Closed(reason);
                    }
                }
                None => break DisconnectReason::Closed("server shut down".to_string()),
            },

            message = published.recv() => match message {
                Ok(message) => {
                    if let Err(e) = sink.send(message).await {
                        break DisconnectReason::TransportError(e.to_string());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Connection {} lagged, skipped {} broadcasts", id, missed);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break DisconnectReason::Closed("server shut down".to_string());
                }
            },
        }
    };

    let _ = sink.close().await;
    let _ = inbound_tx.send(WsInbound::Closed { id, reason });
}

impl ServerAdapter for WsServer {
    type Socket = WsConnection;

    fn events(&mut self) -> &mut EventEmitter {
        &mut self.events
    }

    fn publisher(&self) -> Option<&dyn Publisher> {
        Some(&self.topics)
    }

    fn listen(
        &mut self,
        port: u16,
        on_bound: Option<BoundCallback>,
    ) -> Result<SocketAddr, ServerError> {
        if self.listening {
            return Err(ServerError::AlreadyListening);
        }

        let std_listener =
            std::net::TcpListener::bind((self.host.as_str(), port)).map_err(|source| {
                ServerError::Bind {
                    addr: format!("{}:{}", self.host, port),
                    source,
                }
            })?;
        std_listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        tokio::spawn(accept_loop(
            listener,
            self.inbound_tx.clone(),
            Arc::clone(&self.next_connection_id),
        ));
        self.listening = true;

        info!("WebSocket server listening on ws://{}", local_addr);
        if let Some(callback) = on_bound {
            callback(local_addr);
        }
        Ok(local_addr)
    }

    fn sockets(&self) -> Sockets<'_, WsConnection> {
        Sockets::new(&self.registry)
    }

    async fn next_event(&mut self) -> Option<ServerEvent> {
        if !self.listening {
            return None;
        }

        loop {
            let inbound = self.inbound_rx.recv().await?;
            if let Some(event) = self.handle_inbound(inbound) {
                return Some(event);
            }
        }
    }
}
