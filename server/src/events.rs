//! Typed server events and the listener registry that dispatches them
//!
//! Transports decode raw datagrams and frames into [`ServerEvent`] values; only
//! the bytes handed to a socket stay opaque. Listeners are registered per
//! [`EventKind`] and run synchronously, in registration order, on the task that
//! calls [`EventEmitter::emit`].

use shared::Packet;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connection,
    Message,
    Disconnect,
}

/// Why a connection left the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer asked to leave or closed its side.
    ClientLeft,
    /// No traffic within the inactivity timeout.
    TimedOut,
    /// The server closed the connection.
    Closed(String),
    /// The underlying transport failed.
    TransportError(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientLeft => f.write_str("client left"),
            DisconnectReason::TimedOut => f.write_str("timed out"),
            DisconnectReason::Closed(reason) => write!(f, "closed by server: {}", reason),
            DisconnectReason::TransportError(e) => write!(f, "transport error: {}", e),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ServerEvent {
    Connection {
        id: String,
        addr: SocketAddr,
    },
    Message {
        id: String,
        packet: Packet,
    },
    Disconnect {
        id: String,
        reason: DisconnectReason,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Connection { .. } => EventKind::Connection,
            ServerEvent::Message { .. } => EventKind::Message,
            ServerEvent::Disconnect { .. } => EventKind::Disconnect,
        }
    }

    /// Connection the event belongs to
    pub fn id(&self) -> &str {
        match self {
            ServerEvent::Connection { id, .. }
            | ServerEvent::Message { id, .. }
            | ServerEvent::Disconnect { id, .. } => id,
        }
    }
}

pub type Listener = Box<dyn FnMut(&ServerEvent)>;

/// Listener registry keyed by event kind
#[derive(Default)]
pub struct EventEmitter {
    listeners: HashMap<EventKind, Vec<Listener>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, kind: EventKind, listener: F)
    where
        F: FnMut(&ServerEvent) + 'static,
    {
        self.listeners
            .entry(kind)
            .or_default()
            .push(Box::new(listener));
    }

    /// Calls every listener registered for the event's kind.
    ///
    /// Returns false when nobody was listening.
    pub fn emit(&mut self, event: &ServerEvent) -> bool {
        match self.listeners.get_mut(&event.kind()) {
            Some(listeners) if !listeners.is_empty() => {
                for listener in listeners.iter_mut() {
                    listener(event);
                }
                true
            }
            _ => false,
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}
