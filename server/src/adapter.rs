//! Transport-facing contracts: per-connection sockets and the server adapter
//!
//! A transport implements [`ServerAdapter`] and owns the connection registry.
//! Native broadcast is a capability, not a method every transport must fake:
//! [`ServerAdapter::publisher`] returns `None` when the transport cannot fan
//! out by itself, and [`broadcast`] then walks the registry instead.

use crate::error::ServerError;
use crate::events::{EventEmitter, EventKind, ServerEvent};
use bytes::Bytes;
use log::{debug, warn};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;

/// Handle to one live connection
pub trait SocketAdapter {
    fn id(&self) -> &str;

    fn addr(&self) -> SocketAddr;

    /// Queues `message` for this connection without waiting for the write.
    fn send(&self, message: &[u8], is_binary: bool) -> Result<(), ServerError>;

    /// Asks the transport to drop the connection. The matching disconnect
    /// event is produced later by [`ServerAdapter::next_event`].
    fn close(&self, reason: &str);
}

/// Native topic broadcast offered by some transports
pub trait Publisher {
    /// Pushes `message` to every subscriber of `topic`.
    ///
    /// Returns true when at least one subscriber was reached.
    fn publish(&self, topic: &str, message: Bytes, is_binary: bool) -> bool;
}

/// Invoked once with the bound address after a successful `listen`
pub type BoundCallback = Box<dyn FnOnce(SocketAddr)>;

pub trait ServerAdapter {
    type Socket: SocketAdapter;

    fn events(&mut self) -> &mut EventEmitter;

    fn on<F>(&mut self, kind: EventKind, listener: F) -> &mut Self
    where
        Self: Sized,
        F: FnMut(&ServerEvent) + 'static,
    {
        self.events().add(kind, listener);
        self
    }

    fn emit(&mut self, event: &ServerEvent) -> bool {
        self.events().emit(event)
    }

    /// Native broadcast, when the transport has one.
    fn publisher(&self) -> Option<&dyn Publisher>;

    /// Binds the transport and starts its network tasks.
    ///
    /// Must be called from within a tokio runtime. A bind failure is final:
    /// nothing is spawned and the adapter stays unbound.
    fn listen(
        &mut self,
        port: u16,
        on_bound: Option<BoundCallback>,
    ) -> Result<SocketAddr, ServerError>;

    fn sockets(&self) -> Sockets<'_, Self::Socket>;

    /// Waits for the next transport event, applying registry changes before
    /// returning it. Yields `None` when the adapter is not listening or the
    /// transport has shut down.
    fn next_event(&mut self) -> impl Future<Output = Option<ServerEvent>>;
}

/// Read-only view over a connection registry
pub struct Sockets<'a, S> {
    registry: &'a HashMap<String, S>,
}

impl<'a, S: SocketAdapter> Sockets<'a, S> {
    pub fn new(registry: &'a HashMap<String, S>) -> Self {
        Self { registry }
    }

    pub fn size(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&'a S> {
        self.registry.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a S)> + 'a {
        let registry: &'a HashMap<String, S> = self.registry;
        registry.iter().map(|(id, socket)| (id.as_str(), socket))
    }
}

/// How a broadcast was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the transport's native publish.
    Published { accepted: bool },
    /// Sent to each registered connection individually.
    FannedOut { sent: usize, failed: usize },
}

/// Sends `message` to every connection, using native publish when available.
///
/// Without a publisher every registry entry is treated as a subscriber of
/// `topic` and receives exactly one send.
pub fn broadcast<A: ServerAdapter>(
    adapter: &A,
    topic: &str,
    message: Bytes,
    is_binary: bool,
) -> Delivery {
    if let Some(publisher) = adapter.publisher() {
        let accepted = publisher.publish(topic, message, is_binary);
        return Delivery::Published { accepted };
    }

    let mut sent = 0;
    let mut failed = 0;
    for (id, socket) in adapter.sockets().iter() {
        match socket.send(&message, is_binary) {
            Ok(()) => sent += 1,
            Err(e) => {
                warn!("Failed to send broadcast to {}: {}", id, e);
                failed += 1;
            }
        }
    }

    debug!(
        "Fan-out broadcast on '{}': {} sent, {} failed",
        topic, sent, failed
    );
    Delivery::FannedOut { sent, failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type SendLog = Rc<RefCell<Vec<(String, Vec<u8>)>>>;

    struct RecordingSocket {
        id: String,
        log: SendLog,
        broken: bool,
    }

    impl SocketAdapter for RecordingSocket {
        fn id(&self) -> &str {
            &self.id
        }

        fn addr(&self) -> SocketAddr {
            "127.0.0.1:9000".parse().unwrap()
        }

        fn send(&self, message: &[u8], _is_binary: bool) -> Result<(), ServerError> {
            if self.broken {
                return Err(ServerError::ConnectionClosed {
                    id: self.id.clone(),
                });
            }
            self.log
                .borrow_mut()
                .push((self.id.clone(), message.to_vec()));
            Ok(())
        }

        fn close(&self, _reason: &str) {}
    }

    struct RecordingPublisher {
        published: RefCell<Vec<String>>,
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, topic: &str, _message: Bytes, _is_binary: bool) -> bool {
            self.published.borrow_mut().push(topic.to_string());
            true
        }
    }

    struct MockServer {
        events: EventEmitter,
        registry: HashMap<String, RecordingSocket>,
        publisher: Option<RecordingPublisher>,
    }

    impl MockServer {
        fn with_connections(ids: &[&str], log: &SendLog) -> Self {
            let registry = ids
                .iter()
                .map(|id| {
                    (
                        id.to_string(),
                        RecordingSocket {
                            id: id.to_string(),
                            log: Rc::clone(log),
                            broken: false,
                        },
                    )
                })
                .collect();
            Self {
                events: EventEmitter::new(),
                registry,
                publisher: None,
            }
        }
    }

    impl ServerAdapter for MockServer {
        type Socket = RecordingSocket;

        fn events(&mut self) -> &mut EventEmitter {
            &mut self.events
        }

        fn publisher(&self) -> Option<&dyn Publisher> {
            self.publisher.as_ref().map(|p| p as &dyn Publisher)
        }

        fn listen(
            &mut self,
            _port: u16,
            on_bound: Option<BoundCallback>,
        ) -> Result<SocketAddr, ServerError> {
            let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
            if let Some(callback) = on_bound {
                callback(addr);
            }
            Ok(addr)
        }

        fn sockets(&self) -> Sockets<'_, RecordingSocket> {
            Sockets::new(&self.registry)
        }

        async fn next_event(&mut self) -> Option<ServerEvent> {
            None
        }
    }

    #[test]
    fn test_fallback_broadcast_reaches_every_connection_once() {
        let log: SendLog = Rc::new(RefCell::new(Vec::new()));
        let server = MockServer::with_connections(&["1", "2", "3", "4"], &log);

        let delivery = broadcast(&server, "all", Bytes::from_static(b"snapshot"), true);

        assert_eq!(delivery, Delivery::FannedOut { sent: 4, failed: 0 });
        let mut receivers: Vec<String> = log.borrow().iter().map(|(id, _)| id.clone()).collect();
        receivers.sort();
        assert_eq!(receivers, vec!["1", "2", "3", "4"]);
        assert!(log.borrow().iter().all(|(_, data)| data == b"snapshot"));
    }

    #[test]
    fn test_fallback_broadcast_counts_failures_without_skipping_others() {
        let log: SendLog = Rc::new(RefCell::new(Vec::new()));
        let mut server = MockServer::with_connections(&["a", "b", "c"], &log);
        server.registry.get_mut("b").unwrap().broken = true;

        let delivery = broadcast(&server, "all", Bytes::from_static(b"x"), true);

        assert_eq!(delivery, Delivery::FannedOut { sent: 2, failed: 1 });
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_broadcast_prefers_native_publish() {
        let log: SendLog = Rc::new(RefCell::new(Vec::new()));
        let mut server = MockServer::with_connections(&["1", "2"], &log);
        server.publisher = Some(RecordingPublisher {
            published: RefCell::new(Vec::new()),
        });

        let delivery = broadcast(&server, "all", Bytes::from_static(b"x"), true);

        assert_eq!(delivery, Delivery::Published { accepted: true });
        assert!(log.borrow().is_empty());
        let published = server.publisher.as_ref().unwrap().published.borrow().clone();
        assert_eq!(published, vec!["all".to_string()]);
    }

    #[test]
    fn test_fallback_broadcast_with_empty_registry() {
        let log: SendLog = Rc::new(RefCell::new(Vec::new()));
        let server = MockServer::with_connections(&[], &log);

        let delivery = broadcast(&server, "all", Bytes::from_static(b"x"), true);
        assert_eq!(delivery, Delivery::FannedOut { sent: 0, failed: 0 });
    }

    #[test]
    fn test_sockets_view_tracks_registry() {
        let log: SendLog = Rc::new(RefCell::new(Vec::new()));
        let mut server = MockServer::with_connections(&["1", "2"], &log);

        assert_eq!(server.sockets().size(), 2);
        assert!(server.sockets().contains("1"));
        assert_eq!(server.sockets().get("2").map(|s| s.id()), Some("2"));

        server.registry.remove("1");
        assert_eq!(server.sockets().size(), 1);
        assert!(!server.sockets().contains("1"));
        assert_eq!(server.sockets().iter().count(), 1);
    }

    #[test]
    fn test_on_chains_and_emit_reports_listeners() {
        let log: SendLog = Rc::new(RefCell::new(Vec::new()));
        let mut server = MockServer::with_connections(&[], &log);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let on_connect = Rc::clone(&seen);
        let on_disconnect = Rc::clone(&seen);
        server
            .on(EventKind::Connection, move |e| {
                on_connect.borrow_mut().push(format!("+{}", e.id()))
            })
            .on(EventKind::Disconnect, move |e| {
                on_disconnect.borrow_mut().push(format!("-{}", e.id()))
            });

        let addr = "127.0.0.1:1234".parse().unwrap();
        assert!(server.emit(&ServerEvent::Connection {
            id: "9".to_string(),
            addr
        }));
        assert!(server.emit(&ServerEvent::Disconnect {
            id: "9".to_string(),
            reason: crate::events::DisconnectReason::ClientLeft,
        }));
        assert!(!server.emit(&ServerEvent::Message {
            id: "9".to_string(),
            packet: shared::Packet::Disconnect,
        }));

        assert_eq!(*seen.borrow(), vec!["+9".to_string(), "-9".to_string()]);
    }

    #[test]
    fn test_listen_invokes_bound_callback_once() {
        let log: SendLog = Rc::new(RefCell::new(Vec::new()));
        let mut server = MockServer::with_connections(&[], &log);
        let bound = Rc::new(RefCell::new(0));

        let counter = Rc::clone(&bound);
        let result = server.listen(0, Some(Box::new(move |_: SocketAddr| *counter.borrow_mut() += 1)));

        assert!(result.is_ok());
        assert_eq!(*bound.borrow(), 1);
    }
}
