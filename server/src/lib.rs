//! # Realtime Transport Server Library
//!
//! This library provides the server side of the input-synchronization path:
//! a transport-agnostic adapter contract, two interchangeable transports, and
//! a relay that turns client input streams into periodic control snapshots.
//!
//! ## Core Responsibilities
//!
//! ### Transport Abstraction
//! Every transport implements [`ServerAdapter`] and hands out one
//! [`SocketAdapter`] per live connection. The adapter owns the connection
//! registry; everything else reads it through the [`Sockets`] view.
//!
//! ### Broadcast
//! Some transports can fan a message out natively. That ability is exposed
//! as a capability, [`ServerAdapter::publisher`], which is `None` when the
//! transport has no such path. [`broadcast`] checks for it and otherwise
//! sends to each registered connection exactly once.
//!
//! ### Event Dispatch
//! Transports turn network activity into typed [`ServerEvent`] values.
//! Listeners register per [`EventKind`] with [`ServerAdapter::on`] and run
//! synchronously, in registration order, when the caller emits the event.
//!
//! ## Architecture Design
//!
//! ### Single-Task Event Loop
//! Registry changes and listener calls happen on the task that drives
//! [`ServerAdapter::next_event`]. Socket I/O runs in spawned tasks that talk
//! to the adapter only through unbounded channels, so listeners never race
//! with each other or with the registry.
//!
//! ### Transports
//! - [`UdpServer`]: one socket, a receiver task, a sender task and a timeout
//!   checker. Connections are keyed by peer address after a `Connect`
//!   handshake and expire after a period of silence. No native broadcast.
//! - [`WsServer`]: one task per WebSocket connection. Each task subscribes
//!   to a topic channel, so a published message is encoded once and shared
//!   by every subscriber.
//!
//! ## Module Organization
//!
//! ### Adapter Module (`adapter`)
//! The [`SocketAdapter`], [`Publisher`] and [`ServerAdapter`] traits, the
//! registry view and the [`broadcast`] helper.
//!
//! ### Events Module (`events`)
//! Event types and the [`EventEmitter`] listener registry.
//!
//! ### Relay Module (`relay`)
//! Latest controls per connection, stale-input filtering and inventory
//! wrapping, snapshot construction.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{broadcast, EventKind, ServerAdapter, WsServer};
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut adapter = WsServer::new("127.0.0.1", 32);
//!     adapter
//!         .on(EventKind::Connection, |e| println!("+{}", e.id()))
//!         .on(EventKind::Disconnect, |e| println!("-{}", e.id()));
//!
//!     // Fails, and should end the process, if the port is taken
//!     adapter.listen(8080, None)?;
//!
//!     while let Some(event) = adapter.next_event().await {
//!         adapter.emit(&event);
//!         broadcast(&adapter, "all", Bytes::from_static(b"hello"), false);
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod error;
pub mod events;
pub mod relay;
pub mod udp;
pub mod ws;

pub use adapter::{broadcast, BoundCallback, Delivery, Publisher, ServerAdapter, SocketAdapter, Sockets};
pub use error::ServerError;
pub use events::{DisconnectReason, EventEmitter, EventKind, ServerEvent};
pub use relay::{ControlRelay, InventoryCursor};
pub use udp::{UdpConnection, UdpServer};
pub use ws::{TopicHub, WsConnection, WsServer};
