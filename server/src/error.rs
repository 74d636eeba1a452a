//! Error type shared by every transport

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listening socket failed. Startup must not continue.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transport is already listening")]
    AlreadyListening,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode packet: {0}")]
    Encode(#[from] bincode::Error),
    #[error("text message is not valid UTF-8")]
    InvalidText,
    #[error("connection {id} is closed")]
    ConnectionClosed { id: String },
    #[error("encoded packet is {len} bytes, limit is {max}")]
    PacketTooLarge { len: usize, max: usize },
}
