//! RelayBridge Transport
//!
//! The relay transport contract consumed by the bridge, plus two
//! implementations of it.
//!
//! ## Features
//!
//! - `RelayTransport` trait: addressed, message-oriented send/recv
//! - `TcpRelay`: framed client for a relay hub, payloads sealed end-to-end
//! - `MemoryRelay`: in-process relay for tests and single-process use
//! - Wire framing shared with the hub (`frame`, `handshake`)

mod client;
pub mod frame;
pub mod handshake;
mod memory;

pub use client::TcpRelay;
pub use frame::{read_frame, write_frame, Frame, FrameType, FRAME_HEADER_LEN, MAX_FRAME_SIZE};
pub use memory::{MemoryRelay, MemoryTransport};

use async_trait::async_trait;
use relaybridge_core::{PeerKey, RelayMessage};
use relaybridge_crypto::EncryptError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Relay connection failed: {0}")]
    ConnectFailed(String),

    #[error("Relay handshake failed: {0}")]
    Handshake(String),

    #[error("Relay session closed")]
    Closed,

    #[error("Relay I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes exceeds {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Payload too large: {size} bytes exceeds {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Encryption error: {0}")]
    Encrypt(#[from] EncryptError),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// An opened relay session addressed by our identity key.
///
/// Any error from `send`, `recv` or `try_recv` means the session is no
/// longer usable.
#[async_trait]
pub trait RelayTransport: Send {
    /// Identity this session is registered under
    fn local_key(&self) -> PeerKey;

    /// Send one message to `to`. An empty payload is delivered as-is.
    async fn send(&mut self, to: &PeerKey, payload: &[u8]) -> Result<()>;

    /// Wait for the next message. Cancel-safe: dropping the future never
    /// loses a message.
    async fn recv(&mut self) -> Result<RelayMessage>;

    /// Take the next queued message without waiting.
    ///
    /// `Ok(None)` means nothing is queued; a message with an empty payload is
    /// returned as `Ok(Some(..))`.
    fn try_recv(&mut self) -> Result<Option<RelayMessage>>;

    /// Close the session
    async fn close(&mut self);
}
