//! RelayBridge Relay Hub
//!
//! Development relay: accepts framed clients, checks that each one holds the
//! secret for the key it registers, and routes `SendPacket` frames to the
//! connected destination as `RecvPacket` frames. Payloads are sealed by the
//! clients and forwarded opaquely.

mod hub;

pub use hub::{Hub, HubConfig, HubHandle};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] relaybridge_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, HubError>;
