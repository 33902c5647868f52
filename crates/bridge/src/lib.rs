//! RelayBridge Tunnel Bridge
//!
//! Bridges one local TCP connection at a time to one remote peer over a
//! relay transport.
//!
//! ## Roles
//!
//! - **Expose**: publishes a fixed local TCP service. The first relay sender
//!   seen while unbound becomes the peer; the bridge connects to the service
//!   on its behalf.
//! - **Connect**: listens on a local port and forwards the accepted client to
//!   a peer fixed at startup.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle --(relay msg / accept)--> Connecting --(ok)--> Active
//! Connecting --(connect fails)--> Draining --(queue exhausted)--> Idle
//! Active --(local read=0/error)--> send sentinel --> Idle
//! Active --(relay sentinel)--> close local --> Idle
//! Active --(local write fails)--> Draining --(sentinel / exhausted)--> Idle
//! ```
//!
//! A zero-length relay message is the teardown sentinel. Local-link failures
//! are recovered inside the bridge; only loss of the relay session (or of the
//! listening socket at startup) surfaces as a `BridgeError`.

mod engine;
mod mux;
mod pump;
mod role;
mod session;

pub use engine::Bridge;
pub use pump::write_fully;
pub use role::Role;
pub use session::{LocalConnection, Phase, SessionState};

use std::net::SocketAddr;

use relaybridge_core::{DEFAULT_CHUNK_SIZE, MAX_PAYLOAD_SIZE};
use relaybridge_transport::TransportError;
use thiserror::Error;

/// Fatal bridge errors. Nothing here is retried.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Relay transport lost: {0}")]
    TransportLost(#[from] TransportError),

    #[error("Cannot listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Invalid bridge configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Bytes read from the local socket per readiness event; each read
    /// becomes one relay message
    pub chunk_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD_SIZE {
            return Err(BridgeError::InvalidConfig(format!(
                "chunk_size must be between 1 and {}, got {}",
                MAX_PAYLOAD_SIZE, self.chunk_size
            )));
        }
        Ok(())
    }
}
