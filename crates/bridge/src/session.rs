use std::fmt;
use std::mem;
use std::net::SocketAddr;

use relaybridge_core::PeerKey;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// The bridge's single local TCP connection
pub struct LocalConnection {
    stream: TcpStream,
    remote_addr: Option<SocketAddr>,
}

impl LocalConnection {
    pub fn new(stream: TcpStream) -> Self {
        // Interactive traffic; small chunks should not wait on Nagle
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Setting TCP_NODELAY failed (ignored): {}", e);
        }
        let remote_addr = stream.peer_addr().ok();
        Self {
            stream,
            remote_addr,
        }
    }

    /// Address of the other end of the local socket
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Shut down the write side and release the socket
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Local shutdown failed (ignored): {}", e);
        }
    }
}

impl fmt::Debug for LocalConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConnection")
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

/// Session state machine.
///
/// Between two multiplexer iterations the state is always `Idle` or
/// `Active`; `Connecting` and `Draining` only exist while an event is being
/// handled.
#[derive(Debug, Default)]
pub enum SessionState {
    /// No local connection, no bound peer
    #[default]
    Idle,
    /// Peer chosen, local connection being established
    Connecting { peer: PeerKey },
    /// Local connection open, traffic forwarded to and from `peer`
    Active { peer: PeerKey, conn: LocalConnection },
    /// Local side failed; queued messages from `peer` are stale
    Draining { peer: PeerKey },
}

/// State without the attached resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Connecting,
    Active,
    Draining,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Draining => "draining",
        };
        f.write_str(name)
    }
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Idle => Phase::Idle,
            Self::Connecting { .. } => Phase::Connecting,
            Self::Active { .. } => Phase::Active,
            Self::Draining { .. } => Phase::Draining,
        }
    }

    /// Peer whose traffic is currently forwarded.
    ///
    /// A draining peer is not bound: its messages are only being discarded.
    pub fn bound_peer(&self) -> Option<PeerKey> {
        match self {
            Self::Connecting { peer } | Self::Active { peer, .. } => Some(*peer),
            Self::Idle | Self::Draining { .. } => None,
        }
    }

    pub fn has_connection(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub(crate) fn connection_mut(&mut self) -> Option<&mut LocalConnection> {
        match self {
            Self::Active { conn, .. } => Some(conn),
            _ => None,
        }
    }

    /// Move the state out, leaving `Idle` behind
    pub(crate) fn take(&mut self) -> SessionState {
        mem::take(self)
    }
}
