use std::fmt;
use std::net::SocketAddr;

use relaybridge_core::PeerKey;

/// Which side of the tunnel this bridge is.
///
/// The two cases differ only in how a local connection is obtained (connect
/// vs accept) and how the peer is chosen (first sender vs fixed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Publish the local service at `target` under our relay identity
    Expose { target: SocketAddr },
    /// Accept local clients on `listen` and forward them to `peer`
    Connect { peer: PeerKey, listen: SocketAddr },
}

impl Role {
    /// Peer fixed at startup, if any
    pub fn fixed_peer(&self) -> Option<PeerKey> {
        match self {
            Self::Expose { .. } => None,
            Self::Connect { peer, .. } => Some(*peer),
        }
    }

    /// True when the bridge owns a listening socket
    pub fn listens(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }

    /// Whether `sender` may open a new local connection while unbound
    pub fn accepts_new_sender(&self) -> bool {
        matches!(self, Self::Expose { .. })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expose { target } => write!(f, "expose {}", target),
            Self::Connect { peer, listen } => write!(f, "connect {} on {}", peer.short(), listen),
        }
    }
}
