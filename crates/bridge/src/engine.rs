use std::net::SocketAddr;
use std::time::Duration;

use relaybridge_core::PeerKey;
use relaybridge_transport::RelayTransport;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info, warn};

use crate::mux::{wait_ready, Readiness};
use crate::role::Role;
use crate::session::{LocalConnection, Phase, SessionState};
use crate::{BridgeConfig, BridgeError, Result};

const LISTEN_BACKLOG: u32 = 1;

/// Pause after a failed accept before waiting on the listener again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Tunnel bridge between one local TCP connection and one relay peer.
///
/// The bridge is a single task: every iteration rebuilds the wait set from
/// the current state, waits for the first ready source, and handles it to
/// completion before waiting again.
pub struct Bridge<T: RelayTransport> {
    pub(crate) role: Role,
    pub(crate) transport: T,
    pub(crate) listener: Option<TcpListener>,
    pub(crate) state: SessionState,
    pub(crate) buf: Vec<u8>,
}

impl<T: RelayTransport> Bridge<T> {
    /// Create a bridge over an established relay session.
    ///
    /// In the connect role the listening socket is bound here, so a port
    /// conflict fails startup instead of the first accept.
    pub async fn new(role: Role, transport: T, config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let listener = match &role {
            Role::Connect { listen, .. } => {
                let listener = bind_listener(*listen)?;
                Some(listener)
            }
            Role::Expose { .. } => None,
        };

        info!("Bridge ready as {} ({})", role, transport.local_key());
        Ok(Self {
            role,
            transport,
            listener,
            state: SessionState::Idle,
            buf: vec![0u8; config.chunk_size],
        })
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn bound_peer(&self) -> Option<PeerKey> {
        self.state.bound_peer()
    }

    /// Our relay identity
    pub fn local_key(&self) -> PeerKey {
        self.transport.local_key()
    }

    /// Address of the listening socket (connect role only)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Run one multiplexer iteration: wait for a ready source and handle it.
    ///
    /// Only fatal conditions are returned as errors.
    pub async fn step(&mut self) -> Result<()> {
        let listener = if self.state.has_connection() {
            None
        } else {
            self.listener.as_ref()
        };

        let ready = wait_ready(
            &mut self.transport,
            self.state.connection_mut(),
            listener,
            &mut self.buf,
        )
        .await?;

        match ready {
            Readiness::Relay(first) => self.pump_relay(first).await,
            Readiness::Local(read) => self.pump_local(read).await,
            Readiness::Accept(accepted) => {
                self.on_accept(accepted).await;
                Ok(())
            }
        }
    }

    /// Run until a fatal error. Local connection and relay session are
    /// released before returning.
    pub async fn run(mut self) -> Result<()> {
        if let Role::Connect { .. } = self.role {
            info!("Waiting for local connection...");
        } else {
            info!("Waiting for remote connection...");
        }

        let error = loop {
            if let Err(e) = self.step().await {
                break e;
            }
        };

        self.shutdown().await;
        Err(error)
    }

    /// Close the local connection (if any) and the relay session
    pub async fn shutdown(&mut self) {
        if let SessionState::Active { conn, .. } = self.state.take() {
            conn.close().await;
        }
        self.transport.close().await;
    }

    /// A failed accept leaves the bridge idle. Errors such as EMFILE stay
    /// pending on the listener, so the next wait is delayed to keep them
    /// from spinning the loop.
    pub(crate) async fn on_accept(&mut self, accepted: std::io::Result<(TcpStream, SocketAddr)>) {
        let peer = match self.role.fixed_peer() {
            Some(peer) => peer,
            None => return,
        };

        match accepted {
            Ok((stream, addr)) => {
                info!("Local client {} connected, forwarding to {}", addr, peer.short());
                self.state = SessionState::Active {
                    peer,
                    conn: LocalConnection::new(stream),
                };
            }
            Err(e) => {
                warn!("Accept failed: {}; retrying in {:?}", e, ACCEPT_ERROR_BACKOFF);
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }

    /// Open the local side for a newly bound peer (expose role)
    pub(crate) async fn connect_local(&mut self, peer: PeerKey, target: SocketAddr) -> Option<LocalConnection> {
        self.state = SessionState::Connecting { peer };
        info!("Connecting to '{}' for {}...", target, peer.short());

        match TcpStream::connect(target).await {
            Ok(stream) => {
                info!("Connected to '{}'", target);
                Some(LocalConnection::new(stream))
            }
            Err(e) => {
                info!("Cannot connect to '{}': {}; draining {}", target, e, peer.short());
                self.state = SessionState::Draining { peer };
                None
            }
        }
    }
}

/// Only one local client is served at a time, so the accept backlog is one.
fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let listen = || -> std::io::Result<TcpListener> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(LISTEN_BACKLOG)
    };
    let listener = listen().map_err(|source| BridgeError::Listen { addr, source })?;
    match listener.local_addr() {
        Ok(bound) => info!("Listening on {}", bound),
        Err(e) => debug!("Listening on {} (local_addr unavailable: {})", addr, e),
    }
    Ok(listener)
}
