//! Inbound and outbound pumps.
//!
//! The inbound pump handles a relay wake-up by draining every queued
//! message without blocking. The outbound pump handles exactly one chunked
//! local read per wake-up.

use std::io;

use relaybridge_core::{PeerKey, RelayMessage};
use relaybridge_transport::RelayTransport;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::engine::Bridge;
use crate::role::Role;
use crate::session::{LocalConnection, SessionState};
use crate::Result;

/// Write all of `data`, retrying on partial writes.
///
/// Returns the number of bytes written, which always equals `data.len()`
/// on success. A writer that accepts zero bytes is treated as closed.
pub async fn write_fully<W>(writer: &mut W, mut data: &[u8]) -> io::Result<usize>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0;
    while !data.is_empty() {
        let n = writer.write(data).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "local socket accepted no bytes",
            ));
        }
        written += n;
        data = &data[n..];
    }
    Ok(written)
}

impl<T: RelayTransport> Bridge<T> {
    /// Inbound pump: handle `first`, then everything already queued behind it
    pub(crate) async fn pump_relay(&mut self, first: RelayMessage) -> Result<()> {
        let mut next = Some(first);
        while let Some(message) = next {
            self.on_relay_message(message).await;
            next = self.transport.try_recv()?;
        }

        if let SessionState::Draining { peer } = self.state {
            info!("Drained stale messages from {}", peer.short());
            self.state = SessionState::Idle;
        }
        Ok(())
    }

    async fn on_relay_message(&mut self, message: RelayMessage) {
        match self.state.take() {
            SessionState::Idle => self.on_unbound_message(message).await,
            SessionState::Active { peer, conn } if message.sender == peer => {
                self.deliver(peer, conn, message).await;
            }
            SessionState::Draining { peer } if message.sender == peer => {
                if message.is_teardown() {
                    info!("Remote {} closed while draining", peer.short());
                } else {
                    debug!("Discarding {} stale bytes from {}", message.len(), peer.short());
                    self.state = SessionState::Draining { peer };
                }
            }
            // Only a fresh connection attempt supersedes a drain; a foreign
            // sentinel must not end it
            SessionState::Draining { peer }
                if self.role.accepts_new_sender() && !message.is_teardown() =>
            {
                debug!(
                    "Message from {} supersedes drain of {}",
                    message.sender.short(),
                    peer.short()
                );
                self.on_unbound_message(message).await;
            }
            other => {
                debug!(
                    "Discarding {} bytes from {}: not the bound peer",
                    message.len(),
                    message.sender.short()
                );
                self.state = other;
            }
        }
    }

    /// Relay message while no peer is bound
    async fn on_unbound_message(&mut self, message: RelayMessage) {
        let target = match self.role {
            Role::Expose { target } => target,
            Role::Connect { .. } => {
                debug!(
                    "Discarding {} bytes from {}: no local connection",
                    message.len(),
                    message.sender.short()
                );
                return;
            }
        };

        if message.is_teardown() {
            debug!("Ignoring teardown from unbound {}", message.sender.short());
            return;
        }

        let peer = message.sender;
        if let Some(conn) = self.connect_local(peer, target).await {
            self.deliver(peer, conn, message).await;
        }
    }

    /// Forward one message from the bound peer to the local socket
    async fn deliver(&mut self, peer: PeerKey, mut conn: LocalConnection, message: RelayMessage) {
        if message.is_teardown() {
            info!("Remote {} disconnected", peer.short());
            conn.close().await;
            return;
        }

        match write_fully(conn.stream_mut(), &message.payload).await {
            Ok(_) => {
                self.state = SessionState::Active { peer, conn };
            }
            Err(e) => {
                info!("Local write failed: {}; draining {}", e, peer.short());
                conn.close().await;
                self.state = SessionState::Draining { peer };
            }
        }
    }

    /// Outbound pump: forward one local read to the bound peer.
    ///
    /// End of stream or a read error closes the local side and sends the
    /// teardown sentinel exactly once.
    pub(crate) async fn pump_local(&mut self, read: io::Result<usize>) -> Result<()> {
        let peer = match self.state.bound_peer() {
            Some(peer) => peer,
            None => return Ok(()),
        };

        match read {
            Ok(n) if n > 0 => {
                self.transport.send(&peer, &self.buf[..n]).await?;
            }
            read => {
                match read {
                    Err(e) => info!("Local read failed: {}", e),
                    Ok(_) => info!("Local socket closed"),
                }
                if let SessionState::Active { conn, .. } = self.state.take() {
                    conn.close().await;
                }
                self.transport.send(&peer, &[]).await?;
                debug!("Sent teardown to {}", peer.short());
            }
        }
        Ok(())
    }
}
