//! In-process relay
//!
//! Routes messages between transports opened on the same `MemoryRelay`.
//! Used by tests and by single-process setups; behaves like the hub:
//! messages to unknown keys are dropped, a key opened twice replaces the
//! earlier session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use relaybridge_core::{PeerKey, RelayMessage, MAX_PAYLOAD_SIZE};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{RelayTransport, Result, TransportError};

struct Mailbox {
    session_id: u64,
    tx: mpsc::UnboundedSender<RelayMessage>,
}

#[derive(Default)]
struct Registry {
    next_session: u64,
    mailboxes: HashMap<PeerKey, Mailbox>,
}

/// Shared in-process relay
#[derive(Clone, Default)]
pub struct MemoryRelay {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session addressed by `key`
    pub fn open(&self, key: PeerKey) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = self.registry.lock();
        registry.next_session += 1;
        let session_id = registry.next_session;
        if registry
            .mailboxes
            .insert(key, Mailbox { session_id, tx })
            .is_some()
        {
            debug!("Memory relay session for {} replaced", key.short());
        }

        MemoryTransport {
            key,
            session_id,
            relay: self.clone(),
            inbound: rx,
        }
    }

    /// Drop the session registered for `key`, as if the relay went away.
    ///
    /// Returns false when no such session exists.
    pub fn disconnect(&self, key: &PeerKey) -> bool {
        self.registry.lock().mailboxes.remove(key).is_some()
    }

    /// Check whether `key` currently has an open session
    pub fn is_connected(&self, key: &PeerKey) -> bool {
        self.registry.lock().mailboxes.contains_key(key)
    }

    fn is_current(&self, key: &PeerKey, session_id: u64) -> bool {
        self.registry
            .lock()
            .mailboxes
            .get(key)
            .is_some_and(|m| m.session_id == session_id)
    }

    fn deliver(&self, to: &PeerKey, message: RelayMessage) {
        let registry = self.registry.lock();
        match registry.mailboxes.get(to) {
            Some(mailbox) => {
                let _ = mailbox.tx.send(message);
            }
            None => debug!("Memory relay dropped message for unknown peer {}", to.short()),
        }
    }

    fn release(&self, key: &PeerKey, session_id: u64) {
        let mut registry = self.registry.lock();
        if registry
            .mailboxes
            .get(key)
            .is_some_and(|m| m.session_id == session_id)
        {
            registry.mailboxes.remove(key);
        }
    }
}

/// One session on a `MemoryRelay`
pub struct MemoryTransport {
    key: PeerKey,
    session_id: u64,
    relay: MemoryRelay,
    inbound: mpsc::UnboundedReceiver<RelayMessage>,
}

#[async_trait]
impl RelayTransport for MemoryTransport {
    fn local_key(&self) -> PeerKey {
        self.key
    }

    async fn send(&mut self, to: &PeerKey, payload: &[u8]) -> Result<()> {
        if !self.relay.is_current(&self.key, self.session_id) {
            return Err(TransportError::Closed);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                limit: MAX_PAYLOAD_SIZE,
            });
        }

        self.relay.deliver(
            to,
            RelayMessage::new(self.key, Bytes::copy_from_slice(payload)),
        );
        Ok(())
    }

    async fn recv(&mut self) -> Result<RelayMessage> {
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }

    fn try_recv(&mut self) -> Result<Option<RelayMessage>> {
        match self.inbound.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    async fn close(&mut self) {
        self.relay.release(&self.key, self.session_id);
        self.inbound.close();
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.relay.release(&self.key, self.session_id);
    }
}
