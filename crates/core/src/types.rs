use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::{CoreError, Result, KEY_LEN};

/// Peer identity on the relay: a 32-byte public key.
///
/// Only ever compared for equality; it carries no ordering.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerKey([u8; KEY_LEN]);

impl PeerKey {
    /// Wrap raw public key bytes
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Copy the raw key bytes out
    pub fn to_bytes(self) -> [u8; KEY_LEN] {
        self.0
    }

    /// Lowercase hex, 64 characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a key from exactly 64 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != KEY_LEN * 2 {
            return Err(CoreError::InvalidKeyHex(format!(
                "expected {} hex characters, got {}",
                KEY_LEN * 2,
                s.len()
            )));
        }

        let mut bytes = [0u8; KEY_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CoreError::InvalidKeyHex(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Abbreviated form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<[u8; KEY_LEN]> for PeerKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for PeerKey {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = slice
            .try_into()
            .map_err(|_| CoreError::InvalidKeyLength {
                expected: KEY_LEN * 2,
                actual: slice.len() * 2,
            })?;
        Ok(Self(bytes))
    }
}

impl FromStr for PeerKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerKey({})", self.short())
    }
}

/// One message delivered by the relay.
///
/// A zero-length payload is the teardown sentinel: the sender's local
/// connection has just closed. The relay does not treat it specially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// Identity of the peer that sent the message
    pub sender: PeerKey,
    /// Payload bytes, possibly empty
    pub payload: Bytes,
}

impl RelayMessage {
    pub fn new(sender: PeerKey, payload: impl Into<Bytes>) -> Self {
        Self {
            sender,
            payload: payload.into(),
        }
    }

    /// Build a teardown sentinel from `sender`
    pub fn teardown(sender: PeerKey) -> Self {
        Self {
            sender,
            payload: Bytes::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// True when this message signals that the sender's local side closed
    pub fn is_teardown(&self) -> bool {
        self.payload.is_empty()
    }
}
