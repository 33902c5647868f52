//! Hub handshake records
//!
//! 1. Hub sends `ServerKey`: `MAGIC` followed by the hub's public key.
//! 2. Client sends `ClientInfo`: its public key followed by a `ClientInfo`
//!    record sealed to the hub. Only the holder of the secret key can seal it,
//!    which proves ownership of the address being registered.
//! 3. Hub sends `ServerInfo` sealed to the client.

use bytes::{BufMut, BytesMut};
use relaybridge_core::{PeerKey, KEY_LEN, MAX_PAYLOAD_SIZE};
use relaybridge_crypto::{open, seal, Keypair};
use serde::{Deserialize, Serialize};

use crate::frame::{Frame, FrameType, MAGIC};
use crate::{Result, TransportError};

/// Wire protocol version spoken by this crate
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: u32,
    /// Largest payload the hub forwards
    pub max_payload: usize,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }
}

fn expect_type(frame: &Frame, expected: FrameType) -> Result<()> {
    if frame.frame_type != expected {
        return Err(TransportError::Handshake(format!(
            "expected {:?} frame, got {:?}",
            expected, frame.frame_type
        )));
    }
    Ok(())
}

pub fn server_key_frame(hub_key: &PeerKey) -> Frame {
    let mut body = BytesMut::with_capacity(MAGIC.len() + KEY_LEN);
    body.put_slice(MAGIC);
    body.put_slice(hub_key.as_bytes());
    Frame::new(FrameType::ServerKey, body.freeze())
}

pub fn parse_server_key(frame: &Frame) -> Result<PeerKey> {
    expect_type(frame, FrameType::ServerKey)?;
    if frame.body.len() != MAGIC.len() + KEY_LEN || !frame.body.starts_with(MAGIC) {
        return Err(TransportError::Handshake("bad server key frame".to_string()));
    }
    PeerKey::try_from(&frame.body[MAGIC.len()..])
        .map_err(|e| TransportError::Handshake(e.to_string()))
}

pub fn client_info_frame(keypair: &Keypair, hub_key: &PeerKey) -> Result<Frame> {
    let info = serde_json::to_vec(&ClientInfo {
        version: PROTOCOL_VERSION,
    })
    .map_err(|e| TransportError::Handshake(e.to_string()))?;
    let sealed = seal(hub_key, keypair, &info)?;
    Ok(Frame::packet(
        FrameType::ClientInfo,
        keypair.public_key().as_bytes(),
        &sealed,
    ))
}

/// Verify a `ClientInfo` frame; returns the client's proven identity
pub fn parse_client_info(frame: &Frame, hub: &Keypair) -> Result<(PeerKey, ClientInfo)> {
    expect_type(frame, FrameType::ClientInfo)?;
    let (key, sealed) = frame.split_packet()?;
    let client_key = PeerKey::from_bytes(key);
    let plain = open(&client_key, hub, &sealed)
        .map_err(|_| TransportError::Handshake("client key proof failed".to_string()))?;
    let info: ClientInfo =
        serde_json::from_slice(&plain).map_err(|e| TransportError::Handshake(e.to_string()))?;
    if info.version != PROTOCOL_VERSION {
        return Err(TransportError::Handshake(format!(
            "unsupported protocol version {}",
            info.version
        )));
    }
    Ok((client_key, info))
}

pub fn server_info_frame(hub: &Keypair, client_key: &PeerKey, info: &ServerInfo) -> Result<Frame> {
    let plain = serde_json::to_vec(info).map_err(|e| TransportError::Handshake(e.to_string()))?;
    let sealed = seal(client_key, hub, &plain)?;
    Ok(Frame::new(FrameType::ServerInfo, sealed))
}

pub fn parse_server_info(frame: &Frame, hub_key: &PeerKey, keypair: &Keypair) -> Result<ServerInfo> {
    expect_type(frame, FrameType::ServerInfo)?;
    let plain = open(hub_key, keypair, &frame.body)
        .map_err(|_| TransportError::Handshake("cannot open server info".to_string()))?;
    serde_json::from_slice(&plain).map_err(|e| TransportError::Handshake(e.to_string()))
}
