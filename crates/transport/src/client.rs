//! TCP relay client
//!
//! Opens a framed session to a relay hub. Payloads are sealed end-to-end to
//! the destination key, so the hub only ever sees ciphertext. A background
//! task reads frames into a channel; that channel is what makes `recv`
//! cancel-safe and `try_recv` non-blocking.

use async_trait::async_trait;
use bytes::Bytes;
use relaybridge_core::{PeerKey, RelayMessage, MAX_PAYLOAD_SIZE};
use relaybridge_crypto::{open, seal, Keypair};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::frame::{read_frame, write_frame, Frame, FrameType, MAX_FRAME_SIZE};
use crate::handshake::{client_info_frame, parse_server_info, parse_server_key, ServerInfo};
use crate::{RelayTransport, Result, TransportError};

type Inbound = std::result::Result<RelayMessage, TransportError>;

/// Relay session over TCP to a hub
pub struct TcpRelay {
    keypair: Keypair,
    server_info: ServerInfo,
    writer: OwnedWriteHalf,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    reader_task: JoinHandle<()>,
}

impl TcpRelay {
    /// Connect to the hub at `server_addr` and register under `keypair`
    pub async fn open(server_addr: &str, keypair: Keypair) -> Result<Self> {
        let stream = TcpStream::connect(server_addr)
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", server_addr, e)))?;
        stream.set_nodelay(true)?;

        let (mut reader, mut writer) = stream.into_split();

        let server_key_frame = read_frame(&mut reader, MAX_FRAME_SIZE)
            .await?
            .ok_or(TransportError::Closed)?;
        let hub_key = parse_server_key(&server_key_frame)?;
        debug!("Relay hub key {}", hub_key.short());

        write_frame(&mut writer, &client_info_frame(&keypair, &hub_key)?).await?;

        let server_info_frame = read_frame(&mut reader, MAX_FRAME_SIZE)
            .await?
            .ok_or(TransportError::Closed)?;
        let server_info = parse_server_info(&server_info_frame, &hub_key, &keypair)?;

        info!(
            "Relay session open at {} as {}",
            server_addr,
            keypair.public_key().short()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_loop(reader, keypair.clone(), tx));

        Ok(Self {
            keypair,
            server_info,
            writer,
            inbound: rx,
            reader_task,
        })
    }

    /// Limits announced by the hub
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

/// Decode `RecvPacket` frames until the hub goes away
async fn read_loop(
    mut reader: OwnedReadHalf,
    keypair: Keypair,
    tx: mpsc::UnboundedSender<Inbound>,
) {
    loop {
        let frame = match read_frame(&mut reader, MAX_FRAME_SIZE).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                let _ = tx.send(Err(TransportError::Closed));
                return;
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };

        match frame.frame_type {
            FrameType::RecvPacket => {}
            FrameType::KeepAlive => continue,
            other => {
                debug!("Ignoring {:?} frame from relay", other);
                continue;
            }
        }

        let (key, sealed) = match frame.split_packet() {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Dropping bad packet from relay: {}", e);
                continue;
            }
        };
        let sender = PeerKey::from_bytes(key);

        let payload = match open(&sender, &keypair, &sealed) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping packet from {} that failed to open: {}", sender.short(), e);
                continue;
            }
        };

        if tx.send(Ok(RelayMessage::new(sender, Bytes::from(payload)))).is_err() {
            return;
        }
    }
}

#[async_trait]
impl RelayTransport for TcpRelay {
    fn local_key(&self) -> PeerKey {
        self.keypair.public_key()
    }

    async fn send(&mut self, to: &PeerKey, payload: &[u8]) -> Result<()> {
        let limit = self.server_info.max_payload.min(MAX_PAYLOAD_SIZE);
        if payload.len() > limit {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                limit,
            });
        }

        let sealed = seal(to, &self.keypair, payload)?;
        let frame = Frame::packet(FrameType::SendPacket, to.as_bytes(), &sealed);
        write_frame(&mut self.writer, &frame).await
    }

    async fn recv(&mut self) -> Result<RelayMessage> {
        match self.inbound.recv().await {
            Some(result) => result,
            None => Err(TransportError::Closed),
        }
    }

    fn try_recv(&mut self) -> Result<Option<RelayMessage>> {
        match self.inbound.try_recv() {
            Ok(result) => result.map(Some),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    async fn close(&mut self) {
        use tokio::io::AsyncWriteExt;

        self.reader_task.abort();
        self.inbound.close();
        let _ = self.writer.shutdown().await;
    }
}

impl Drop for TcpRelay {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::{parse_client_info, server_info_frame, server_key_frame};
    use tokio::net::TcpListener;

    /// Minimal single-client hub that echoes every packet back to its sender
    async fn spawn_echo_hub() -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = tokio::spawn(async move {
            let hub = Keypair::generate();
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = stream.into_split();

            write_frame(&mut writer, &server_key_frame(&hub.public_key()))
                .await
                .unwrap();
            let info = read_frame(&mut reader, MAX_FRAME_SIZE).await.unwrap().unwrap();
            let (client_key, _) = parse_client_info(&info, &hub).unwrap();
            let reply = server_info_frame(&hub, &client_key, &ServerInfo::default()).unwrap();
            write_frame(&mut writer, &reply).await.unwrap();

            while let Ok(Some(frame)) = read_frame(&mut reader, MAX_FRAME_SIZE).await {
                let (_dest, payload) = frame.split_packet().unwrap();
                let echo = Frame::packet(FrameType::RecvPacket, client_key.as_bytes(), &payload);
                write_frame(&mut writer, &echo).await.unwrap();
            }
        });

        (addr, handle)
    }

    #[tokio::test]
    async fn test_open_send_recv_via_echo_hub() {
        let (addr, _hub) = spawn_echo_hub().await;
        let keypair = Keypair::generate();
        let me = keypair.public_key();

        let mut relay = TcpRelay::open(&addr, keypair).await.unwrap();
        assert_eq!(relay.local_key(), me);
        assert_eq!(relay.server_info().max_payload, MAX_PAYLOAD_SIZE);

        relay.send(&me, b"PING").await.unwrap();
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), relay.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.sender, me);
        assert_eq!(&msg.payload[..], b"PING");

        relay.send(&me, &[]).await.unwrap();
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), relay.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(msg.is_teardown());
    }

    #[tokio::test]
    async fn test_hub_disconnect_is_fatal() {
        let (addr, hub) = spawn_echo_hub().await;
        let mut relay = TcpRelay::open(&addr, Keypair::generate()).await.unwrap();

        hub.abort();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), relay.recv())
            .await
            .unwrap();
        assert!(result.is_err());
    }

    // ==================== NEGATIVE TESTS ====================

    #[tokio::test]
    async fn test_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpRelay::open(&addr, Keypair::generate()).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
