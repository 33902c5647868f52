use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use relaybridge_core::PeerKey;
use relaybridge_crypto::Keypair;
use relaybridge_transport::handshake::{
    parse_client_info, server_info_frame, server_key_frame, ServerInfo,
};
use relaybridge_transport::{read_frame, write_frame, Frame, FrameType, MAX_FRAME_SIZE};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{HubError, Result};

/// Hub configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to accept relay clients on
    pub listen_addr: SocketAddr,
    /// Largest frame body accepted from a client
    pub max_frame_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8340)),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

struct Client {
    conn_id: u64,
    tx: mpsc::UnboundedSender<Frame>,
}

#[derive(Default)]
struct Clients {
    next_conn: u64,
    by_key: HashMap<PeerKey, Client>,
}

impl Clients {
    fn register(&mut self, key: PeerKey, tx: mpsc::UnboundedSender<Frame>) -> u64 {
        self.next_conn += 1;
        let conn_id = self.next_conn;
        if self.by_key.insert(key, Client { conn_id, tx }).is_some() {
            info!("Client {} reconnected, replacing old session", key.short());
        }
        conn_id
    }

    fn unregister(&mut self, key: &PeerKey, conn_id: u64) {
        if self.by_key.get(key).is_some_and(|c| c.conn_id == conn_id) {
            self.by_key.remove(key);
        }
    }
}

/// Relay hub bound to a listening socket
pub struct Hub {
    config: HubConfig,
    keypair: Keypair,
    listener: TcpListener,
    clients: Arc<Mutex<Clients>>,
}

/// Background hub task
pub struct HubHandle {
    local_addr: SocketAddr,
    public_key: PeerKey,
    handle: JoinHandle<()>,
}

impl HubHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn public_key(&self) -> PeerKey {
        self.public_key
    }

    /// Stop accepting and drop every client
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for HubHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl Hub {
    /// Bind the listening socket with a fresh hub key
    pub async fn bind(config: HubConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| HubError::Bind {
                addr: config.listen_addr,
                source,
            })?;

        Ok(Self {
            config,
            keypair: Keypair::generate(),
            listener,
            clients: Arc::new(Mutex::new(Clients::default())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn public_key(&self) -> PeerKey {
        self.keypair.public_key()
    }

    /// Number of registered clients
    pub fn client_count(&self) -> usize {
        self.clients.lock().by_key.len()
    }

    /// Run the hub in a background task
    pub fn spawn(self) -> Result<HubHandle> {
        let local_addr = self.local_addr()?;
        let public_key = self.public_key();
        let handle = tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!("Relay hub stopped: {}", e);
            }
        });
        Ok(HubHandle {
            local_addr,
            public_key,
            handle,
        })
    }

    /// Accept clients until the listener fails
    pub async fn run(self) -> Result<()> {
        info!(
            "Relay hub listening on {} (hub key {})",
            self.local_addr()?,
            self.keypair.public_key()
        );

        let mut connections = tokio::task::JoinSet::new();
        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            debug!("Relay client connected from {}", peer_addr);

            let keypair = self.keypair.clone();
            let clients = self.clients.clone();
            let max_frame_size = self.config.max_frame_size;
            connections.spawn(async move {
                if let Err(e) = serve_client(stream, keypair, clients, max_frame_size).await {
                    debug!("Relay client {} ended: {}", peer_addr, e);
                }
            });

            // Reap finished connections so the set does not grow unbounded
            while connections.try_join_next().is_some() {}
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    hub: Keypair,
    clients: Arc<Mutex<Clients>>,
    max_frame_size: usize,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    write_frame(&mut writer, &server_key_frame(&hub.public_key())).await?;

    let Some(info_frame) = read_frame(&mut reader, max_frame_size).await? else {
        return Ok(());
    };
    let (client_key, _info) = parse_client_info(&info_frame, &hub)?;

    let server_info = ServerInfo::default();
    write_frame(&mut writer, &server_info_frame(&hub, &client_key, &server_info)?).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let conn_id = clients.lock().register(client_key, tx);
    info!("Relay client {} registered", client_key.short());

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                debug!("Relay write failed: {}", e);
                break;
            }
        }
    });

    let result = route_packets(&mut reader, client_key, &clients, max_frame_size).await;

    clients.lock().unregister(&client_key, conn_id);
    writer_task.abort();
    info!("Relay client {} disconnected", client_key.short());
    result
}

async fn route_packets(
    reader: &mut tokio::net::tcp::OwnedReadHalf,
    source: PeerKey,
    clients: &Mutex<Clients>,
    max_frame_size: usize,
) -> Result<()> {
    while let Some(frame) = read_frame(reader, max_frame_size).await? {
        match frame.frame_type {
            FrameType::SendPacket => {}
            FrameType::KeepAlive => continue,
            other => {
                warn!("Unexpected {:?} frame from {}", other, source.short());
                continue;
            }
        }

        let (dest, payload) = frame.split_packet()?;
        let dest = PeerKey::from_bytes(dest);
        let outgoing = Frame::packet(FrameType::RecvPacket, source.as_bytes(), &payload);

        let clients = clients.lock();
        match clients.by_key.get(&dest) {
            Some(client) => {
                let _ = client.tx.send(outgoing);
            }
            None => debug!(
                "Dropping packet {} -> {}: destination not connected",
                source.short(),
                dest.short()
            ),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybridge_transport::{RelayTransport, TcpRelay};
    use std::time::Duration;

    async fn spawn_hub() -> HubHandle {
        let config = HubConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        Hub::bind(config).await.unwrap().spawn().unwrap()
    }

    #[tokio::test]
    async fn test_hub_routes_between_clients() {
        let hub = spawn_hub().await;
        let addr = hub.local_addr().to_string();

        let alice_kp = Keypair::generate();
        let bob_kp = Keypair::generate();
        let alice_key = alice_kp.public_key();
        let bob_key = bob_kp.public_key();

        let mut alice = TcpRelay::open(&addr, alice_kp).await.unwrap();
        let mut bob = TcpRelay::open(&addr, bob_kp).await.unwrap();

        alice.send(&bob_key, b"hello bob").await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(5), bob.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.sender, alice_key);
        assert_eq!(&msg.payload[..], b"hello bob");

        bob.send(&alice_key, &[]).await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(5), alice.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.sender, bob_key);
        assert!(msg.is_teardown());
    }

    #[tokio::test]
    async fn test_hub_drops_packets_to_unknown_peer() {
        let hub = spawn_hub().await;
        let addr = hub.local_addr().to_string();

        let alice_kp = Keypair::generate();
        let alice_key = alice_kp.public_key();
        let mut alice = TcpRelay::open(&addr, alice_kp).await.unwrap();

        let nobody = Keypair::generate().public_key();
        alice.send(&nobody, b"lost").await.unwrap();

        // The session stays usable afterwards
        alice.send(&alice_key, b"self").await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(5), alice.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&msg.payload[..], b"self");
    }

    #[tokio::test]
    async fn test_hub_stop_fails_clients() {
        let hub = spawn_hub().await;
        let addr = hub.local_addr().to_string();
        let mut client = TcpRelay::open(&addr, Keypair::generate()).await.unwrap();

        hub.stop();
        let result = tokio::time::timeout(Duration::from_secs(5), client.recv())
            .await
            .unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_clients_unregister_ignores_stale_session() {
        let mut clients = Clients::default();
        let key = PeerKey::from_bytes([1u8; 32]);
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let first = clients.register(key, tx1);
        let second = clients.register(key, tx2);
        clients.unregister(&key, first);
        assert!(clients.by_key.contains_key(&key));

        clients.unregister(&key, second);
        assert!(!clients.by_key.contains_key(&key));
    }
}
