//! Tunnel over a real relay hub
//!
//! Both bridges open framed TCP sessions to a development hub, so traffic
//! crosses the wire codec, the handshake and end-to-end payload sealing.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use relaybridge_bridge::{Bridge, BridgeConfig, BridgeError, Role};
use relaybridge_crypto::Keypair;
use relaybridge_relay::{Hub, HubConfig, HubHandle};
use relaybridge_transport::TcpRelay;

const WAIT: Duration = Duration::from_secs(10);

async fn spawn_hub() -> HubHandle {
    let config = HubConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    Hub::bind(config).await.unwrap().spawn().unwrap()
}

/// Accept one connection and hand it to the test
async fn spawn_service() -> (SocketAddr, tokio::task::JoinHandle<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    (addr, task)
}

struct Tunnel {
    client: TcpStream,
    service: TcpStream,
    exposer_task: tokio::task::JoinHandle<relaybridge_bridge::Result<()>>,
    connector_task: tokio::task::JoinHandle<relaybridge_bridge::Result<()>>,
}

/// Hub + exposer + connector, with one local client connected end to end
async fn open_tunnel(hub: &HubHandle) -> Tunnel {
    let hub_addr = hub.local_addr().to_string();
    let (service_addr, service_task) = spawn_service().await;

    let exposer_kp = Keypair::generate();
    let exposer_key = exposer_kp.public_key();
    let exposer_relay = TcpRelay::open(&hub_addr, exposer_kp).await.unwrap();
    let exposer = Bridge::new(
        Role::Expose {
            target: service_addr,
        },
        exposer_relay,
        BridgeConfig::default(),
    )
    .await
    .unwrap();

    let connector_relay = TcpRelay::open(&hub_addr, Keypair::generate())
        .await
        .unwrap();
    let connector = Bridge::new(
        Role::Connect {
            peer: exposer_key,
            listen: "127.0.0.1:0".parse().unwrap(),
        },
        connector_relay,
        BridgeConfig::default(),
    )
    .await
    .unwrap();
    let listen = connector.local_addr().unwrap();

    let exposer_task = tokio::spawn(exposer.run());
    let connector_task = tokio::spawn(connector.run());

    // The exposer only dials the service once the first bytes arrive
    let mut client = TcpStream::connect(listen).await.unwrap();
    client.write_all(b"hello").await.unwrap();
    let mut service = timeout(WAIT, service_task).await.unwrap().unwrap();
    let mut buf = [0u8; 5];
    timeout(WAIT, service.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"hello");

    Tunnel {
        client,
        service,
        exposer_task,
        connector_task,
    }
}

#[tokio::test]
async fn test_tunnel_forwards_both_directions() {
    relaybridge_logging::init_for_tests();
    let hub = spawn_hub().await;
    let mut tunnel = open_tunnel(&hub).await;

    tunnel.service.write_all(b"PONG").await.unwrap();
    let mut buf = [0u8; 4];
    timeout(WAIT, tunnel.client.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"PONG");

    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 241) as u8).collect();
    tunnel.client.write_all(&payload).await.unwrap();
    let mut received = vec![0u8; payload.len()];
    timeout(WAIT, tunnel.service.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, payload);

    tunnel.exposer_task.abort();
    tunnel.connector_task.abort();
}

#[tokio::test]
async fn test_client_close_reaches_service() {
    let hub = spawn_hub().await;
    let mut tunnel = open_tunnel(&hub).await;

    drop(tunnel.client);

    let mut rest = Vec::new();
    timeout(WAIT, tunnel.service.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    tunnel.exposer_task.abort();
    tunnel.connector_task.abort();
}

#[tokio::test]
async fn test_service_close_reaches_client() {
    let hub = spawn_hub().await;
    let mut tunnel = open_tunnel(&hub).await;

    drop(tunnel.service);

    let mut rest = Vec::new();
    timeout(WAIT, tunnel.client.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    tunnel.exposer_task.abort();
    tunnel.connector_task.abort();
}

// ==================== NEGATIVE TESTS ====================

#[tokio::test]
async fn test_hub_loss_is_fatal_for_both_bridges() {
    let hub = spawn_hub().await;
    let tunnel = open_tunnel(&hub).await;

    hub.stop();

    let exposer = timeout(WAIT, tunnel.exposer_task).await.unwrap().unwrap();
    let connector = timeout(WAIT, tunnel.connector_task).await.unwrap().unwrap();
    assert!(matches!(exposer, Err(BridgeError::TransportLost(_))));
    assert!(matches!(connector, Err(BridgeError::TransportLost(_))));
}
