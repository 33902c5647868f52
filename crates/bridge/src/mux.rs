//! Readiness multiplexer.
//!
//! Waits, without a timeout, until one of the bridge's sources is ready:
//! the relay session, the local data socket, or the listening socket. The
//! source set is rebuilt by the caller on every iteration; absent sources
//! simply never become ready.

use std::future;
use std::io;
use std::net::SocketAddr;

use relaybridge_core::RelayMessage;
use relaybridge_transport::RelayTransport;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::session::LocalConnection;
use crate::Result;

/// The source that woke the multiplexer, with its first unit of work
#[derive(Debug)]
pub(crate) enum Readiness {
    /// One relay message; more may be queued behind it
    Relay(RelayMessage),
    /// Result of one chunked read into the bridge buffer
    Local(io::Result<usize>),
    /// Result of accepting on the listening socket
    Accept(io::Result<(TcpStream, SocketAddr)>),
}

/// Wait for the first ready source.
///
/// All three futures are cancel-safe: a relay message or accepted socket is
/// never lost when another branch wins.
pub(crate) async fn wait_ready<T: RelayTransport>(
    transport: &mut T,
    conn: Option<&mut LocalConnection>,
    listener: Option<&TcpListener>,
    buf: &mut [u8],
) -> Result<Readiness> {
    tokio::select! {
        message = transport.recv() => Ok(Readiness::Relay(message?)),
        read = read_local(conn, buf) => Ok(Readiness::Local(read)),
        accepted = accept_local(listener) => Ok(Readiness::Accept(accepted)),
    }
}

async fn read_local(conn: Option<&mut LocalConnection>, buf: &mut [u8]) -> io::Result<usize> {
    match conn {
        Some(conn) => conn.stream_mut().read(buf).await,
        None => future::pending().await,
    }
}

async fn accept_local(listener: Option<&TcpListener>) -> io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybridge_core::PeerKey;
    use relaybridge_transport::MemoryRelay;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_relay_message_wakes() {
        let relay = MemoryRelay::new();
        let a = PeerKey::from_bytes([1; 32]);
        let b = PeerKey::from_bytes([2; 32]);
        let mut ta = relay.open(a);
        let mut tb = relay.open(b);
        tb.send(&a, b"ping").await.unwrap();

        let mut buf = [0u8; 16];
        let ready = timeout(WAIT, wait_ready(&mut ta, None, None, &mut buf))
            .await
            .unwrap()
            .unwrap();
        match ready {
            Readiness::Relay(msg) => {
                assert_eq!(msg.sender, b);
                assert_eq!(&msg.payload[..], b"ping");
            }
            other => panic!("unexpected readiness: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accept_wakes() {
        let relay = MemoryRelay::new();
        let mut transport = relay.open(PeerKey::from_bytes([1; 32]));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();

        let mut buf = [0u8; 16];
        let ready = timeout(
            WAIT,
            wait_ready(&mut transport, None, Some(&listener), &mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(matches!(ready, Readiness::Accept(Ok(_))));
    }

    #[tokio::test]
    async fn test_local_read_wakes() {
        let relay = MemoryRelay::new();
        let mut transport = relay.open(PeerKey::from_bytes([1; 32]));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let mut conn = LocalConnection::new(server);

        client.write_all(b"abc").await.unwrap();

        let mut buf = [0u8; 16];
        let ready = timeout(
            WAIT,
            wait_ready(&mut transport, Some(&mut conn), None, &mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        match ready {
            Readiness::Local(Ok(n)) => assert_eq!(&buf[..n], &b"abc"[..n]),
            other => panic!("unexpected readiness: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_sources_ready_blocks() {
        let relay = MemoryRelay::new();
        let mut transport = relay.open(PeerKey::from_bytes([1; 32]));
        let mut buf = [0u8; 16];
        let result = timeout(
            Duration::from_millis(100),
            wait_ready(&mut transport, None, None, &mut buf),
        )
        .await;
        assert!(result.is_err(), "multiplexer must block with nothing ready");
    }

    // ==================== NEGATIVE TESTS ====================

    #[tokio::test]
    async fn test_lost_relay_is_error() {
        let relay = MemoryRelay::new();
        let key = PeerKey::from_bytes([1; 32]);
        let mut transport = relay.open(key);
        relay.disconnect(&key);

        let mut buf = [0u8; 16];
        let result = timeout(WAIT, wait_ready(&mut transport, None, None, &mut buf))
            .await
            .unwrap();
        assert!(result.is_err());
    }
}
