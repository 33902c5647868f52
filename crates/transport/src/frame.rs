//! Relay wire framing
//!
//! Every frame is a 1-byte type, a 4-byte big-endian body length, then the
//! body:
//!
//! ```text
//! +------+-----------+-----------------+
//! | type | len (u32) | body (len bytes)|
//! +------+-----------+-----------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use relaybridge_core::{KEY_LEN, MAX_PAYLOAD_SIZE};
use relaybridge_crypto::SEAL_OVERHEAD;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Result, TransportError};

/// Frame header: type byte + u32 length
pub const FRAME_HEADER_LEN: usize = 1 + 4;

/// Largest body accepted on the wire (peer key + sealed max payload)
pub const MAX_FRAME_SIZE: usize = KEY_LEN + MAX_PAYLOAD_SIZE + SEAL_OVERHEAD;

/// Magic prefix of the hub's `ServerKey` frame
pub const MAGIC: &[u8; 8] = b"RBRIDGE1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Hub → client: magic + hub public key
    ServerKey,
    /// Client → hub: client public key + sealed client info
    ClientInfo,
    /// Hub → client: sealed server info
    ServerInfo,
    /// Client → hub: destination key + payload
    SendPacket,
    /// Hub → client: source key + payload
    RecvPacket,
    /// Either direction, empty body
    KeepAlive,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(byte: u8) -> Self {
        match byte {
            0x01 => Self::ServerKey,
            0x02 => Self::ClientInfo,
            0x03 => Self::ServerInfo,
            0x04 => Self::SendPacket,
            0x05 => Self::RecvPacket,
            0x06 => Self::KeepAlive,
            other => Self::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(frame_type: FrameType) -> Self {
        match frame_type {
            FrameType::ServerKey => 0x01,
            FrameType::ClientInfo => 0x02,
            FrameType::ServerInfo => 0x03,
            FrameType::SendPacket => 0x04,
            FrameType::RecvPacket => 0x05,
            FrameType::KeepAlive => 0x06,
            FrameType::Unknown(other) => other,
        }
    }
}

/// One wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub body: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, body: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            body: body.into(),
        }
    }

    /// Build a frame whose body is a peer key followed by a payload
    /// (`SendPacket` / `RecvPacket`)
    pub fn packet(frame_type: FrameType, key: &[u8; KEY_LEN], payload: &[u8]) -> Self {
        let mut body = BytesMut::with_capacity(KEY_LEN + payload.len());
        body.put_slice(key);
        body.put_slice(payload);
        Self::new(frame_type, body.freeze())
    }

    /// Split a packet body into its key and payload
    pub fn split_packet(&self) -> Result<([u8; KEY_LEN], Bytes)> {
        if self.body.len() < KEY_LEN {
            return Err(TransportError::MalformedFrame(format!(
                "{:?} body of {} bytes is shorter than a key",
                self.frame_type,
                self.body.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&self.body[..KEY_LEN]);
        Ok((key, self.body.slice(KEY_LEN..)))
    }

    /// Serialize header and body into one buffer
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + self.body.len());
        buf.put_u8(self.frame_type.into());
        buf.put_u32(self.body.len() as u32);
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean EOF before the first header byte.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let frame_type = FrameType::from(header[0]);
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > max_size {
        return Err(TransportError::FrameTooLarge {
            size: len,
            limit: max_size,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(Frame::new(frame_type, body)))
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_codes() {
        for code in 0x01..=0x06u8 {
            let frame_type = FrameType::from(code);
            assert!(!matches!(frame_type, FrameType::Unknown(_)));
            assert_eq!(u8::from(frame_type), code);
        }
        assert_eq!(FrameType::from(0x7f), FrameType::Unknown(0x7f));
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::new(FrameType::SendPacket, vec![0xaa, 0xbb]);
        let encoded = frame.encode();
        assert_eq!(&encoded[..], &[0x04, 0, 0, 0, 2, 0xaa, 0xbb]);
    }

    #[test]
    fn test_packet_split() {
        let key = [5u8; KEY_LEN];
        let frame = Frame::packet(FrameType::RecvPacket, &key, b"data");
        let (parsed_key, payload) = frame.split_packet().unwrap();
        assert_eq!(parsed_key, key);
        assert_eq!(&payload[..], b"data");
    }

    #[test]
    fn test_packet_split_empty_payload() {
        let key = [6u8; KEY_LEN];
        let frame = Frame::packet(FrameType::RecvPacket, &key, &[]);
        let (_, payload) = frame.split_packet().unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_read_write_frame() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let frame = Frame::new(FrameType::KeepAlive, Bytes::new());
        write_frame(&mut a, &frame).await.unwrap();
        let frame2 = Frame::new(FrameType::ServerInfo, b"info".to_vec());
        write_frame(&mut a, &frame2).await.unwrap();

        assert_eq!(read_frame(&mut b, MAX_FRAME_SIZE).await.unwrap(), Some(frame));
        assert_eq!(read_frame(&mut b, MAX_FRAME_SIZE).await.unwrap(), Some(frame2));
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert_eq!(read_frame(&mut b, MAX_FRAME_SIZE).await.unwrap(), None);
    }

    // ==================== NEGATIVE TESTS ====================

    #[test]
    fn test_packet_split_short_body() {
        let frame = Frame::new(FrameType::RecvPacket, vec![1u8; 10]);
        assert!(matches!(
            frame.split_packet(),
            Err(TransportError::MalformedFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_read_frame_too_large() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0x04, 0, 0, 1, 0]).await.unwrap();
        let result = read_frame(&mut b, 16).await;
        assert!(matches!(
            result,
            Err(TransportError::FrameTooLarge { size: 256, limit: 16 })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0x04, 0, 0, 0, 8, 1, 2]).await.unwrap();
        drop(a);
        let result = read_frame(&mut b, MAX_FRAME_SIZE).await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
