//! Wire protocol between the chat server and its terminal clients.
//!
//! Wire format: `[type: u8][length: u32 big-endian][payload: bytes]`
//!
//! Control frames carry JSON payloads; data frames carry raw bytes. The
//! handshake is two control round-trips — `Auth` answered by `AuthOk` (or
//! `Error`), then `OpenShell` with the terminal geometry — after which the
//! client streams keystrokes as `Input` frames and the server streams
//! rendering bytes as `Output` frames. `Resize` can arrive at any time
//! once the shell is open.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Frame type byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    // Control frames (JSON payload)
    Auth = 0x01,
    AuthOk = 0x02,
    OpenShell = 0x03,
    Resize = 0x04,
    Error = 0x05,

    // Data frames (raw bytes payload)
    Input = 0x10,
    Output = 0x11,
}

impl FrameType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Auth),
            0x02 => Some(Self::AuthOk),
            0x03 => Some(Self::OpenShell),
            0x04 => Some(Self::Resize),
            0x05 => Some(Self::Error),
            0x10 => Some(Self::Input),
            0x11 => Some(Self::Output),
            _ => None,
        }
    }
}

/// Maximum frame payload size (1 MiB). Far beyond any legitimate frame
/// here; prevents OOM on a malformed length field.
const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

/// Wire header size: one type byte plus the big-endian length.
const HEADER_LEN: usize = 5;

/// Validate a raw header, returning the frame type and payload length.
fn parse_header(header: [u8; HEADER_LEN]) -> io::Result<(FrameType, usize)> {
    let frame_type = FrameType::from_u8(header[0]).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown frame type: 0x{:02x}", header[0]),
        )
    })?;
    let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if length > MAX_PAYLOAD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame payload too large: {length} bytes"),
        ));
    }
    Ok((frame_type, length as usize))
}

/// A protocol frame with a type tag and payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: Bytes) -> Self {
        Self {
            frame_type,
            payload,
        }
    }

    /// Create a control frame from a serializable message.
    pub fn control<T: Serialize>(
        frame_type: FrameType,
        msg: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(frame_type, serde_json::to_vec(msg)?.into()))
    }

    /// Create a data frame (Input or Output).
    pub fn data(frame_type: FrameType, data: Bytes) -> Self {
        Self::new(frame_type, data)
    }

    /// Encode this frame into bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(self.frame_type as u8);
        buf.put_u32(self.payload.len() as u32);
        buf.put(self.payload.as_ref());
        buf.freeze()
    }

    /// Write this frame to an async writer.
    pub async fn write_to<W: AsyncWriteExt + Unpin>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await
    }

    /// Read a frame from an async reader.
    pub async fn read_from<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header).await?;
        let (frame_type, length) = parse_header(header)?;

        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload).await?;
        Ok(Self::new(frame_type, payload.into()))
    }

    /// Decode a frame from a byte buffer (synchronous, for testing).
    pub fn decode(mut data: &[u8]) -> io::Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "frame too short",
            ));
        }
        let mut header = [0u8; HEADER_LEN];
        data.copy_to_slice(&mut header);
        let (frame_type, length) = parse_header(header)?;

        if data.remaining() < length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "incomplete frame payload",
            ));
        }
        Ok(Self::new(frame_type, Bytes::copy_from_slice(&data[..length])))
    }

    /// Parse the payload as a JSON control message.
    pub fn parse_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

// ── Control message types ──────────────────────────────────────────

/// Client → Server: authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthMsg {
    pub username: String,
}

/// Server → Client: authentication accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOkMsg {
    pub username: String,
    /// Service identity, for the client's own diagnostics.
    pub server: String,
}

/// Client → Server: open the interactive shell with this terminal
/// geometry (the pseudo-terminal-allocated event).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenShellMsg {
    pub rows: u16,
    pub cols: u16,
}

/// Client → Server: the terminal was resized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeMsg {
    pub rows: u16,
    pub cols: u16,
}

/// Server → Client: rejection or fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub code: String,
    pub message: String,
}
