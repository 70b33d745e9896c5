//! CPDP wire protocol implementation.
//!
//! CPD uses a lightweight framed protocol over a single persistent TCP
//! connection per receiver.
//!
//! ## Frame Format
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      CPDP Frame                            │
//! ├────────────┬────────────┬────────────┬─────────────────────┤
//! │   Magic    │  Version   │    Kind    │      Length         │
//! │  4 bytes   │  2 bytes   │   1 byte   │      4 bytes        │
//! ├────────────┴────────────┴────────────┴─────────────────────┤
//! │                        Payload                             │
//! │                    (variable length)                       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! - Magic: `0x43 0x50 0x44 0x50` ("CPDP")
//! - Version: `0x01 0x00` (1.0)
//! - Kind: frame kind byte (text or file chunk)
//! - Length: payload length in bytes (big-endian)
//!
//! Text frames carry one JSON-encoded [`Message`]. File content travels as
//! [`FrameKind::FileChunk`] frames: a sequence number, a flags byte whose
//! low bit marks the final chunk, then raw bytes. The whole-file checksum
//! rides in the `metadata` message, so chunks need no per-chunk checksum.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Protocol magic bytes: "CPDP"
pub const MAGIC: [u8; 4] = [0x43, 0x50, 0x44, 0x50];

/// Frame header size in bytes
pub const HEADER_SIZE: usize = 11;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Chunk payload prologue: sequence (8 bytes) + flags (1 byte)
pub const CHUNK_PROLOGUE_SIZE: usize = 9;

/// Flag bit marking the final chunk of a transfer.
const FLAG_LAST_CHUNK: u8 = 0x01;

/// Frame kinds in the CPDP protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// JSON-encoded control message
    Text = 0x01,
    /// Binary file chunk
    FileChunk = 0x02,
}

impl FrameKind {
    /// Parse a frame kind from a byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Text),
            0x02 => Some(Self::FileChunk),
            _ => None,
        }
    }
}

/// A protocol frame header.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// Protocol version (major, minor)
    pub version: (u8, u8),
    /// Frame kind
    pub kind: FrameKind,
    /// Payload length
    pub payload_length: u32,
}

impl FrameHeader {
    /// Encode the header to bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4] = self.version.0;
        buf[5] = self.version.1;
        buf[6] = self.kind as u8;
        buf[7..11].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode a header from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0..4] != MAGIC {
            return Err(Error::ProtocolError("invalid magic bytes".to_string()));
        }

        let version = (buf[4], buf[5]);

        let kind = FrameKind::from_byte(buf[6])
            .ok_or_else(|| Error::ProtocolError(format!("unknown frame kind: {:#x}", buf[6])))?;

        let payload_length = u32::from_be_bytes([buf[7], buf[8], buf[9], buf[10]]);

        if payload_length as usize > MAX_PAYLOAD_SIZE {
            return Err(Error::ProtocolError(format!(
                "payload too large: {payload_length} bytes"
            )));
        }

        Ok(Self {
            version,
            kind,
            payload_length,
        })
    }
}

/// Control messages exchanged over text frames.
///
/// Serialized as JSON tagged on `"type"`, with the field names the wire
/// format has always used (`clientName`, `fileName`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Receiver announces itself and asks for the file.
    Ready {
        /// Label the receiver identifies itself with (usually its hostname)
        #[serde(rename = "clientName")]
        client_name: String,
    },
    /// Sender describes the file about to be streamed.
    Metadata {
        /// Display name of the file
        #[serde(rename = "fileName")]
        file_name: String,
        /// Exact size of the byte stream that will follow
        #[serde(rename = "fileSize")]
        file_size: u64,
        /// Size of each chunk except possibly the last
        #[serde(rename = "chunkSize")]
        chunk_size: u32,
        /// Number of chunks that will be streamed
        #[serde(rename = "totalChunks")]
        total_chunks: u64,
        /// xxHash64 of the complete file content
        checksum: u64,
    },
    /// Keep-alive probe from the sender.
    Ping,
    /// Keep-alive reply from the receiver.
    Pong,
    /// Receiver confirms the file was persisted.
    Received {
        /// Label the receiver identifies itself with
        #[serde(rename = "clientName")]
        client_name: String,
        /// Where the receiver saved the file
        #[serde(rename = "savePath")]
        save_path: String,
    },
}

/// A binary file chunk payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPayload {
    /// Zero-based chunk sequence number
    pub sequence: u64,
    /// Whether this is the final chunk of the transfer
    pub last: bool,
    /// Chunk data
    pub data: Vec<u8>,
}

impl ChunkPayload {
    /// Encode the chunk payload (binary format).
    ///
    /// Format: sequence (8 bytes) | flags (1 byte) | data
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHUNK_PROLOGUE_SIZE + self.data.len());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.push(if self.last { FLAG_LAST_CHUNK } else { 0 });
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Decode a chunk payload (binary format).
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is shorter than the prologue.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < CHUNK_PROLOGUE_SIZE {
            return Err(Error::ProtocolError(format!(
                "chunk payload too short: {} bytes",
                payload.len()
            )));
        }

        let sequence = u64::from_be_bytes(payload[0..8].try_into().expect("sliced 8 bytes"));
        let flags = payload[8];

        Ok(Self {
            sequence,
            last: flags & FLAG_LAST_CHUNK != 0,
            data: payload[CHUNK_PROLOGUE_SIZE..].to_vec(),
        })
    }
}

/// Encode a control message to JSON bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a control message from JSON bytes.
///
/// Returns `None` for text that isn't a recognized message. Unknown and
/// malformed text frames are ignored by design, so this is not an error.
#[must_use]
pub fn decode_message(data: &[u8]) -> Option<Message> {
    serde_json::from_slice(data).ok()
}

/// Read a complete frame from a stream.
///
/// # Errors
///
/// Returns an error if reading fails or the frame is invalid.
pub async fn read_frame<R>(reader: &mut R) -> Result<(FrameHeader, Vec<u8>)>
where
    R: tokio::io::AsyncReadExt + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf).await?;

    let header = FrameHeader::decode(&header_buf)?;

    let mut payload = vec![0u8; header.payload_length as usize];
    if header.payload_length > 0 {
        reader.read_exact(&mut payload).await?;
    }

    Ok((header, payload))
}

/// Write a complete frame to a stream.
///
/// # Errors
///
/// Returns an error if writing fails.
pub async fn write_frame<W>(writer: &mut W, kind: FrameKind, payload: &[u8]) -> Result<()>
where
    W: tokio::io::AsyncWriteExt + Unpin,
{
    #[allow(clippy::cast_possible_truncation)]
    let header = FrameHeader {
        version: crate::PROTOCOL_VERSION,
        kind,
        payload_length: payload.len() as u32,
    };

    writer.write_all(&header.encode()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;

    Ok(())
}

/// Write a control message as a text frame.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: tokio::io::AsyncWriteExt + Unpin,
{
    let payload = encode_message(message)?;
    write_frame(writer, FrameKind::Text, &payload).await
}

/// Read a complete frame from a stream with a timeout.
///
/// # Errors
///
/// Returns `Error::Timeout` if the operation exceeds the specified duration.
/// Returns an error if reading fails or the frame is invalid.
pub async fn read_frame_with_timeout<R>(
    reader: &mut R,
    duration: Duration,
) -> Result<(FrameHeader, Vec<u8>)>
where
    R: tokio::io::AsyncReadExt + Unpin,
{
    timeout(duration, read_frame(reader))
        .await
        .map_err(|_| Error::Timeout(duration.as_secs()))?
}
