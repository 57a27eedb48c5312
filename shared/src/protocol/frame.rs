//! Binary frame layer: sync bytes, header, payload and CRC32 trailer
//!
//! ```text
//! 0x47 0x83 | type u8 | timestamp u48 | reserved u32 | len u16 | payload | crc32 u32
//! ```
//!
//! All integers are big-endian. The checksum covers everything from the first
//! sync byte to the end of the payload.

use crate::protocol::ProtocolError;
use log::{debug, warn};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

pub const SYNC_1: u8 = 0x47;
pub const SYNC_2: u8 = 0x83;

/// Bytes before the payload, sync bytes included
pub const HEADER_LEN: usize = 15;
pub const CRC_LEN: usize = 4;

const TIMESTAMP_MASK: u64 = (1 << 48) - 1;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checksum mismatch for message type {message_type}: expected {expected:#010x}, got {actual:#010x}")]
    Checksum {
        message_type: u8,
        expected: u32,
        actual: u32,
    },
}

/// One framed message as it travels on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: u8,
    /// Milliseconds since the unix epoch, truncated to 48 bits on the wire
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(message_type: u8, timestamp: u64, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            timestamp: timestamp & TIMESTAMP_MASK,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload_len = u16::try_from(self.payload.len())
            .map_err(|_| ProtocolError::PayloadTooLarge(self.payload.len()))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len() + CRC_LEN);
        bytes.push(SYNC_1);
        bytes.push(SYNC_2);
        bytes.push(self.message_type);
        bytes.extend_from_slice(&(self.timestamp & TIMESTAMP_MASK).to_be_bytes()[2..]);
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&payload_len.to_be_bytes());
        bytes.extend_from_slice(&self.payload);

        let crc = checksum(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        Ok(bytes)
    }
}

pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Reads frames from a byte stream, resynchronising on the sync bytes
///
/// Frames are consumed a byte at a time, so sockets should be wrapped with
/// [`FrameReader::buffered`] rather than read directly.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<BufReader<R>> {
    /// Reader over `inner` with a read buffer in front of it
    pub fn buffered(inner: R) -> Self {
        Self::new(BufReader::new(inner))
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads the next frame
    ///
    /// Returns [`FrameError::Checksum`] when a complete frame arrived with a
    /// bad trailer; the stream is still usable afterwards. Any I/O error,
    /// including end of stream, is returned as [`FrameError::Io`].
    pub async fn read_frame(&mut self) -> Result<Frame, FrameError> {
        let mut skipped = 0usize;
        let mut previous = self.inner.read_u8().await?;
        loop {
            let byte = self.inner.read_u8().await?;
            if previous == SYNC_1 && byte == SYNC_2 {
                break;
            }
            previous = byte;
            skipped += 1;
        }
        if skipped > 0 {
            debug!("Skipped {} bytes while looking for sync", skipped);
        }

        let mut header = [0u8; HEADER_LEN];
        header[0] = SYNC_1;
        header[1] = SYNC_2;
        self.inner.read_exact(&mut header[2..]).await?;

        let message_type = header[2];
        let mut timestamp_bytes = [0u8; 8];
        timestamp_bytes[2..].copy_from_slice(&header[3..9]);
        let timestamp = u64::from_be_bytes(timestamp_bytes);
        let payload_len = u16::from_be_bytes([header[13], header[14]]) as usize;

        let mut payload = vec![0u8; payload_len];
        self.inner.read_exact(&mut payload).await?;
        let expected = self.inner.read_u32().await?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header);
        hasher.update(&payload);
        let actual = hasher.finalize();

        if actual != expected {
            return Err(FrameError::Checksum {
                message_type,
                expected,
                actual,
            });
        }

        Ok(Frame {
            message_type,
            timestamp,
            payload,
        })
    }

    /// Reads frames until one passes its checksum
    ///
    /// Frames with a bad checksum are dropped with a warning. Only transport
    /// errors are returned.
    pub async fn next_frame(&mut self) -> Result<Frame, FrameError> {
        loop {
            match self.read_frame().await {
                Err(FrameError::Checksum {
                    message_type,
                    expected,
                    actual,
                }) => {
                    warn!(
                        "Dropping type {} frame with bad checksum ({:#010x} != {:#010x})",
                        message_type, actual, expected
                    );
                }
                other => return other,
            }
        }
    }
}
