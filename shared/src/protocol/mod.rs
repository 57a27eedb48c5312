//! Wire protocol shared by the server and its clients
//!
//! [`frame`] handles framing and checksums, [`message`] turns frame payloads
//! into typed [`Message`] values and back.

pub mod frame;
pub mod message;

pub use frame::{Frame, FrameError, FrameReader};
pub use message::*;

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("invalid {field} value {value}")]
    InvalidValue { field: &'static str, value: u8 },
    #[error("text field is not valid UTF-8")]
    InvalidText,
    #[error("text of {len} bytes exceeds the {max} byte field")]
    TextTooLong { len: usize, max: usize },
    #[error("payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),
}

/// Current wall-clock time in milliseconds since the unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
