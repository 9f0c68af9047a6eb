use std::fmt;
use std::str::FromStr;

use crate::error::FrameError;

/// Message kind carried in the top three bits of the command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Poll (POLL).
    Poll,
    /// Synchronous request (SREQ).
    SyncRequest,
    /// Asynchronous request or notification (AREQ).
    AsyncRequest,
    /// Synchronous response (SRSP).
    SyncResponse,
}

impl MessageKind {
    /// Wire value of this kind (0..=3).
    pub fn to_wire(self) -> u8 {
        match self {
            MessageKind::Poll => 0,
            MessageKind::SyncRequest => 1,
            MessageKind::AsyncRequest => 2,
            MessageKind::SyncResponse => 3,
        }
    }

    /// Parse a wire value.
    pub fn from_wire(value: u8) -> Result<Self, FrameError> {
        match value {
            0 => Ok(MessageKind::Poll),
            1 => Ok(MessageKind::SyncRequest),
            2 => Ok(MessageKind::AsyncRequest),
            3 => Ok(MessageKind::SyncResponse),
            other => Err(FrameError::UnknownKind(other)),
        }
    }

    /// Protocol mnemonic.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Poll => "POLL",
            MessageKind::SyncRequest => "SREQ",
            MessageKind::AsyncRequest => "AREQ",
            MessageKind::SyncResponse => "SRSP",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "POLL" => Ok(MessageKind::Poll),
            "SREQ" => Ok(MessageKind::SyncRequest),
            "AREQ" => Ok(MessageKind::AsyncRequest),
            "SRSP" => Ok(MessageKind::SyncResponse),
            _ => Err(format!(
                "unknown message kind '{s}' (expected POLL, SREQ, AREQ or SRSP)"
            )),
        }
    }
}
