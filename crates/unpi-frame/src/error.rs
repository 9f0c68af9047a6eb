/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the protocol maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The trailing checksum does not match the frame contents.
    #[error("frame checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The command header carries a message kind outside the protocol's range.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True when the stream itself is unusable, as opposed to one bad frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::Io(_) | FrameError::ConnectionClosed)
    }
}

impl Clone for FrameError {
    /// `io::Error` is not `Clone`; an I/O error is copied by kind and message.
    fn clone(&self) -> Self {
        match self {
            FrameError::PayloadTooLarge { size, max } => FrameError::PayloadTooLarge {
                size: *size,
                max: *max,
            },
            FrameError::ChecksumMismatch { expected, actual } => FrameError::ChecksumMismatch {
                expected: *expected,
                actual: *actual,
            },
            FrameError::UnknownKind(kind) => FrameError::UnknownKind(*kind),
            FrameError::Io(err) => FrameError::Io(std::io::Error::new(err.kind(), err.to_string())),
            FrameError::ConnectionClosed => FrameError::ConnectionClosed,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
