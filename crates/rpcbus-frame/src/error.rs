use rpcbus_value::ValueError;

/// Errors that can occur during frame encoding/decoding.
///
/// Every decode error is fatal for the connection it came from: the stream
/// carries no resynchronization marker.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header's size tag does not match the header size.
    #[error("invalid frame magic {found} (expected {expected})")]
    InvalidMagic { found: u8, expected: u8 },

    /// The header declared a zero-length payload.
    #[error("frame declares an empty payload")]
    EmptyPayload,

    /// The payload checksum does not match the header.
    #[error("frame checksum mismatch (header {expected:#06x}, payload {actual:#06x})")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A JSON line grew past the configured maximum size without a terminator.
    #[error("line too long ({size} bytes without newline, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// The value could not be encoded.
    #[error("value encoding failed: {0}")]
    Value(#[from] ValueError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
