use packwire_codec::{DecodeError, EncodeError};

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    /// The request id is not 11 printable ASCII characters.
    #[error("invalid request id {0:?}")]
    InvalidRequestId(String),

    /// The command name is empty, too long or not printable ASCII.
    #[error("invalid command {0:?}")]
    InvalidCommand(String),

    /// A request header lacks its NUL separators.
    #[error("missing NUL separator in request header")]
    MissingSeparator,

    /// The frame is shorter than its fixed header.
    #[error("frame too short ({len} bytes, need at least {min})")]
    ShortFrame { len: usize, min: usize },

    /// A text response carries a status outside the byte range.
    #[error("invalid status code point U+{0:04X}")]
    InvalidStatus(u32),

    /// The payload could not be encoded.
    #[error("payload encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// The payload could not be decoded.
    #[error("payload decode failed: {0}")]
    Decode(#[from] DecodeError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
