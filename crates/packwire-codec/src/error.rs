use crate::path::Path;
use crate::value::ValueType;

/// Errors that can occur while encoding a value.
///
/// Encoding is all-or-nothing: no partial buffer is produced on failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// A map key exceeds the 255-byte limit.
    #[error("map key too long ({len} bytes, max {max}) at '{path}'")]
    KeyTooLong { len: usize, max: usize, path: Path },

    /// A map key is empty, which no decoder accepts.
    #[error("empty map key at '{path}'")]
    EmptyKey { path: Path },

    /// The integer magnitude does not fit the 4-byte width limit.
    #[error("integer magnitude {magnitude} out of range at '{path}'")]
    IntegerOutOfRange { magnitude: u64, path: Path },

    /// A string, array or map is longer than a 4-byte length field allows.
    #[error("length {len} exceeds the 4-byte limit at '{path}'")]
    LengthOverflow { len: usize, path: Path },

    /// The source value has no representation in the format.
    #[error("unsupported {kind} at '{path}'")]
    Unsupported { kind: String, path: Path },

    /// Arrays and maps nest deeper than the format allows.
    #[error("nesting deeper than {max} levels at '{path}'")]
    TooDeep { max: usize, path: Path },
}

impl EncodeError {
    /// Location of the offending value.
    pub fn path(&self) -> &Path {
        match self {
            EncodeError::KeyTooLong { path, .. }
            | EncodeError::EmptyKey { path }
            | EncodeError::IntegerOutOfRange { path, .. }
            | EncodeError::LengthOverflow { path, .. }
            | EncodeError::Unsupported { path, .. }
            | EncodeError::TooDeep { path, .. } => path,
        }
    }
}

/// Errors that can occur while decoding a buffer.
///
/// Every variant records the byte offset where decoding stopped and the
/// path of the value being decoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended before the value was complete.
    #[error("data truncated at offset {offset}: need {needed} more bytes at '{path}'")]
    Truncated {
        offset: usize,
        needed: usize,
        path: Path,
    },

    /// The header carries a tag outside the known set.
    #[error("unknown type tag {tag:#x} at offset {offset} at '{path}'")]
    UnknownType { tag: u8, offset: usize, path: Path },

    /// The header carries a reserved tag this decoder does not read.
    #[error("unsupported type '{ty}' at offset {offset} at '{path}'")]
    UnsupportedType {
        ty: ValueType,
        offset: usize,
        path: Path,
    },

    /// A length or magnitude field uses a width other than 1, 2 or 4 bytes
    /// (floats: other than 4).
    #[error("invalid field width {width} at offset {offset} at '{path}'")]
    InvalidWidth { width: u8, offset: usize, path: Path },

    /// The caller expected a different type here.
    #[error("expected {expected} but found tag {found:#x} at offset {offset} at '{path}'")]
    TypeMismatch {
        expected: ValueType,
        found: u8,
        offset: usize,
        path: Path,
    },

    /// A map entry has an empty key.
    #[error("empty map key at offset {offset} at '{path}'")]
    EmptyKey { offset: usize, path: Path },

    /// String bytes are not valid UTF-8.
    #[error("invalid UTF-8 string at offset {offset} at '{path}'")]
    InvalidUtf8 { offset: usize, path: Path },

    /// Arrays and maps nest deeper than [`MAX_DEPTH`](crate::MAX_DEPTH).
    #[error("nesting deeper than {max} levels at offset {offset} at '{path}'")]
    TooDeep {
        max: usize,
        offset: usize,
        path: Path,
    },

    /// Bytes remain after the top-level value.
    #[error("{remaining} trailing bytes after value at offset {offset}")]
    TrailingBytes { offset: usize, remaining: usize },
}

impl DecodeError {
    /// Byte offset where decoding failed.
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::Truncated { offset, .. }
            | DecodeError::UnknownType { offset, .. }
            | DecodeError::UnsupportedType { offset, .. }
            | DecodeError::InvalidWidth { offset, .. }
            | DecodeError::TypeMismatch { offset, .. }
            | DecodeError::EmptyKey { offset, .. }
            | DecodeError::InvalidUtf8 { offset, .. }
            | DecodeError::TooDeep { offset, .. }
            | DecodeError::TrailingBytes { offset, .. } => *offset,
        }
    }

    /// Path of the value being decoded. Root for trailing-byte errors.
    pub fn path(&self) -> Path {
        match self {
            DecodeError::Truncated { path, .. }
            | DecodeError::UnknownType { path, .. }
            | DecodeError::UnsupportedType { path, .. }
            | DecodeError::InvalidWidth { path, .. }
            | DecodeError::TypeMismatch { path, .. }
            | DecodeError::EmptyKey { path, .. }
            | DecodeError::InvalidUtf8 { path, .. }
            | DecodeError::TooDeep { path, .. } => path.clone(),
            DecodeError::TrailingBytes { .. } => Path::root(),
        }
    }
}
