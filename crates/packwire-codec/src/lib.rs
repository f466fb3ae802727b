//! Compact self-describing binary encoding for JSON-like values.
//!
//! Every encoded unit starts with a single header byte:
//! - high nibble: the type tag ([`ValueType`])
//! - low nibble: a per-type flag (byte width, sign bit or truth value)
//!
//! Lengths, counts and integer magnitudes are written little-endian using the
//! smallest width (1, 2 or 4 bytes) that holds them, chosen independently at
//! every occurrence. There is no dictionary or cross-value compression.

pub mod decode;
pub mod encode;
pub mod error;
pub mod json;
pub mod path;
pub mod value;

pub use decode::{decode, decode_as, Decoder};
pub use encode::{encode, encode_into, width_for, Encoder, MAX_DEPTH, MAX_KEY_LEN};
pub use error::{DecodeError, EncodeError};
pub use path::Path;
pub use value::{Map, Value, ValueType, NULL_SENTINEL, UNDEFINED_SENTINEL};
