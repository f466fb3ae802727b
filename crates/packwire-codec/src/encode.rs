use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EncodeError;
use crate::path::Path;
use crate::value::{Value, ValueType, NULL_SENTINEL, UNDEFINED_SENTINEL};

/// Maximum map key length in bytes.
pub const MAX_KEY_LEN: usize = 0xff;

/// Maximum nesting of arrays and maps, counted from the top-level value.
pub const MAX_DEPTH: usize = 128;

/// Sign bit in the INTEGER flag nibble.
pub(crate) const SIGN_FLAG: u8 = 0x08;
/// Width bits in the INTEGER/FLOAT flag nibble.
pub(crate) const WIDTH_MASK: u8 = 0x07;

/// Minimal byte width for an unsigned magnitude.
///
/// ```text
/// magnitude < 0xff          -> 1
/// magnitude <= 0xffff       -> 2
/// magnitude <= 0xffff_ffff  -> 4
/// ```
///
/// Width 3 is reserved. Returns `None` above `u32::MAX`.
pub fn width_for(magnitude: u64) -> Option<u8> {
    if magnitude < 0xff {
        Some(1)
    } else if magnitude <= 0xffff {
        Some(2)
    } else if magnitude <= 0xffff_ffff {
        Some(4)
    } else {
        None
    }
}

/// Encode a value into a fresh buffer.
pub fn encode(value: &Value) -> Result<Bytes, EncodeError> {
    let mut buf = BytesMut::new();
    encode_into(value, &mut buf)?;
    Ok(buf.freeze())
}

/// Append the encoding of `value` to `dst`.
///
/// On failure `dst` is restored to its original length.
pub fn encode_into(value: &Value, dst: &mut BytesMut) -> Result<(), EncodeError> {
    let start = dst.len();
    let result = Encoder::new(dst).write_value(value);
    if result.is_err() {
        dst.truncate(start);
    }
    result
}

/// Streaming encoder over a `BytesMut`.
///
/// Tracks the path of the value being written so failures can name it.
pub struct Encoder<'a> {
    dst: &'a mut BytesMut,
    path: Path,
}

impl<'a> Encoder<'a> {
    pub fn new(dst: &'a mut BytesMut) -> Self {
        Self {
            dst,
            path: Path::root(),
        }
    }

    /// Write one value (recursively).
    pub fn write_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Integer(n) => self.write_integer(*n),
            Value::Float(f) => {
                // Float bit patterns are always written at full width.
                self.write_header(ValueType::Float, 4);
                self.dst.put_u32_le(f.to_bits());
                Ok(())
            }
            Value::Boolean(b) => {
                self.write_header(ValueType::Boolean, u8::from(*b));
                Ok(())
            }
            Value::String(s) => self.write_str(s),
            Value::Null => self.write_str(NULL_SENTINEL),
            Value::Undefined => self.write_str(UNDEFINED_SENTINEL),
            Value::Array(items) => {
                self.check_depth()?;
                self.write_sized(ValueType::Array, items.len())?;
                for (index, item) in items.iter().enumerate() {
                    self.path.push_index(index);
                    self.write_value(item)?;
                    self.path.pop();
                }
                Ok(())
            }
            Value::Map(map) => {
                self.check_depth()?;
                self.write_sized(ValueType::Map, map.len())?;
                for (key, item) in map {
                    self.path.push_key(key);
                    self.write_key(key)?;
                    self.write_value(item)?;
                    self.path.pop();
                }
                Ok(())
            }
        }
    }

    fn check_depth(&self) -> Result<(), EncodeError> {
        if self.path.depth() >= MAX_DEPTH {
            return Err(EncodeError::TooDeep {
                max: MAX_DEPTH,
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    fn write_header(&mut self, ty: ValueType, flag: u8) {
        self.dst.put_u8((ty.tag() << 4) | (flag & 0x0f));
    }

    fn write_integer(&mut self, n: i64) -> Result<(), EncodeError> {
        let magnitude = n.unsigned_abs();
        let width = width_for(magnitude).ok_or_else(|| EncodeError::IntegerOutOfRange {
            magnitude,
            path: self.path.clone(),
        })?;
        let sign = if n < 0 { SIGN_FLAG } else { 0 };
        self.write_header(ValueType::Integer, width | sign);
        self.dst.put_uint_le(magnitude, usize::from(width));
        Ok(())
    }

    fn write_sized(&mut self, ty: ValueType, len: usize) -> Result<(), EncodeError> {
        let width = u64::try_from(len)
            .ok()
            .and_then(|len| width_for(len).map(|width| (len, width)));
        let Some((len, width)) = width else {
            return Err(EncodeError::LengthOverflow {
                len,
                path: self.path.clone(),
            });
        };
        self.write_header(ty, width);
        self.dst.put_uint_le(len, usize::from(width));
        Ok(())
    }

    fn write_str(&mut self, s: &str) -> Result<(), EncodeError> {
        self.write_sized(ValueType::String, s.len())?;
        self.dst.put_slice(s.as_bytes());
        Ok(())
    }

    fn write_key(&mut self, key: &str) -> Result<(), EncodeError> {
        if key.is_empty() {
            return Err(EncodeError::EmptyKey {
                path: self.path.clone(),
            });
        }
        if key.len() > MAX_KEY_LEN {
            return Err(EncodeError::KeyTooLong {
                len: key.len(),
                max: MAX_KEY_LEN,
                path: self.path.clone(),
            });
        }
        self.write_str(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Map;

    fn enc(value: impl Into<Value>) -> Vec<u8> {
        encode(&value.into()).unwrap().to_vec()
    }

    #[test]
    fn integers_use_minimal_width() {
        assert_eq!(enc(1), [0x11, 0x01]);
        assert_eq!(enc(0), [0x11, 0x00]);
        assert_eq!(enc(254), [0x11, 0xfe]);
        assert_eq!(enc(255), [0x12, 0xff, 0x00]);
        assert_eq!(enc(256), [0x12, 0x00, 0x01]);
        assert_eq!(enc(65535), [0x12, 0xff, 0xff]);
        assert_eq!(enc(65536), [0x14, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(enc(1_144_422_400u32), [0x14, 0x00, 0x80, 0x36, 0x44]);
        assert_eq!(enc(u32::MAX), [0x14, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn negative_integers_set_sign_flag() {
        assert_eq!(enc(-1), [0x19, 0x01]);
        assert_eq!(enc(-300), [0x1a, 0x2c, 0x01]);
        assert_eq!(enc(i64::from(i32::MIN)), [0x1c, 0x00, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn integer_beyond_four_bytes_fails() {
        let err = encode(&Value::Integer(4_294_967_296)).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::IntegerOutOfRange {
                magnitude: 4_294_967_296,
                ..
            }
        ));
    }

    #[test]
    fn width_policy_boundaries() {
        assert_eq!(width_for(0), Some(1));
        assert_eq!(width_for(0xfe), Some(1));
        assert_eq!(width_for(0xff), Some(2));
        assert_eq!(width_for(0xffff), Some(2));
        assert_eq!(width_for(0x1_0000), Some(4));
        assert_eq!(width_for(0xffff_ffff), Some(4));
        assert_eq!(width_for(0x1_0000_0000), None);
    }

    #[test]
    fn booleans_live_in_the_flag() {
        assert_eq!(enc(false), [0x20]);
        assert_eq!(enc(true), [0x21]);
    }

    #[test]
    fn strings_carry_byte_length() {
        assert_eq!(enc("123"), [0x31, 0x03, b'1', b'2', b'3']);
        assert_eq!(
            enc("abc\0abc"),
            [0x31, 0x07, b'a', b'b', b'c', 0, b'a', b'b', b'c']
        );

        let long = "1".repeat(256);
        let bytes = enc(long.as_str());
        assert_eq!(&bytes[..3], &[0x32, 0x00, 0x01]);
        assert_eq!(bytes.len(), 3 + 256);

        // Multi-byte UTF-8: length is bytes, not chars.
        assert_eq!(enc("é"), [0x31, 0x02, 0xc3, 0xa9]);
    }

    #[test]
    fn floats_are_four_byte_bit_patterns() {
        let bytes = enc(1.5f32);
        assert_eq!(bytes[0], 0x64);
        assert_eq!(&bytes[1..], &1.5f32.to_bits().to_le_bytes());

        // Tiny bit patterns still get the full width.
        let tiny = f32::from_bits(1);
        assert_eq!(enc(tiny), [0x64, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn sentinels_encode_as_strings() {
        assert_eq!(enc(Value::Null), enc("null"));
        assert_eq!(enc(Value::Undefined), enc("undefined"));
    }

    #[test]
    fn map_layout() {
        let value: Value = [("key", "val")].into_iter().collect();
        assert_eq!(enc(value), b"\x51\x01\x31\x03key\x31\x03val");

        let mut inner = Map::new();
        inner.insert("z".to_string(), Value::Integer(1));
        let mut outer = Map::new();
        outer.insert("key".to_string(), Value::Map(inner));
        assert_eq!(
            enc(Value::Map(outer)),
            b"\x51\x01\x31\x03key\x51\x01\x31\x01z\x11\x01"
        );
    }

    #[test]
    fn array_layout() {
        let value = Value::Array(vec![Value::Integer(1), Value::from("a"), Value::from(true)]);
        assert_eq!(enc(value), [0x41, 0x03, 0x11, 0x01, 0x31, 0x01, b'a', 0x21]);
        assert_eq!(enc(Value::Array(Vec::new())), [0x41, 0x00]);
    }

    #[test]
    fn long_key_fails_with_path() {
        let key = "k".repeat(MAX_KEY_LEN + 1);
        let value: Value = [(key.as_str(), 1)].into_iter().collect();
        let err = encode(&value).unwrap_err();
        assert!(matches!(err, EncodeError::KeyTooLong { len: 256, .. }));
        assert_eq!(err.path().to_string(), key);
    }

    #[test]
    fn key_of_exactly_255_bytes_is_accepted() {
        let key = "k".repeat(MAX_KEY_LEN);
        let value: Value = [(key.as_str(), 1)].into_iter().collect();
        assert!(encode(&value).is_ok());
    }

    #[test]
    fn nested_long_key_reports_full_path() {
        let key = "x".repeat(300);
        let leaf: Value = [(key.as_str(), true)].into_iter().collect();
        let mut list = Map::new();
        list.insert("lines".to_string(), Value::Array(vec![Value::Integer(0), leaf]));
        let err = encode(&Value::Map(list)).unwrap_err();

        assert!(matches!(err, EncodeError::KeyTooLong { .. }));
        assert_eq!(err.path().to_string(), format!("lines.1.{key}"));
    }

    #[test]
    fn empty_key_is_rejected() {
        let value: Value = [("", 1)].into_iter().collect();
        assert!(matches!(
            encode(&value),
            Err(EncodeError::EmptyKey { .. })
        ));
    }

    #[test]
    fn nesting_beyond_limit_fails() {
        let mut value = Value::Boolean(true);
        for _ in 0..=MAX_DEPTH {
            value = Value::Array(vec![value]);
        }
        let err = encode(&value).unwrap_err();
        assert!(matches!(err, EncodeError::TooDeep { max: MAX_DEPTH, .. }));
        assert_eq!(err.path().depth(), MAX_DEPTH);

        // One level less is fine.
        if let Value::Array(mut items) = value {
            assert!(encode(&items.remove(0)).is_ok());
        }
    }

    #[test]
    fn failed_encode_leaves_buffer_untouched() {
        let mut buf = BytesMut::from(&b"prefix"[..]);
        let bad = Value::Array(vec![Value::Integer(1), Value::Integer(i64::MAX)]);
        assert!(encode_into(&bad, &mut buf).is_err());
        assert_eq!(&buf[..], b"prefix");
    }
}
