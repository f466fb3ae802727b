use crate::encode::{MAX_DEPTH, SIGN_FLAG, WIDTH_MASK};
use crate::error::DecodeError;
use crate::path::Path;
use crate::value::{Map, Value, ValueType};

/// Decode a complete buffer into a single value.
///
/// Zero-length input decodes to an empty map. Bytes left over after the
/// top-level value are an error.
pub fn decode(src: &[u8]) -> Result<Value, DecodeError> {
    if src.is_empty() {
        return Ok(Value::empty_map());
    }
    let mut decoder = Decoder::new(src);
    let value = decoder.read_value()?;
    decoder.finish()?;
    Ok(value)
}

/// Decode a complete buffer, asserting the top-level type.
///
/// Zero-length input satisfies an expected [`ValueType::Map`] only.
pub fn decode_as(src: &[u8], expected: ValueType) -> Result<Value, DecodeError> {
    if src.is_empty() {
        if expected == ValueType::Map {
            return Ok(Value::empty_map());
        }
        return Err(DecodeError::Truncated {
            offset: 0,
            needed: 1,
            path: Path::root(),
        });
    }
    let mut decoder = Decoder::new(src);
    let value = decoder.read_expecting(Some(expected))?;
    decoder.finish()?;
    Ok(value)
}

/// Cursor-based decoder over a byte slice.
pub struct Decoder<'a> {
    src: &'a [u8],
    pos: usize,
    path: Path,
}

impl<'a> Decoder<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            pos: 0,
            path: Path::root(),
        }
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.src.len() - self.pos
    }

    /// Read the next value, whatever its type.
    pub fn read_value(&mut self) -> Result<Value, DecodeError> {
        self.read_expecting(None)
    }

    /// Read the next value, failing if its tag differs from `expected`.
    pub fn read_expecting(&mut self, expected: Option<ValueType>) -> Result<Value, DecodeError> {
        let offset = self.pos;
        let header = self.take(1)?[0];
        let tag = header >> 4;
        let flag = header & 0x0f;

        if let Some(expected) = expected {
            if expected.tag() != tag {
                return Err(DecodeError::TypeMismatch {
                    expected,
                    found: tag,
                    offset,
                    path: self.path.clone(),
                });
            }
        }

        let Some(ty) = ValueType::from_tag(tag) else {
            return Err(DecodeError::UnknownType {
                tag,
                offset,
                path: self.path.clone(),
            });
        };

        match ty {
            ValueType::Integer => {
                let magnitude = self.read_uint(flag & WIDTH_MASK, offset)?;
                // Magnitudes are at most u32::MAX, so the cast is lossless.
                let n = magnitude as i64;
                Ok(Value::Integer(if flag & SIGN_FLAG != 0 { -n } else { n }))
            }
            ValueType::Float => {
                let width = flag & WIDTH_MASK;
                if width != 4 {
                    return Err(DecodeError::InvalidWidth {
                        width,
                        offset,
                        path: self.path.clone(),
                    });
                }
                let bits = self.read_uint(width, offset)?;
                Ok(Value::Float(f32::from_bits(bits as u32)))
            }
            ValueType::Boolean => Ok(Value::Boolean(flag > 0)),
            ValueType::String => self.read_string(flag, offset).map(Value::String),
            ValueType::Array => {
                self.check_depth(offset)?;
                let count = self.read_count(flag, offset)?;
                let mut items = Vec::with_capacity(count.min(self.remaining()));
                for index in 0..count {
                    self.path.push_index(index);
                    items.push(self.read_value()?);
                    self.path.pop();
                }
                Ok(Value::Array(items))
            }
            ValueType::Map => {
                self.check_depth(offset)?;
                let count = self.read_count(flag, offset)?;
                let mut map = Map::new();
                for _ in 0..count {
                    let key_offset = self.pos;
                    let key = self.read_key(key_offset)?;
                    if key.is_empty() {
                        return Err(DecodeError::EmptyKey {
                            offset: key_offset,
                            path: self.path.clone(),
                        });
                    }
                    self.path.push_key(&key);
                    let item = self.read_value()?;
                    self.path.pop();
                    map.insert(key, item);
                }
                Ok(Value::Map(map))
            }
            ValueType::Null => Err(DecodeError::UnsupportedType {
                ty,
                offset,
                path: self.path.clone(),
            }),
        }
    }

    /// Fail if any bytes remain.
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.pos != self.src.len() {
            return Err(DecodeError::TrailingBytes {
                offset: self.pos,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    fn check_depth(&self, offset: usize) -> Result<(), DecodeError> {
        if self.path.depth() >= MAX_DEPTH {
            return Err(DecodeError::TooDeep {
                max: MAX_DEPTH,
                offset,
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
                path: self.path.clone(),
            });
        }
        let bytes = &self.src[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_uint(&mut self, width: u8, header_offset: usize) -> Result<u64, DecodeError> {
        match width {
            1 | 2 | 4 => {
                let bytes = self.take(usize::from(width))?;
                Ok(bytes
                    .iter()
                    .rev()
                    .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
            }
            _ => Err(DecodeError::InvalidWidth {
                width,
                offset: header_offset,
                path: self.path.clone(),
            }),
        }
    }

    fn read_count(&mut self, width: u8, header_offset: usize) -> Result<usize, DecodeError> {
        // Lengths fit in 32 bits by construction.
        self.read_uint(width, header_offset).map(|n| n as usize)
    }

    fn read_key(&mut self, key_offset: usize) -> Result<String, DecodeError> {
        let header = self.take(1)?[0];
        let tag = header >> 4;
        if tag != ValueType::String.tag() {
            return Err(DecodeError::TypeMismatch {
                expected: ValueType::String,
                found: tag,
                offset: key_offset,
                path: self.path.clone(),
            });
        }
        self.read_string(header & 0x0f, key_offset)
    }

    fn read_string(&mut self, width: u8, header_offset: usize) -> Result<String, DecodeError> {
        let len = self.read_count(width, header_offset)?;
        let start = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 {
            offset: start,
            path: self.path.clone(),
        })
    }
}
