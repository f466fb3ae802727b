use std::collections::BTreeMap;
use std::fmt;

/// Wire spelling of [`Value::Null`].
pub const NULL_SENTINEL: &str = "null";
/// Wire spelling of [`Value::Undefined`].
pub const UNDEFINED_SENTINEL: &str = "undefined";

/// String-keyed map. Entry order carries no meaning on the wire.
pub type Map = BTreeMap<String, Value>;

/// Type tags carried in the high nibble of every header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Boolean,
    String,
    Array,
    Map,
    Float,
    /// Reserved. Peers do not emit it and the decoder rejects it.
    Null,
}

impl ValueType {
    /// The 4-bit tag for this type.
    pub fn tag(self) -> u8 {
        match self {
            ValueType::Integer => 0x01,
            ValueType::Boolean => 0x02,
            ValueType::String => 0x03,
            ValueType::Array => 0x04,
            ValueType::Map => 0x05,
            ValueType::Float => 0x06,
            ValueType::Null => 0x07,
        }
    }

    /// Look up a type by its 4-bit tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(ValueType::Integer),
            0x02 => Some(ValueType::Boolean),
            0x03 => Some(ValueType::String),
            0x04 => Some(ValueType::Array),
            0x05 => Some(ValueType::Map),
            0x06 => Some(ValueType::Float),
            0x07 => Some(ValueType::Null),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Integer => "integer",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::Array => "array",
            ValueType::Map => "map",
            ValueType::Float => "float",
            ValueType::Null => "null",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded (or to-be-encoded) value tree.
///
/// `Null` and `Undefined` travel as the strings `"null"` and `"undefined"`,
/// so they decode back as [`Value::String`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed integer. Magnitudes above `u32::MAX` cannot be encoded.
    Integer(i64),
    Float(f32),
    Boolean(bool),
    String(String),
    Array(Vec<Value>),
    Map(Map),
    Null,
    Undefined,
}

impl Value {
    /// An empty map, which is also what zero-length input decodes to.
    pub fn empty_map() -> Self {
        Value::Map(Map::new())
    }

    /// The type this value is written as.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Boolean(_) => ValueType::Boolean,
            Value::String(_) | Value::Null | Value::Undefined => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Map(_) => ValueType::Map,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// True for `Null`, `Undefined`, and their decoded string spellings.
    pub fn is_null_like(&self) -> bool {
        match self {
            Value::Null | Value::Undefined => true,
            Value::String(s) => s == NULL_SENTINEL || s == UNDEFINED_SENTINEL,
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::empty_map()
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Integer(i64::from(n))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
