//! Conversions between [`Value`] and `serde_json::Value`.
//!
//! JSON numbers become [`Value::Integer`] when they are integral (`3`, but
//! also `3.0` or `3e2` within `±u32::MAX`), otherwise [`Value::Float`]
//! (narrowed to 32 bits). JSON `null` becomes [`Value::Null`].

use crate::encode::MAX_DEPTH;
use crate::error::EncodeError;
use crate::path::Path;
use crate::value::{Map, Value};

impl TryFrom<&serde_json::Value> for Value {
    type Error = EncodeError;

    fn try_from(json: &serde_json::Value) -> Result<Self, Self::Error> {
        from_json(json, &mut Path::root())
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = EncodeError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        Value::try_from(&json)
    }
}

fn from_json(json: &serde_json::Value, path: &mut Path) -> Result<Value, EncodeError> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(u) = n.as_u64() {
                return Err(EncodeError::IntegerOutOfRange {
                    magnitude: u,
                    path: path.clone(),
                });
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() <= f64::from(u32::MAX) {
                    // Lossless: integral and within the 4-byte magnitude range.
                    Value::Integer(f as i64)
                } else {
                    Value::Float(f as f32)
                }
            } else {
                return Err(EncodeError::Unsupported {
                    kind: format!("number {n}"),
                    path: path.clone(),
                });
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            check_depth(path)?;
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                path.push_index(index);
                out.push(from_json(item, path)?);
                path.pop();
            }
            Value::Array(out)
        }
        serde_json::Value::Object(object) => {
            check_depth(path)?;
            let mut out = Map::new();
            for (key, item) in object {
                path.push_key(key);
                out.insert(key.clone(), from_json(item, path)?);
                path.pop();
            }
            Value::Map(out)
        }
    })
}

fn check_depth(path: &Path) -> Result<(), EncodeError> {
    if path.depth() >= MAX_DEPTH {
        return Err(EncodeError::TooDeep {
            max: MAX_DEPTH,
            path: path.clone(),
        });
    }
    Ok(())
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Integer(n) => serde_json::Value::from(n),
            Value::Float(f) => serde_json::Number::from_f64(f64::from(f))
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
            Value::Null | Value::Undefined => serde_json::Value::Null,
        }
    }
}
