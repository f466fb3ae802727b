use packwire_codec::{Map, Value};

/// Liveness check sent as a text frame.
pub const CONTROL_PING: &str = "ping";
/// Liveness reply received as a text frame.
pub const CONTROL_PONG: &str = "pong";
/// Command announcing (or withdrawing) interest in server events.
pub const SUBSCRIBE_COMMAND: &str = "subscribe";

/// Payload of a `subscribe` request.
///
/// Encoded as `{evt, act, sub?, arg?}` where `evt` is a number for a single
/// event and an array otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeMessage {
    pub events: Vec<u8>,
    pub active: bool,
    pub subtype: Option<u8>,
    pub argument: Option<u8>,
}

impl SubscribeMessage {
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        let evt = match self.events.as_slice() {
            [single] => Value::from(*single),
            many => Value::Array(many.iter().copied().map(Value::from).collect()),
        };
        map.insert("evt".to_string(), evt);
        map.insert("act".to_string(), Value::Boolean(self.active));
        if let Some(sub) = self.subtype {
            map.insert("sub".to_string(), Value::from(sub));
        }
        if let Some(arg) = self.argument {
            map.insert("arg".to_string(), Value::from(arg));
        }
        Value::Map(map)
    }
}

impl From<&SubscribeMessage> for Value {
    fn from(message: &SubscribeMessage) -> Self {
        message.to_value()
    }
}
