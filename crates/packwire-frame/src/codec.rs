use bytes::{BufMut, Bytes, BytesMut};
use packwire_codec::{decode, encode_into, Value};

use crate::error::{FrameError, Result};
use crate::id::{RequestId, REQUEST_ID_LEN};

/// Literal prefix of every event frame.
pub const EVENT_MARKER: [u8; 5] = *b"event";

/// Event header: marker (5) + command (1) + sub-type (1) + argument (1).
pub const EVENT_HEADER_SIZE: usize = 8;

/// Response header: id (11) + status (1).
pub const RESPONSE_HEADER_SIZE: usize = REQUEST_ID_LEN + 1;

/// Status byte of a successful response.
pub const STATUS_OK: u8 = 0;

/// Longest command name a server dispatches.
pub const MAX_COMMAND_LEN: usize = 24;

/// Liveness reply sent by the server as a text frame.
pub const PONG: &str = "pong";

// Both request separators must appear this early.
const SEPARATOR_WINDOW: usize = REQUEST_ID_LEN + 1 + MAX_COMMAND_LEN + 1;

/// A decoded request (server side).
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub command: String,
    pub params: Value,
}

/// Response payload as it arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Packed bytes from a binary frame.
    Packed(Bytes),
    /// Text from a text frame.
    Text(String),
}

/// A response to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub status: u8,
    pub body: Body,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Decode the body. Text bodies come back as a string value; an empty
    /// packed body decodes to an empty map.
    pub fn decode_payload(&self) -> Result<Value> {
        match &self.body {
            Body::Packed(bytes) => Ok(decode(bytes)?),
            Body::Text(text) => Ok(Value::String(text.clone())),
        }
    }
}

/// A server-pushed event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub command: u8,
    pub subtype: u8,
    pub argument: u8,
    pub payload: Bytes,
}

impl Event {
    pub fn decode_payload(&self) -> Result<Value> {
        Ok(decode(&self.payload)?)
    }
}

/// What a client received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Pong,
    Response(Response),
    Event(Event),
}

fn check_command(command: &str) -> Result<()> {
    let valid = !command.is_empty()
        && command.len() <= MAX_COMMAND_LEN
        && command.bytes().all(|b| b.is_ascii_graphic());
    if valid {
        Ok(())
    } else {
        Err(FrameError::InvalidCommand(command.to_string()))
    }
}

/// Encode a request into the wire format.
///
/// ```text
/// ┌────────────┬─────┬──────────┬─────┬──────────────────┐
/// │ Id (11B)   │ NUL │ Command  │ NUL │ Packed params    │
/// └────────────┴─────┴──────────┴─────┴──────────────────┘
/// ```
///
/// On failure `dst` is left as it was.
pub fn encode_request(
    id: &RequestId,
    command: &str,
    params: &Value,
    dst: &mut BytesMut,
) -> Result<()> {
    check_command(command)?;
    let start = dst.len();
    dst.reserve(REQUEST_ID_LEN + command.len() + 2);
    dst.put_slice(id.as_bytes());
    dst.put_u8(0);
    dst.put_slice(command.as_bytes());
    dst.put_u8(0);
    if let Err(err) = encode_into(params, dst) {
        dst.truncate(start);
        return Err(err.into());
    }
    Ok(())
}

/// Decode a request frame (server side).
///
/// An empty params section decodes to an empty map.
pub fn decode_request(src: &[u8]) -> Result<Request> {
    let window = &src[..src.len().min(SEPARATOR_WINDOW)];
    let first = window
        .iter()
        .position(|&b| b == 0)
        .ok_or(FrameError::MissingSeparator)?;
    let second = window[first + 1..]
        .iter()
        .position(|&b| b == 0)
        .map(|offset| first + 1 + offset)
        .ok_or(FrameError::MissingSeparator)?;

    let id = RequestId::from_bytes(&src[..first])?;
    let command = std::str::from_utf8(&src[first + 1..second])
        .map_err(|_| {
            FrameError::InvalidCommand(String::from_utf8_lossy(&src[first + 1..second]).into_owned())
        })?
        .to_string();
    check_command(&command)?;
    let params = decode(&src[second + 1..])?;

    Ok(Request {
        id,
        command,
        params,
    })
}

/// Encode a binary response: `id + status + packed payload`.
///
/// Error responses (nonzero status) are usually sent without a payload.
pub fn encode_response(
    id: &RequestId,
    status: u8,
    payload: Option<&Value>,
    dst: &mut BytesMut,
) -> Result<()> {
    let start = dst.len();
    dst.reserve(RESPONSE_HEADER_SIZE);
    dst.put_slice(id.as_bytes());
    dst.put_u8(status);
    if let Some(payload) = payload {
        if let Err(err) = encode_into(payload, dst) {
            dst.truncate(start);
            return Err(err.into());
        }
    }
    Ok(())
}

/// Encode a text response: `id + status code point + text`.
pub fn encode_text_response(id: &RequestId, status: u8, text: &str) -> String {
    let mut out = String::with_capacity(RESPONSE_HEADER_SIZE + 1 + text.len());
    out.push_str(id.as_str());
    out.push(char::from(status));
    out.push_str(text);
    out
}

/// Encode an event frame.
///
/// ```text
/// ┌───────────┬─────────┬──────────┬──────────┬────────────────┐
/// │ "event"   │ Command │ Sub-type │ Argument │ Packed payload │
/// │ (5B)      │ (1B)    │ (1B)     │ (1B)     │                │
/// └───────────┴─────────┴──────────┴──────────┴────────────────┘
/// ```
pub fn encode_event(
    command: u8,
    subtype: u8,
    argument: u8,
    payload: &Value,
    dst: &mut BytesMut,
) -> Result<()> {
    let start = dst.len();
    dst.reserve(EVENT_HEADER_SIZE);
    dst.put_slice(&EVENT_MARKER);
    dst.put_u8(command);
    dst.put_u8(subtype);
    dst.put_u8(argument);
    if let Err(err) = encode_into(payload, dst) {
        dst.truncate(start);
        return Err(err.into());
    }
    Ok(())
}

/// Classify a binary frame from the server.
///
/// Frames starting with `event` are events; everything else is a response.
/// Payloads are left packed for the caller to decode.
pub fn classify_binary(frame: Bytes) -> Result<Inbound> {
    if frame.starts_with(&EVENT_MARKER) {
        if frame.len() < EVENT_HEADER_SIZE {
            return Err(FrameError::ShortFrame {
                len: frame.len(),
                min: EVENT_HEADER_SIZE,
            });
        }
        return Ok(Inbound::Event(Event {
            command: frame[5],
            subtype: frame[6],
            argument: frame[7],
            payload: frame.slice(EVENT_HEADER_SIZE..),
        }));
    }

    if frame.len() < RESPONSE_HEADER_SIZE {
        return Err(FrameError::ShortFrame {
            len: frame.len(),
            min: RESPONSE_HEADER_SIZE,
        });
    }
    Ok(Inbound::Response(Response {
        id: RequestId::from_bytes(&frame[..REQUEST_ID_LEN])?,
        status: frame[REQUEST_ID_LEN],
        body: Body::Packed(frame.slice(RESPONSE_HEADER_SIZE..)),
    }))
}

/// Classify a text frame from the server: `pong` or a text response.
pub fn classify_text(text: &str) -> Result<Inbound> {
    if text == PONG {
        return Ok(Inbound::Pong);
    }
    let short = || FrameError::ShortFrame {
        len: text.len(),
        min: RESPONSE_HEADER_SIZE,
    };

    let id = text.get(..REQUEST_ID_LEN).ok_or_else(short)?;
    let id = RequestId::parse(id)?;
    let mut rest = text[REQUEST_ID_LEN..].chars();
    let status = rest.next().ok_or_else(short)?;
    let status = u8::try_from(u32::from(status))
        .map_err(|_| FrameError::InvalidStatus(u32::from(status)))?;

    Ok(Inbound::Response(Response {
        id,
        status,
        body: Body::Text(rest.as_str().to_string()),
    }))
}
