//! Request, response and event framing on top of the packwire codec.
//!
//! Three frame shapes share one connection:
//! - request (client → server): `id (11) | NUL | command | NUL | packed params`
//! - response (server → client): `id (11) | status (1) | payload`
//! - event (server → client): `"event" | command | sub-type | argument | packed payload`
//!
//! Responses arrive either as binary frames (packed payload) or text frames
//! (text payload, status carried as a single code point).

pub mod codec;
pub mod error;
pub mod id;

pub use codec::{
    classify_binary, classify_text, decode_request, encode_event, encode_request,
    encode_response, encode_text_response, Body, Event, Inbound, Request, Response,
    EVENT_HEADER_SIZE, EVENT_MARKER, MAX_COMMAND_LEN, PONG, RESPONSE_HEADER_SIZE, STATUS_OK,
};
pub use error::{FrameError, Result};
pub use id::{RequestId, BROADCAST_ID, REQUEST_ID_LEN};
