use std::time::Duration;

use packwire_codec::Value;
use packwire_frame::RequestId;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] packwire_transport::TransportError),

    /// Frame-level error (encoding params, decoding a payload).
    #[error("frame error: {0}")]
    Frame(#[from] packwire_frame::FrameError),

    /// The configured host/port failed validation.
    #[error("server address not configured: {0}")]
    Unconfigured(#[source] packwire_transport::TransportError),

    /// No open connection to send on.
    #[error("not connected")]
    NotConnected,

    /// No response arrived in time.
    #[error("request {id} timed out after {after:?}")]
    Timeout { id: RequestId, after: Duration },

    /// The server answered with a nonzero status.
    #[error("server returned error {code} for request {id}")]
    Remote { code: u8, id: RequestId, data: Value },

    /// The connection went away before the response arrived.
    #[error("connection closed before a response arrived")]
    Disconnected,

    /// Reconnection gave up; only a forced connect starts over.
    #[error("reconnect gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// A subscription names no events.
    #[error("subscription has no events")]
    EmptySubscription,

    /// A sub-type was given without the arguments it qualifies.
    #[error("subscription sub-type {subtype} needs at least one argument")]
    SubtypeWithoutArgument { subtype: u8 },
}

pub type Result<T> = std::result::Result<T, SessionError>;
