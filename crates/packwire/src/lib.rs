//! Compact binary values, request/event framing and a reconnecting
//! WebSocket session client.
//!
//! # Crate Structure
//!
//! - [`codec`]: self-describing binary encoding of value trees
//! - [`frame`]: request, response and event frame layouts
//! - [`transport`]: endpoint validation and message links (WebSocket, in-memory)
//! - [`session`]: request/response calls and event subscriptions (behind `session` feature)

/// Re-export codec types.
pub mod codec {
    pub use packwire_codec::*;
}

/// Re-export frame types.
pub mod frame {
    pub use packwire_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use packwire_transport::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use packwire_session::*;
}
