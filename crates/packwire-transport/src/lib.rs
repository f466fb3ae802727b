//! Message-oriented transports for packwire.
//!
//! A [`Connector`] turns a validated [`Endpoint`] into a [`Link`]: a pair of
//! channels carrying whole text or binary messages out, and messages plus
//! connection events in. The session layer never sees the socket itself.
//!
//! Two connectors are provided:
//! - [`WsConnector`]: WebSocket client to `ws://<host>:<port>/api`
//! - [`MemoryConnector`]: in-process pair for tests and demos

pub mod endpoint;
pub mod error;
pub mod link;
pub mod memory;
pub mod ws;

pub use endpoint::{Endpoint, DEFAULT_API_PATH};
pub use error::{Result, TransportError};
pub use link::{Connector, Link, LinkEvents, LinkSender, Message, TransportEvent};
pub use memory::{MemoryConnector, MemoryPeer, MemoryServer};
pub use ws::WsConnector;
