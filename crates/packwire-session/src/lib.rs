//! Request/response and event subscription session over a packwire
//! transport.
//!
//! A [`Session`] owns one logical connection. It multiplexes concurrent
//! requests by request id, fans server events out to registered handlers,
//! keeps the link alive with pong-driven pings, and reconnects after a close
//! with a fixed delay until its retry budget runs out.

pub mod config;
pub mod control;
pub mod error;
pub mod hooks;
pub mod pending;
pub mod registry;
pub mod session;
pub mod state;

pub use config::{SendOptions, SessionConfig, SettingsSource, SharedSettings, StaticSettings};
pub use control::{SubscribeMessage, CONTROL_PING, CONTROL_PONG, SUBSCRIBE_COMMAND};
pub use error::{Result, SessionError};
pub use hooks::{LogHooks, SessionHooks};
pub use pending::PendingCalls;
pub use registry::{Handler, ReceivedEvent, Subscription, SubscriptionRegistry};
pub use session::Session;
pub use state::ConnectionState;
