use tracing::warn;

/// Outward-facing side effects of a session.
///
/// `notify` receives user-visible messages such as `request timeout <id>` or
/// `Received error:<code> (<id>)`. `needs_configuration` fires when the
/// server address is invalid, the transport errors, or reconnection gives up.
pub trait SessionHooks: Send + Sync + 'static {
    fn notify(&self, message: &str);
    fn needs_configuration(&self);
}

/// Hooks that only log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHooks;

impl SessionHooks for LogHooks {
    fn notify(&self, message: &str) {
        warn!(message, "session notice");
    }

    fn needs_configuration(&self) {
        warn!("server address needs configuration");
    }
}
