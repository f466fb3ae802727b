use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use packwire_transport::DEFAULT_API_PATH;

/// Runtime configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a request waits for its response.
    pub request_timeout: Duration,
    /// Delay between a close and the next connection attempt.
    pub retry_delay: Duration,
    /// Reconnect attempts before the session gives up.
    pub max_retries: u32,
    /// Idle time between a pong and the next ping.
    pub ping_interval: Duration,
    /// Path of the API endpoint on the server.
    pub api_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
            max_retries: 500,
            ping_interval: Duration::from_secs(30),
            api_path: DEFAULT_API_PATH.to_string(),
        }
    }
}

/// Per-call options for [`Session::send`](crate::Session::send).
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Fire and forget: no pending call, resolves to `None`.
    pub no_response: bool,
    /// Overrides [`SessionConfig::request_timeout`].
    pub timeout: Option<Duration>,
}

impl SendOptions {
    pub fn no_response() -> Self {
        Self {
            no_response: true,
            timeout: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            no_response: false,
            timeout: Some(timeout),
        }
    }
}

/// Where the session reads the server address.
///
/// Consulted on every connect, so changes apply on the next attempt.
pub trait SettingsSource: Send + Sync + 'static {
    fn server_host(&self) -> String;
    fn server_port(&self) -> String;
}

/// Fixed host and port.
#[derive(Debug, Clone)]
pub struct StaticSettings {
    host: String,
    port: String,
}

impl StaticSettings {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }
}

impl SettingsSource for StaticSettings {
    fn server_host(&self) -> String {
        self.host.clone()
    }

    fn server_port(&self) -> String {
        self.port.clone()
    }
}

/// Host and port that can be changed while the session runs.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<(String, String)>>,
}

impl SharedSettings {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new((host.into(), port.into()))),
        }
    }

    pub fn set(&self, host: impl Into<String>, port: impl Into<String>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = (host.into(), port.into());
    }
}

impl SettingsSource for SharedSettings {
    fn server_host(&self) -> String {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .clone()
    }

    fn server_port(&self) -> String {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .1
            .clone()
    }
}
