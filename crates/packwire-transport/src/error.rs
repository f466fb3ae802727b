/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host is not an IPv4/IPv6 address or a hostname.
    #[error("invalid host {0:?}")]
    InvalidHost(String),

    /// The port is not a decimal number in 1..=65534.
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// The WebSocket handshake failed.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    /// The connection attempt did not finish in time.
    #[error("connection to {url} timed out")]
    Timeout { url: String },

    /// The peer refused the connection.
    #[error("connection to {url} refused")]
    Refused { url: String },

    /// The link has been closed.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
