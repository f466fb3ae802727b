use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

use crate::error::{Result, TransportError};

/// Path of the API endpoint on the server.
pub const DEFAULT_API_PATH: &str = "/api";

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// A syntactically valid server address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: Host,
    port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Host {
    Ip(IpAddr),
    Name(String),
}

impl Endpoint {
    /// Validate host and port strings as supplied by a settings source.
    ///
    /// The host must be an IPv4 address, an IPv6 address (optionally in
    /// brackets) or a DNS hostname. The port must be all digits in
    /// `1..=65534`.
    pub fn parse(host: &str, port: &str) -> Result<Self> {
        Ok(Self {
            host: parse_host(host)?,
            port: parse_port(port)?,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host as written in a URL (IPv6 in brackets).
    pub fn host(&self) -> String {
        match &self.host {
            Host::Ip(IpAddr::V6(ip)) => format!("[{ip}]"),
            Host::Ip(IpAddr::V4(ip)) => ip.to_string(),
            Host::Name(name) => name.clone(),
        }
    }

    /// WebSocket URL for `path` on this endpoint.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("ws://{self}{path}")
        } else {
            format!("ws://{self}/{path}")
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host(), self.port)
    }
}

fn parse_host(host: &str) -> Result<Host> {
    let invalid = || TransportError::InvalidHost(host.to_string());

    if let Some(inner) = host.strip_prefix('[') {
        let inner = inner.strip_suffix(']').ok_or_else(invalid)?;
        return inner
            .parse::<Ipv6Addr>()
            .map(|ip| Host::Ip(IpAddr::V6(ip)))
            .map_err(|_| invalid());
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Host::Ip(ip));
    }
    // Dotted digits that failed to parse are a broken IPv4 address.
    if host.split('.').all(|label| label.bytes().all(|b| b.is_ascii_digit())) {
        return Err(invalid());
    }
    if is_hostname(host) {
        Ok(Host::Name(host.to_ascii_lowercase()))
    } else {
        Err(invalid())
    }
}

fn is_hostname(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    !host.is_empty()
        && host.len() <= MAX_HOSTNAME_LEN
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= MAX_LABEL_LEN
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

fn parse_port(port: &str) -> Result<u16> {
    let invalid = || TransportError::InvalidPort(port.to_string());
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match port.parse::<u16>() {
        Ok(n) if (1..=65534).contains(&n) => Ok(n),
        _ => Err(invalid()),
    }
}
