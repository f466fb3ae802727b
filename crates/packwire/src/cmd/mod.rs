use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use packwire_codec::Value;
use packwire_session::{ConnectionState, LogHooks, Session, SessionConfig, StaticSettings};
use packwire_transport::{WsConnector, DEFAULT_API_PATH};
use tracing::debug;

use crate::exit::{io_error, session_error, CliError, CliResult, INTERNAL, TRANSPORT_ERROR, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a JSON value into the packed binary format.
    Encode(EncodeArgs),
    /// Decode packed bytes and print them as JSON.
    Decode(DecodeArgs),
    /// Send one request to a server and print the response.
    Send(SendArgs),
    /// Subscribe to server events and print them.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// JSON value to encode.
    #[arg(conflicts_with = "file")]
    pub json: Option<String>,
    /// Read the JSON value from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Packed bytes as hex. Reads raw bytes from stdin when omitted.
    #[arg(conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read raw packed bytes from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Where to connect.
#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Server host name or IP address.
    #[arg(long, env = "PACKWIRE_HOST", default_value = "127.0.0.1")]
    pub host: String,
    /// Server port.
    #[arg(long, env = "PACKWIRE_PORT", default_value = "8080")]
    pub port: String,
    /// API path on the server.
    #[arg(long, default_value = DEFAULT_API_PATH)]
    pub path: String,
    /// WebSocket handshake timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub server: ServerArgs,
    /// Command name.
    pub command: String,
    /// JSON parameters. Defaults to an empty map.
    #[arg(long, conflicts_with = "file")]
    pub json: Option<String>,
    /// Read JSON parameters from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Do not wait for a response.
    #[arg(long)]
    pub no_response: bool,
    /// Response timeout (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub server: ServerArgs,
    /// Event command numbers (comma-separated).
    #[arg(long, short = 'e', value_delimiter = ',', required = true)]
    pub events: Vec<u8>,
    /// Only these event arguments (comma-separated).
    #[arg(long, short = 'a', value_delimiter = ',')]
    pub arguments: Vec<u8>,
    /// Only this event sub-type. Requires --arguments.
    #[arg(long, requires = "arguments")]
    pub subtype: Option<u8>,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    /// Reconnect attempts after the connection drops.
    #[arg(long, default_value_t = 500)]
    pub retries: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// JSON from an inline argument or a file, converted to a packable value.
pub(crate) fn read_json(inline: Option<&str>, file: Option<&Path>) -> CliResult<Option<Value>> {
    let text = match (inline, file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        (None, None) => return Ok(None),
    };
    let json: serde_json::Value = serde_json::from_str(&text)
        .map_err(|err| CliError::new(USAGE, format!("input is not valid JSON: {err}")))?;
    Value::try_from(json)
        .map(Some)
        .map_err(|err| crate::exit::encode_error("input cannot be packed", err))
}

pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
}

/// Connect and wait until the session is open or has given up.
pub(crate) async fn open_session(server: &ServerArgs, config: SessionConfig) -> CliResult<Session> {
    let connect_timeout = parse_duration(&server.connect_timeout)?;
    let config = SessionConfig {
        api_path: server.path.clone(),
        ..config
    };
    let session = Session::new(
        config,
        WsConnector::new().with_connect_timeout(connect_timeout),
        StaticSettings::new(server.host.as_str(), server.port.as_str()),
        LogHooks,
    );

    let mut state = session.watch_state();
    session
        .connect(true)
        .map_err(|err| session_error("connect failed", err))?;
    let reached = *state
        .wait_for(|state| matches!(state, ConnectionState::Open | ConnectionState::Disconnected))
        .await
        .map_err(|_| CliError::new(INTERNAL, "session dropped while connecting"))?;

    if reached != ConnectionState::Open {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            format!("could not connect to {}:{}", server.host, server.port),
        ));
    }
    debug!(host = %server.host, port = %server.port, "session open");
    Ok(session)
}
