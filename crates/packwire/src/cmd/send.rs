use packwire_codec::Value;
use packwire_session::{SendOptions, SessionConfig};

use crate::cmd::{open_session, parse_duration, read_json, runtime, SendArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_response, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = read_json(args.json.as_deref(), args.file.as_deref())?.unwrap_or_default();
    let options = if args.no_response {
        SendOptions::no_response()
    } else {
        SendOptions::with_timeout(timeout)
    };

    runtime()?.block_on(async {
        // One-shot: a dropped connection is an error, not a reason to retry.
        let config = SessionConfig {
            request_timeout: timeout,
            max_retries: 0,
            ..SessionConfig::default()
        };
        let session = open_session(&args.server, config).await?;
        let result = session.send(&args.command, params, options).await;
        session.disconnect();

        match result.map_err(|err| session_error("send failed", err))? {
            Some(value) => print_response(&args.command, value, format),
            None if !args.no_response => print_response(&args.command, Value::empty_map(), format),
            None => {}
        }
        Ok(SUCCESS)
    })
}
