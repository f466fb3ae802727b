use packwire_codec::encode;

use crate::cmd::{read_json, EncodeArgs};
use crate::exit::{encode_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let value = read_json(args.json.as_deref(), args.file.as_deref())?
        .ok_or_else(|| CliError::new(USAGE, "nothing to encode: pass JSON or --file"))?;
    let bytes = encode(&value).map_err(|err| encode_error("encode failed", err))?;
    print_encoded(&bytes, format);
    Ok(SUCCESS)
}
