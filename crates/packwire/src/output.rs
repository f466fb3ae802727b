use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use packwire_codec::Value;
use packwire_session::ReceivedEvent;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    command: &'a str,
    response: serde_json::Value,
    timestamp: String,
}

#[derive(Serialize)]
struct EventOutput {
    command: u8,
    subtype: u8,
    argument: u8,
    payload: serde_json::Value,
    timestamp: String,
}

#[derive(Serialize)]
struct EncodedOutput {
    size: usize,
    hex: String,
}

pub fn print_response(command: &str, value: Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ResponseOutput {
            command,
            response: value.into(),
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => print_table(&["KEY", "VALUE"], value_rows(value)),
        OutputFormat::Pretty => println!("{command}: {}", pretty(value)),
        OutputFormat::Raw => println!("{}", serde_json::Value::from(value)),
    }
}

pub fn print_event(event: &ReceivedEvent, format: OutputFormat) {
    let payload = serde_json::Value::from(event.payload.clone());
    match format {
        OutputFormat::Json => print_json(&EventOutput {
            command: event.command,
            subtype: event.subtype,
            argument: event.argument,
            payload,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => print_table(
            &["EVENT", "SUB", "ARG", "PAYLOAD"],
            vec![vec![
                event.command.to_string(),
                event.subtype.to_string(),
                event.argument.to_string(),
                payload.to_string(),
            ]],
        ),
        OutputFormat::Pretty => println!(
            "event={} sub={} arg={} payload={}",
            event.command, event.subtype, event.argument, payload
        ),
        OutputFormat::Raw => println!("{payload}"),
    }
}

pub fn print_encoded(bytes: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            size: bytes.len(),
            hex: hex::encode(bytes),
        }),
        OutputFormat::Table => print_table(
            &["SIZE", "HEX"],
            vec![vec![bytes.len().to_string(), hex::encode(bytes)]],
        ),
        OutputFormat::Pretty => println!("size={} hex={}", bytes.len(), hex::encode(bytes)),
        OutputFormat::Raw => print_raw(bytes),
    }
}

pub fn print_decoded(value: Value, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => println!("{}", serde_json::Value::from(value)),
        OutputFormat::Table => print_table(&["KEY", "VALUE"], value_rows(value)),
        OutputFormat::Pretty => println!("{}", pretty(value)),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// One row per top-level entry for maps and arrays, a single row otherwise.
fn value_rows(value: Value) -> Vec<Vec<String>> {
    match value {
        Value::Map(map) => map
            .into_iter()
            .map(|(key, item)| vec![key, serde_json::Value::from(item).to_string()])
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| vec![index.to_string(), serde_json::Value::from(item).to_string()])
            .collect(),
        other => vec![vec![String::new(), serde_json::Value::from(other).to_string()]],
    }
}

fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

fn print_json<T: Serialize>(out: &T) {
    println!(
        "{}",
        serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn pretty(value: Value) -> String {
    let json = serde_json::Value::from(value);
    serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_rows_are_sorted_entries() {
        let value: Value = [("b", 2), ("a", 1)].into_iter().collect();
        assert_eq!(
            value_rows(value),
            vec![
                vec!["a".to_string(), "1".to_string()],
                vec!["b".to_string(), "2".to_string()],
            ]
        );
    }

    #[test]
    fn scalar_is_a_single_row() {
        assert_eq!(
            value_rows(Value::from("ok")),
            vec![vec![String::new(), "\"ok\"".to_string()]]
        );
    }
}
