use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use unpi_frame::Frame;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    kind: &'a str,
    subsystem: &'a str,
    subsystem_id: u8,
    command_id: u8,
    payload_size: usize,
    payload: String,
    timestamp_ms: u128,
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                kind: frame.kind.as_str(),
                subsystem: frame.subsystem.name(),
                subsystem_id: frame.subsystem.id(),
                command_id: frame.command_id,
                payload_size: frame.payload.len(),
                payload: to_hex(&frame.payload),
                timestamp_ms: now_unix_millis(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "SUBSYSTEM", "COMMAND", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    frame.kind.to_string(),
                    frame.subsystem.to_string(),
                    format!("{:#04x}", frame.command_id),
                    frame.payload.len().to_string(),
                    to_hex(&frame.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} {}/{:#04x} size={} payload={}",
                frame.kind,
                frame.subsystem,
                frame.command_id,
                frame.payload.len(),
                to_hex(&frame.payload)
            );
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            let _ = out.write_all(&frame.payload);
            let _ = out.flush();
        }
    }
}

/// Lowercase hex without separators.
pub fn to_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn now_unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
