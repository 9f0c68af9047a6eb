use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use unpi_broker::{CancellationToken, DEFAULT_RETRIES};
use unpi_frame::Subsystem;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod device;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one request to the coprocessor.
    Send(SendArgs),
    /// Print frames received from the coprocessor.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format).await,
        Command::Listen(args) => listen::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RequestKind {
    /// Synchronous request; waits for and prints the response.
    Sreq,
    /// Asynchronous request; returns once written.
    Areq,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Serial device or Unix socket path.
    pub device: PathBuf,
    /// Request kind.
    #[arg(long, default_value = "sreq")]
    pub kind: RequestKind,
    /// Subsystem name (e.g. SYS, ZDO) or number.
    #[arg(long, short = 's')]
    pub subsystem: Subsystem,
    /// Command id (decimal or 0x-prefixed hex).
    #[arg(long, short = 'c', value_parser = parse_byte)]
    pub command: u8,
    /// Payload as hex (e.g. 0a1b or "0a 1b").
    #[arg(long, short = 'd')]
    pub data: Option<String>,
    /// Per-attempt response timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Extra attempts after a timeout.
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Serial device or Unix socket path.
    pub device: PathBuf,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print every incoming frame, including synchronous responses.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_byte(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid byte value: {input}"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
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

/// A token that is cancelled when the process receives Ctrl-C.
pub fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            trigger.cancel();
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_byte_accepts_decimal_and_hex() {
        assert_eq!(parse_byte("2"), Ok(2));
        assert_eq!(parse_byte("0x1f"), Ok(0x1f));
        assert!(parse_byte("256").is_err());
        assert!(parse_byte("0xzz").is_err());
    }
}
