use bytes::Bytes;
use tracing::debug;
use unpi_broker::{Broker, BrokerConfig, RequestResponder, RetryPolicy};
use unpi_frame::{Frame, MessageKind, MAX_PAYLOAD};

use crate::cmd::{ctrl_c_token, device, parse_duration, RequestKind, SendArgs};
use crate::exit::{broker_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_frame, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = match &args.data {
        Some(data) => parse_hex(data)?,
        None => Vec::new(),
    };
    if payload.len() > MAX_PAYLOAD {
        return Err(CliError::new(
            DATA_INVALID,
            format!("payload is {} bytes, max {MAX_PAYLOAD}", payload.len()),
        ));
    }

    let kind = match args.kind {
        RequestKind::Sreq => MessageKind::SyncRequest,
        RequestKind::Areq => MessageKind::AsyncRequest,
    };
    let frame = Frame::new(kind, args.subsystem, args.command, Bytes::from(payload));

    let (reader, writer) = device::open(&args.device).await?;
    // Nothing here drains the raw queue.
    let broker = Broker::with_config(
        reader,
        writer,
        BrokerConfig {
            passthrough: false,
            ..BrokerConfig::default()
        },
    );
    let responder = RequestResponder::with_policy(
        broker,
        RetryPolicy {
            timeout,
            max_retries: args.retries,
        },
    );
    debug!(
        kind = %frame.kind,
        subsystem = %frame.subsystem,
        command_id = frame.command_id,
        "sending request"
    );

    let result = match args.kind {
        RequestKind::Areq => responder.requester().async_request(&frame).await,
        RequestKind::Sreq => {
            let cancel = ctrl_c_token();
            responder
                .request_frame(frame, &cancel)
                .await
                .map(|response| print_frame(&response, format))
        }
    };
    responder.requester().shutdown().await;

    result.map_err(|err| broker_error("request failed", err))?;
    Ok(SUCCESS)
}

/// Parse a hex payload. Whitespace, `:` separators and a leading `0x` are ignored.
fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let input = input.trim();
    let input = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            "--data must have an even number of hex digits",
        ));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).unwrap_or("");
            u8::from_str_radix(text, 16)
                .map_err(|_| CliError::new(USAGE, format!("--data is not valid hex: {input}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_common_spellings() {
        assert_eq!(parse_hex("0a1b").unwrap(), vec![0x0a, 0x1b]);
        assert_eq!(parse_hex("0x0A 1B").unwrap(), vec![0x0a, 0x1b]);
        assert_eq!(parse_hex("de:ad:be:ef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert_eq!(parse_hex("abc").unwrap_err().code, USAGE);
        assert_eq!(parse_hex("zz").unwrap_err().code, USAGE);
    }
}
