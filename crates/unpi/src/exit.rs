use std::fmt;
use std::io;

use unpi_broker::BrokerError;
use unpi_frame::FrameError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::WriteZero => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn broker_error(context: &str, err: BrokerError) -> CliError {
    match err {
        BrokerError::WriteFailed(source) => io_error(context, source),
        BrokerError::InvalidFrame(err) | BrokerError::DecodeFailed(err) => frame_error(context, err),
        BrokerError::NotAsynchronous(_) | BrokerError::NotSynchronous(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        BrokerError::TimedOut(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        BrokerError::Terminated => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        BrokerError::UnexpectedResponse { .. } | BrokerError::Command(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeouts_map_to_timeout_code() {
        let err = broker_error("request failed", BrokerError::TimedOut(Duration::from_secs(5)));
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("request failed: "));
    }

    #[test]
    fn closed_link_is_a_transport_error() {
        assert_eq!(broker_error("x", BrokerError::Terminated).code, TRANSPORT_ERROR);
        assert_eq!(
            broker_error("x", BrokerError::WriteFailed(io::ErrorKind::BrokenPipe.into())).code,
            TRANSPORT_ERROR
        );
    }

    #[test]
    fn oversized_payload_is_invalid_data() {
        let err = broker_error(
            "x",
            BrokerError::InvalidFrame(FrameError::PayloadTooLarge { size: 300, max: 250 }),
        );
        assert_eq!(err.code, DATA_INVALID);
    }
}
