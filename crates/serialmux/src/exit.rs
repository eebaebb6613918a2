use std::fmt;
use std::io;

use serialmux_frame::FrameError;
use serialmux_link::LinkError;
use serialmux_transport::TransportError;

pub const SUCCESS: i32 = 0;
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
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::NotFound
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        TransportError::InvalidEndpoint(_) => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Closed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::InvalidAddress(_) | FrameError::PayloadTooLarge { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Transport(err) => transport_error(context, err),
        LinkError::Frame(err) => frame_error(context, err),
        LinkError::Register(_) => CliError::new(USAGE, format!("{context}: {err}")),
        LinkError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        LinkError::Resynchronized { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serialmux_frame::{RegisterError, VaruintError};
    use serialmux_link::ResyncReason;

    use super::*;

    #[test]
    fn link_errors_map_to_exit_codes() {
        let cases = [
            (LinkError::Timeout(Duration::from_secs(1)), TIMEOUT),
            (
                LinkError::Resynchronized {
                    reason: ResyncReason::BadMagic(0),
                    discarded: 0,
                },
                TRANSPORT_ERROR,
            ),
            (LinkError::Register(RegisterError::EmptyValues), USAGE),
            (LinkError::from(VaruintError::Overlong), DATA_INVALID),
            (LinkError::Transport(TransportError::Closed), TRANSPORT_ERROR),
            (
                LinkError::Frame(FrameError::InvalidAddress(0x90)),
                USAGE,
            ),
        ];
        for (err, code) in cases {
            let msg = err.to_string();
            let mapped = link_error("op", err);
            assert_eq!(mapped.code, code, "{msg}");
            assert!(mapped.message.starts_with("op: "));
        }
    }

    #[test]
    fn io_errors_map_by_kind() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(io_error("connect", refused).code, TRANSPORT_ERROR);
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(io_error("connect", denied).code, PERMISSION_DENIED);
        let other = io::Error::other("boom");
        assert_eq!(io_error("connect", other).code, INTERNAL);
    }

    #[test]
    fn invalid_endpoint_is_usage() {
        let err = transport_error("connect", TransportError::InvalidEndpoint("x".into()));
        assert_eq!(err.code, USAGE);
    }
}
