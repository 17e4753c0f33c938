use std::fmt;
use std::io;

use lanewire_frame::FrameError;
use lanewire_link::LinkError;

// Process exit codes. 64 and 124 follow sysexits and timeout(1).
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
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Layout(_)
        | FrameError::TooManyNodes { .. }
        | FrameError::MessageTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Bind { source, .. }
        | LinkError::Connect { source, .. }
        | LinkError::Accept(source)
        | LinkError::Io(source) => io_error(context, source),
        LinkError::Frame(err) => frame_error(context, err),
        LinkError::PathTooLong { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        LinkError::Disconnected => CliError::new(FAILURE, format!("{context}: {err}")),
        LinkError::Desynchronized(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use lanewire_frame::DecodeError;

    use super::*;

    #[test]
    fn link_errors_map_to_exit_codes() {
        assert_eq!(link_error("recv", LinkError::Disconnected).code, FAILURE);
        assert_eq!(
            link_error(
                "recv",
                LinkError::Desynchronized(DecodeError::ZeroNodeCount)
            )
            .code,
            DATA_INVALID
        );
        assert_eq!(
            link_error(
                "send",
                LinkError::Frame(FrameError::MessageTooLarge { size: 9, max: 1 })
            )
            .code,
            DATA_INVALID
        );
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(link_error("bind", LinkError::Accept(denied)).code, PERMISSION_DENIED);
    }

    #[test]
    fn context_prefixes_message() {
        let err = link_error("connect failed", LinkError::Disconnected);
        assert_eq!(err.to_string(), "connect failed: peer disconnected");
    }
}
