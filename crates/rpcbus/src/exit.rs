use std::fmt;
use std::io;

use rpcbus_core::{BusError, Rejection, Status};
use rpcbus_frame::FrameError;
use rpcbus_socket::SocketError;
use rpcbus_transport::TransportError;

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

/// Exit code for a bus status returned by a remote method.
pub fn status_code(status: Status) -> i32 {
    match status {
        Status::Ok => SUCCESS,
        Status::InvalidCommand => USAGE,
        Status::InvalidArgument => DATA_INVALID,
        Status::PermissionDenied => PERMISSION_DENIED,
        Status::Timeout => TIMEOUT,
        Status::ConnectionFailed => TRANSPORT_ERROR,
        Status::MethodNotFound
        | Status::NotFound
        | Status::NoData
        | Status::NotSupported
        | Status::UnknownError => FAILURE,
    }
}

pub fn rejection_error(context: &str, rejection: &Rejection) -> CliError {
    CliError::new(status_code(rejection.status), format!("{context}: {rejection}"))
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidAddress { .. } | TransportError::PathTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn socket_error(context: &str, err: SocketError) -> CliError {
    match err {
        SocketError::Transport(err) => transport_error(context, err),
        SocketError::Frame(err) => frame_error(context, err),
        SocketError::UnknownPeer(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        SocketError::AlreadyListening => CliError::new(USAGE, format!("{context}: {err}")),
        SocketError::IdsExhausted => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn bus_error(context: &str, err: BusError) -> CliError {
    match err {
        BusError::Socket(err) => socket_error(context, err),
        BusError::Rejected(rejection) => rejection_error(context, &rejection),
        BusError::Value(err) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        BusError::UnknownObject(_) => CliError::new(USAGE, format!("{context}: {err}")),
        BusError::UnknownPeer(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_statuses_map_to_exit_codes() {
        assert_eq!(status_code(Status::Ok), SUCCESS);
        assert_eq!(status_code(Status::Timeout), TIMEOUT);
        assert_eq!(status_code(Status::PermissionDenied), PERMISSION_DENIED);
        assert_eq!(status_code(Status::InvalidArgument), DATA_INVALID);
        assert_eq!(status_code(Status::ConnectionFailed), TRANSPORT_ERROR);
        assert_eq!(status_code(Status::MethodNotFound), FAILURE);
    }

    #[test]
    fn refused_connection_is_a_transport_error() {
        let err = transport_error(
            "connect failed",
            TransportError::Connect {
                address: "/tmp/missing.sock".to_string(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("connect failed: "));
    }

    #[test]
    fn bus_rejection_keeps_status_code() {
        let err = bus_error(
            "call failed",
            BusError::Rejected(Rejection::new(Status::NotFound)),
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.contains("call failed"));
    }
}
