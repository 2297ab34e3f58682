use std::fmt;

use rpcbus_value::Value;

/// Result status of a method call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok = 0,
    InvalidCommand = 1,
    InvalidArgument = 2,
    MethodNotFound = 3,
    NotFound = 4,
    NoData = 5,
    PermissionDenied = 6,
    Timeout = 7,
    NotSupported = 8,
    UnknownError = 9,
    ConnectionFailed = 10,
}

impl Status {
    pub const ALL: [Status; 11] = [
        Status::Ok,
        Status::InvalidCommand,
        Status::InvalidArgument,
        Status::MethodNotFound,
        Status::NotFound,
        Status::NoData,
        Status::PermissionDenied,
        Status::Timeout,
        Status::NotSupported,
        Status::UnknownError,
        Status::ConnectionFailed,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "Success",
            Status::InvalidCommand => "Invalid command",
            Status::InvalidArgument => "Invalid argument",
            Status::MethodNotFound => "Method not found",
            Status::NotFound => "Not found",
            Status::NoData => "No response",
            Status::PermissionDenied => "Permission denied",
            Status::Timeout => "Request timed out",
            Status::NotSupported => "Operation not supported",
            Status::UnknownError => "Unknown error",
            Status::ConnectionFailed => "Connection failed",
        }
    }

    /// Error payload: `{"code", "message"}` plus `"object"`/`"method"` when known.
    pub fn error_value(self, object: Option<&str>, method: Option<&str>) -> Value {
        let mut entries = vec![
            ("code".to_string(), Value::Int(self.code())),
            ("message".to_string(), Value::from(self.as_str())),
        ];
        if let Some(object) = object {
            entries.push(("object".to_string(), Value::from(object)));
        }
        if let Some(method) = method {
            entries.push(("method".to_string(), Value::from(method)));
        }
        Value::Table(entries)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request failed, as delivered to reject callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub status: Status,
    pub payload: Value,
}

impl Rejection {
    /// A locally synthesized rejection.
    pub fn new(status: Status) -> Self {
        Self {
            status,
            payload: status.error_value(None, None),
        }
    }

    /// A locally synthesized rejection for a call on `object`/`method`.
    pub fn with_context(status: Status, object: &str, method: &str) -> Self {
        Self {
            status,
            payload: status.error_value(Some(object), Some(method)),
        }
    }

    /// Interpret a remote error payload. Payloads without a known `"code"`
    /// are classed as [`Status::UnknownError`].
    pub fn from_payload(payload: Value) -> Self {
        let status = payload
            .get("code")
            .and_then(Value::as_int)
            .and_then(Status::from_code)
            .filter(|status| !status.is_ok())
            .unwrap_or(Status::UnknownError);
        Self { status, payload }
    }

    pub fn message(&self) -> &str {
        self.payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(self.status.as_str())
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.status.code())
    }
}

impl std::error::Error for Rejection {}
