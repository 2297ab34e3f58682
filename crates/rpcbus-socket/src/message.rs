use rpcbus_value::Value;

use crate::error::{Result, SocketError};

/// Message type carried as the first envelope field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    MethodCall = 1,
    MethodReturn = 2,
    Error = 3,
    Signal = 4,
}

impl MessageKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::MethodCall),
            2 => Some(Self::MethodReturn),
            3 => Some(Self::Error),
            4 => Some(Self::Signal),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MethodCall => "call",
            Self::MethodReturn => "return",
            Self::Error => "error",
            Self::Signal => "signal",
        }
    }
}

/// One bus message: kind, sequence number and payload value.
///
/// Calls carry `[object, method, argument]`, signals carry `[name, args...]`,
/// returns and errors carry an arbitrary value. Signals use sequence number 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub seq: u32,
    pub payload: Value,
}

impl Message {
    pub fn call(seq: u32, object: &str, method: &str, argument: Value) -> Self {
        Self {
            kind: MessageKind::MethodCall,
            seq,
            payload: Value::Array(vec![object.into(), method.into(), argument]),
        }
    }

    pub fn reply(seq: u32, payload: Value) -> Self {
        Self {
            kind: MessageKind::MethodReturn,
            seq,
            payload,
        }
    }

    pub fn error(seq: u32, payload: Value) -> Self {
        Self {
            kind: MessageKind::Error,
            seq,
            payload,
        }
    }

    pub fn signal(name: &str, args: impl IntoIterator<Item = Value>) -> Self {
        let mut items = vec![Value::from(name)];
        items.extend(args);
        Self {
            kind: MessageKind::Signal,
            seq: 0,
            payload: Value::Array(items),
        }
    }

    /// `(object, method, argument)` of a well-formed call.
    pub fn call_parts(&self) -> Option<(&str, &str, &Value)> {
        if self.kind != MessageKind::MethodCall {
            return None;
        }
        match self.payload.children() {
            [object, method, argument] => Some((object.as_str()?, method.as_str()?, argument)),
            _ => None,
        }
    }

    /// `(name, args)` of a well-formed signal.
    pub fn signal_parts(&self) -> Option<(&str, &[Value])> {
        if self.kind != MessageKind::Signal {
            return None;
        }
        match self.payload.children() {
            [name, args @ ..] => Some((name.as_str()?, args)),
            [] => None,
        }
    }

    /// Raw envelope: `[kind, seq, payload]`.
    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::Int(self.kind.code()),
            Value::Int(i64::from(self.seq)),
            self.payload.clone(),
        ])
    }

    /// Parse a raw envelope produced by [`to_value`](Self::to_value).
    pub fn from_value(value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(SocketError::Malformed(format!(
                    "envelope is {}, expected array",
                    other.type_name()
                )))
            }
        };
        let mut items = items.into_iter();
        let (Some(kind), Some(seq), Some(payload), None) =
            (items.next(), items.next(), items.next(), items.next())
        else {
            return Err(SocketError::Malformed(
                "envelope must have exactly three fields".to_string(),
            ));
        };
        let kind = kind
            .as_int()
            .and_then(MessageKind::from_code)
            .ok_or_else(|| SocketError::Malformed(format!("unknown message kind {kind}")))?;
        let seq = seq
            .as_int()
            .and_then(|seq| u32::try_from(seq).ok())
            .ok_or_else(|| SocketError::Malformed(format!("invalid sequence number {seq}")))?;
        Ok(Self { kind, seq, payload })
    }

    /// Sequence number of an envelope that starts like a call, even when the
    /// rest of it does not decode.
    pub fn call_seq(value: &Value) -> Option<u32> {
        let [kind, seq, ..] = value.children() else {
            return None;
        };
        if kind.as_int()? != MessageKind::MethodCall as i64 {
            return None;
        }
        u32::try_from(seq.as_int()?).ok()
    }
}
