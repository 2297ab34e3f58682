use rpcbus_value::Value;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SocketError};
use crate::message::{Message, MessageKind};

/// JSON-RPC protocol version written on every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name used for calls.
pub const CALL_METHOD: &str = "call";

/// One line of the JSON socket.
///
/// Calls are `{"id", "method": "call", "params": [object, method, args]}`,
/// returns carry `result`, errors carry `error` and signals are
/// `{"method": name, "params": [args...]}` without an id. An id of 0 counts
/// as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcEnvelope {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

impl JsonRpcEnvelope {
    fn empty(id: Option<u32>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }
}

impl From<&Message> for JsonRpcEnvelope {
    fn from(message: &Message) -> Self {
        let id = Some(message.seq).filter(|seq| *seq != 0);
        let mut envelope = Self::empty(id);
        match message.kind {
            MessageKind::MethodCall => {
                envelope.method = Some(CALL_METHOD.to_string());
                envelope.params = Some(message.payload.to_json());
            }
            MessageKind::MethodReturn => envelope.result = Some(message.payload.to_json()),
            MessageKind::Error => envelope.error = Some(message.payload.to_json()),
            MessageKind::Signal => {
                envelope.id = None;
                let (name, args) = match message.payload.children() {
                    [name, args @ ..] => (name.as_str().unwrap_or_default(), args),
                    [] => ("", &[][..]),
                };
                envelope.method = Some(name.to_string());
                envelope.params = Some(serde_json::Value::Array(
                    args.iter().map(Value::to_json).collect(),
                ));
            }
        }
        envelope
    }
}

/// Id of a line that expects an answer: a non-zero id next to a method.
pub fn request_id(line: &[u8]) -> Option<u32> {
    let json: serde_json::Value = serde_json::from_slice(line).ok()?;
    json.get("method")?;
    let id = u32::try_from(json.get("id")?.as_u64()?).ok()?;
    Some(id).filter(|id| *id != 0)
}

impl TryFrom<JsonRpcEnvelope> for Message {
    type Error = SocketError;

    fn try_from(envelope: JsonRpcEnvelope) -> Result<Self> {
        if envelope.jsonrpc != JSONRPC_VERSION {
            return Err(SocketError::Malformed(format!(
                "unsupported jsonrpc version {:?}",
                envelope.jsonrpc
            )));
        }
        let id = envelope.id.filter(|id| *id != 0);
        let params = envelope.params.as_ref().map(Value::from_json);

        match (id, envelope.method) {
            (Some(seq), Some(method)) if method == CALL_METHOD => Ok(Message {
                kind: MessageKind::MethodCall,
                seq,
                payload: params.unwrap_or_default(),
            }),
            (Some(_), Some(method)) => Err(SocketError::Malformed(format!(
                "unsupported method {method:?}"
            ))),
            (None, Some(name)) => {
                let args = match params {
                    Some(Value::Array(args)) => args,
                    Some(Value::Null) | None => Vec::new(),
                    Some(single) => vec![single],
                };
                Ok(Message::signal(&name, args))
            }
            (Some(seq), None) => Ok(match envelope.error {
                Some(error) => Message::error(seq, Value::from_json(&error)),
                None => Message::reply(
                    seq,
                    envelope.result.map(Value::from).unwrap_or_default(),
                ),
            }),
            (None, None) => Err(SocketError::Malformed(
                "envelope has neither id nor method".to_string(),
            )),
        }
    }
}
