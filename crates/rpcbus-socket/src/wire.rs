use bytes::{Bytes, BytesMut};
use rpcbus_frame::{encode_value, BinaryCodec, Decoder, LineCodec};
use rpcbus_value::Value;

use crate::error::Result;
use crate::jsonrpc::{request_id, JsonRpcEnvelope};
use crate::message::Message;

/// How messages are laid out on a stream.
pub trait Wire {
    type Decoder: Decoder;

    const NAME: &'static str;

    fn decoder(max_size: usize) -> Self::Decoder;

    /// Encode one message into the bytes to queue on the stream.
    fn encode(message: &Message) -> Result<Bytes>;

    /// Decode one item produced by the decoder.
    fn decode(item: &[u8]) -> Result<Message>;

    /// Sequence number of an item that failed [`decode`](Wire::decode) but
    /// was recognisably a call. `None` if no answer is owed.
    fn request_seq(item: &[u8]) -> Option<u32>;
}

/// Checksummed binary frames carrying the `[kind, seq, payload]` envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawWire;

impl Wire for RawWire {
    type Decoder = BinaryCodec;

    const NAME: &'static str = "raw";

    fn decoder(max_size: usize) -> BinaryCodec {
        BinaryCodec::new(max_size)
    }

    fn encode(message: &Message) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        encode_value(&message.to_value(), &mut dst)?;
        Ok(dst.freeze())
    }

    fn decode(item: &[u8]) -> Result<Message> {
        Message::from_value(Value::decode(item)?)
    }

    fn request_seq(item: &[u8]) -> Option<u32> {
        let value = Value::decode(item).ok()?;
        Message::call_seq(&value)
    }
}

/// Newline-terminated JSON-RPC objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWire;

impl Wire for JsonWire {
    type Decoder = LineCodec;

    const NAME: &'static str = "json";

    fn decoder(max_size: usize) -> LineCodec {
        LineCodec::new(max_size)
    }

    fn encode(message: &Message) -> Result<Bytes> {
        let mut line = serde_json::to_vec(&JsonRpcEnvelope::from(message))?;
        line.push(b'\n');
        Ok(Bytes::from(line))
    }

    fn decode(item: &[u8]) -> Result<Message> {
        let envelope: JsonRpcEnvelope = serde_json::from_slice(item)?;
        Message::try_from(envelope)
    }

    fn request_seq(item: &[u8]) -> Option<u32> {
        request_id(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcbus_frame::HEADER_SIZE;

    #[test]
    fn test_raw_wire_frames_envelope() {
        let msg = Message::call(3, "/o", "m", Value::Int(1));
        let bytes = RawWire::encode(&msg).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + msg.to_value().pad_len());

        let mut buf = BytesMut::from(&bytes[..]);
        let item = RawWire::decoder(1024).decode(&mut buf).unwrap().unwrap();
        assert_eq!(RawWire::decode(&item).unwrap(), msg);
    }

    #[test]
    fn test_json_wire_is_one_line() {
        let msg = Message::reply(3, Value::from("ok"));
        let bytes = JsonWire::encode(&msg).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);

        let mut buf = BytesMut::from(&bytes[..]);
        let item = JsonWire::decoder(1024).decode(&mut buf).unwrap().unwrap();
        assert_eq!(JsonWire::decode(&item).unwrap(), msg);
    }

    #[test]
    fn test_raw_wire_rejects_non_envelope() {
        let payload = Value::Int(5).encode().unwrap();
        assert!(RawWire::decode(&payload).is_err());
        assert!(JsonWire::decode(b"not json").is_err());
    }

    #[test]
    fn test_raw_request_seq_of_bad_envelope() {
        let extra = Value::Array(vec![Value::Int(1), Value::Int(9), Value::Null, Value::Null]);
        let item = extra.encode().unwrap();
        assert!(RawWire::decode(&item).is_err());
        assert_eq!(RawWire::request_seq(&item), Some(9));

        let unknown = Value::Array(vec![Value::Int(7), Value::Int(9), Value::Null]);
        assert_eq!(RawWire::request_seq(&unknown.encode().unwrap()), None);
        assert_eq!(RawWire::request_seq(&Value::Int(5).encode().unwrap()), None);
    }

    #[test]
    fn test_json_request_seq_of_unknown_method() {
        let line = br#"{"jsonrpc":"2.0","id":5,"method":"foo"}"#;
        assert!(JsonWire::decode(line).is_err());
        assert_eq!(JsonWire::request_seq(line), Some(5));
    }
}
