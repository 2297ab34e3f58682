//! Compact binary encoding.
//!
//! Every field is an 8-byte header followed by its data, padded with zero
//! bytes to a 4-byte boundary:
//!
//! ```text
//! ┌──────────┬──────────────┬─────────────┬──────────────┬─────────┐
//! │ Type (1B)│ Reserved (3B)│ Length (4B) │ Data         │ Padding │
//! │          │ zero         │ LE, hdr+data│              │ to 4B   │
//! └──────────┴──────────────┴─────────────┴──────────────┴─────────┘
//! ```
//!
//! Arrays and tables carry their encoded children as data. Tables alternate
//! string keys and values.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, ValueError};
use crate::value::Value;

/// Size of a field header in bytes.
pub const FIELD_HEADER_SIZE: usize = 8;

/// Alignment of every encoded field.
pub const ALIGNMENT: usize = 4;

/// Maximum container nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 64;

const TYPE_NULL: u8 = 0;
const TYPE_BOOL: u8 = 1;
const TYPE_INT: u8 = 2;
const TYPE_FLOAT: u8 = 3;
const TYPE_STRING: u8 = 4;
const TYPE_ARRAY: u8 = 5;
const TYPE_TABLE: u8 = 6;

fn pad(len: usize) -> usize {
    (len + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

fn string_pad_len(s: &str) -> usize {
    pad(FIELD_HEADER_SIZE + s.len())
}

impl Value {
    /// Encoded length of this value without trailing padding.
    pub fn raw_len(&self) -> usize {
        FIELD_HEADER_SIZE + self.data_len()
    }

    /// Encoded length of this value including trailing padding.
    pub fn pad_len(&self) -> usize {
        pad(self.raw_len())
    }

    fn data_len(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 8,
            Value::String(s) => s.len(),
            Value::Array(items) => items.iter().map(Value::pad_len).sum(),
            Value::Table(entries) => entries
                .iter()
                .map(|(k, v)| string_pad_len(k) + v.pad_len())
                .sum(),
        }
    }

    /// Encode into a fresh buffer of exactly `pad_len()` bytes.
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.pad_len());
        self.encode_into(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Append the padded encoding of this value to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        let raw_len = self.raw_len();
        if raw_len > u32::MAX as usize {
            return Err(ValueError::TooLarge(raw_len));
        }
        dst.reserve(pad(raw_len));
        self.write_field(dst);
        Ok(())
    }

    fn write_field(&self, dst: &mut BytesMut) {
        let raw_len = self.raw_len();
        put_header(dst, self.type_tag(), raw_len);
        match self {
            Value::Null => {}
            Value::Bool(v) => dst.put_u8(u8::from(*v)),
            Value::Int(v) => dst.put_i64_le(*v),
            Value::Float(v) => dst.put_u64_le(v.to_bits()),
            Value::String(s) => dst.put_slice(s.as_bytes()),
            Value::Array(items) => {
                for item in items {
                    item.write_field(dst);
                }
            }
            Value::Table(entries) => {
                for (key, value) in entries {
                    write_string(dst, key);
                    value.write_field(dst);
                }
            }
        }
        dst.put_bytes(0, pad(raw_len) - raw_len);
    }

    fn type_tag(&self) -> u8 {
        match self {
            Value::Null => TYPE_NULL,
            Value::Bool(_) => TYPE_BOOL,
            Value::Int(_) => TYPE_INT,
            Value::Float(_) => TYPE_FLOAT,
            Value::String(_) => TYPE_STRING,
            Value::Array(_) => TYPE_ARRAY,
            Value::Table(_) => TYPE_TABLE,
        }
    }

    /// Decode exactly one value from `src`.
    ///
    /// Trailing padding after the value is accepted; any other trailing
    /// bytes are an error.
    pub fn decode(src: &[u8]) -> Result<Value> {
        let (value, raw_len) = decode_field(src, 0)?;
        let rest = &src[raw_len..];
        if rest.len() >= ALIGNMENT || rest.iter().any(|b| *b != 0) {
            return Err(ValueError::TrailingBytes(rest.len()));
        }
        Ok(value)
    }
}

fn put_header(dst: &mut BytesMut, tag: u8, raw_len: usize) {
    dst.put_u8(tag);
    dst.put_bytes(0, 3);
    dst.put_u32_le(raw_len as u32);
}

fn write_string(dst: &mut BytesMut, s: &str) {
    let raw_len = FIELD_HEADER_SIZE + s.len();
    put_header(dst, TYPE_STRING, raw_len);
    dst.put_slice(s.as_bytes());
    dst.put_bytes(0, pad(raw_len) - raw_len);
}

fn kind_name(tag: u8) -> &'static str {
    match tag {
        TYPE_NULL => "null",
        TYPE_BOOL => "bool",
        TYPE_INT => "int",
        TYPE_FLOAT => "float",
        TYPE_STRING => "string",
        TYPE_ARRAY => "array",
        TYPE_TABLE => "table",
        _ => "unknown",
    }
}

/// Decode one field at the start of `src`, returning it with its unpadded length.
fn decode_field(src: &[u8], depth: usize) -> Result<(Value, usize)> {
    if depth > MAX_DEPTH {
        return Err(ValueError::TooDeep(MAX_DEPTH));
    }
    if src.len() < FIELD_HEADER_SIZE {
        return Err(ValueError::Truncated {
            needed: FIELD_HEADER_SIZE,
            available: src.len(),
        });
    }

    let tag = src[0];
    let raw_len = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;
    if src[1..4] != [0, 0, 0] || raw_len < FIELD_HEADER_SIZE {
        return Err(ValueError::InvalidHeader {
            kind: kind_name(tag),
            len: raw_len,
        });
    }
    if raw_len > src.len() {
        return Err(ValueError::Truncated {
            needed: raw_len,
            available: src.len(),
        });
    }

    let data = &src[FIELD_HEADER_SIZE..raw_len];
    let fixed = |want: usize| -> Result<()> {
        if data.len() == want {
            Ok(())
        } else {
            Err(ValueError::InvalidHeader {
                kind: kind_name(tag),
                len: raw_len,
            })
        }
    };

    let value = match tag {
        TYPE_NULL => {
            fixed(0)?;
            Value::Null
        }
        TYPE_BOOL => {
            fixed(1)?;
            match data[0] {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                _ => {
                    return Err(ValueError::InvalidHeader {
                        kind: "bool",
                        len: raw_len,
                    })
                }
            }
        }
        TYPE_INT => {
            fixed(8)?;
            Value::Int(i64::from_le_bytes(eight(data)))
        }
        TYPE_FLOAT => {
            fixed(8)?;
            Value::Float(f64::from_bits(u64::from_le_bytes(eight(data))))
        }
        TYPE_STRING => Value::String(decode_string(data)?),
        TYPE_ARRAY => Value::Array(decode_children(data, depth)?),
        TYPE_TABLE => {
            let children = decode_children(data, depth)?;
            if children.len() % 2 != 0 {
                return Err(ValueError::DanglingKey);
            }
            let mut entries = Vec::with_capacity(children.len() / 2);
            let mut iter = children.into_iter().enumerate();
            while let (Some((pos, key)), Some((_, value))) = (iter.next(), iter.next()) {
                match key {
                    Value::String(key) => entries.push((key, value)),
                    _ => return Err(ValueError::TableKey(pos)),
                }
            }
            Value::Table(entries)
        }
        other => return Err(ValueError::UnknownType(other)),
    };

    Ok((value, raw_len))
}

fn decode_children(mut data: &[u8], depth: usize) -> Result<Vec<Value>> {
    let mut children = Vec::new();
    while !data.is_empty() {
        let (child, raw_len) = decode_field(data, depth + 1)?;
        children.push(child);
        let consumed = pad(raw_len).min(data.len());
        data = &data[consumed..];
    }
    Ok(children)
}

fn decode_string(data: &[u8]) -> Result<String> {
    std::str::from_utf8(data)
        .map(str::to_string)
        .map_err(|_| ValueError::InvalidUtf8)
}

fn eight(data: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&data[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Value {
        let mut inner = Value::table();
        inner.insert("deep", Value::Array(vec![1.into(), "x".into()])).unwrap();
        inner.insert("flag", true).unwrap();
        let mut mid = Value::array();
        mid.push(inner).unwrap();
        mid.push(Value::Float(1.5)).unwrap();
        mid.push(Value::Null).unwrap();
        let mut top = Value::table();
        top.insert("level1", mid).unwrap();
        top.insert("name", "abc").unwrap();
        top.insert("name", -7).unwrap();
        top
    }

    #[test]
    fn test_decode_restores_nested_structure() {
        let value = nested();
        let encoded = value.encode().unwrap();
        assert_eq!(encoded.len(), value.pad_len());
        assert_eq!(encoded.len() % ALIGNMENT, 0);

        let decoded = Value::decode(&encoded).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(decoded.encode().unwrap(), encoded);
    }

    #[test]
    fn test_raw_and_padded_lengths() {
        let v = Value::String("abc".into());
        assert_eq!(v.raw_len(), 11);
        assert_eq!(v.pad_len(), 12);
        assert_eq!(Value::Int(1).raw_len(), 16);
        assert_eq!(Value::Int(1).pad_len(), 16);
        assert_eq!(Value::Null.pad_len(), FIELD_HEADER_SIZE);
    }

    #[test]
    fn test_decode_accepts_missing_top_level_padding() {
        let v = Value::String("abc".into());
        let encoded = v.encode().unwrap();
        let unpadded = &encoded[..v.raw_len()];
        assert_eq!(Value::decode(unpadded).unwrap(), v);
    }

    #[test]
    fn test_decode_truncated() {
        let encoded = nested().encode().unwrap();
        let result = Value::decode(&encoded[..encoded.len() - 9]);
        assert!(matches!(result, Err(ValueError::Truncated { .. })));
        assert!(matches!(
            Value::decode(&[1, 0, 0]),
            Err(ValueError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        let bytes = [42u8, 0, 0, 0, 8, 0, 0, 0];
        assert!(matches!(
            Value::decode(&bytes),
            Err(ValueError::UnknownType(42))
        ));
    }

    #[test]
    fn test_decode_rejects_short_length() {
        let bytes = [TYPE_NULL, 0, 0, 0, 4, 0, 0, 0];
        assert!(matches!(
            Value::decode(&bytes),
            Err(ValueError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_non_string_table_key() {
        let mut dst = BytesMut::new();
        let children = [Value::Int(1), Value::Int(2)];
        let data_len: usize = children.iter().map(Value::pad_len).sum();
        put_header(&mut dst, TYPE_TABLE, FIELD_HEADER_SIZE + data_len);
        for child in &children {
            child.encode_into(&mut dst).unwrap();
        }
        assert!(matches!(
            Value::decode(&dst),
            Err(ValueError::TableKey(0))
        ));
    }

    #[test]
    fn test_decode_rejects_excessive_nesting() {
        let mut value = Value::Int(0);
        for _ in 0..(MAX_DEPTH + 2) {
            value = Value::Array(vec![value]);
        }
        let encoded = value.encode().unwrap();
        assert!(matches!(
            Value::decode(&encoded),
            Err(ValueError::TooDeep(_))
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_garbage() {
        let mut bytes = BytesMut::new();
        Value::Int(5).encode_into(&mut bytes).unwrap();
        bytes.put_slice(&[1, 2, 3, 4, 5]);
        assert!(matches!(
            Value::decode(&bytes),
            Err(ValueError::TrailingBytes(5))
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let mut dst = BytesMut::new();
        put_header(&mut dst, TYPE_STRING, FIELD_HEADER_SIZE + 2);
        dst.put_slice(&[0xff, 0xfe]);
        dst.put_bytes(0, 2);
        assert!(matches!(Value::decode(&dst), Err(ValueError::InvalidUtf8)));
    }
}
