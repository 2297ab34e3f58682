//! Type signatures.
//!
//! | Token   | Matches                                              |
//! |---------|------------------------------------------------------|
//! | `i`     | int                                                  |
//! | `s`     | string                                               |
//! | `b`     | bool                                                 |
//! | `d`     | float (ints accepted)                                |
//! | `n`     | null                                                 |
//! | `v`     | anything                                             |
//! | `t`     | any table                                            |
//! | `a`     | any array                                            |
//! | `aT`    | array whose every element matches `T`                |
//! | `[T..]` | array whose elements match `T..` repeated cyclically |
//! | `{T}`   | table whose every value matches `T` (`{sT}` also accepted) |
//!
//! A signature with one top-level token matches a value directly. Several
//! top-level tokens match the children of an array one-to-one.

use crate::error::{Result, ValueError};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum SigType {
    Int,
    Str,
    Bool,
    Float,
    Null,
    Any,
    AnyTable,
    AnyArray,
    ArrayOf(Box<SigType>),
    Repeat(Vec<SigType>),
    TableOf(Box<SigType>),
}

/// A parsed type signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    types: Vec<SigType>,
}

impl Signature {
    /// Parse a signature string.
    pub fn parse(signature: &str) -> Result<Self> {
        let mut parser = Parser {
            src: signature.as_bytes(),
            pos: 0,
        };
        let types = parser.sequence(None).map_err(|reason| ValueError::Signature {
            signature: signature.to_string(),
            reason,
        })?;
        Ok(Self { types })
    }

    /// Whether `value` conforms to this signature.
    pub fn matches(&self, value: &Value) -> bool {
        match self.types.as_slice() {
            [] => value.is_null() || (value.is_array() && value.children().is_empty()),
            [single] => matches(single, value),
            many => {
                let children = value.children();
                value.is_array()
                    && children.len() == many.len()
                    && many.iter().zip(children).all(|(t, v)| matches(t, v))
            }
        }
    }
}

impl Value {
    /// Validate against a signature string. Malformed signatures match nothing.
    pub fn validate(&self, signature: &str) -> bool {
        Signature::parse(signature)
            .map(|sig| sig.matches(self))
            .unwrap_or(false)
    }
}

fn matches(ty: &SigType, value: &Value) -> bool {
    match (ty, value) {
        (SigType::Any, _) => true,
        (SigType::Int, Value::Int(_)) => true,
        (SigType::Str, Value::String(_)) => true,
        (SigType::Bool, Value::Bool(_)) => true,
        (SigType::Float, Value::Float(_) | Value::Int(_)) => true,
        (SigType::Null, Value::Null) => true,
        (SigType::AnyTable, Value::Table(_)) => true,
        (SigType::AnyArray, Value::Array(_)) => true,
        (SigType::ArrayOf(inner), Value::Array(items)) => items.iter().all(|v| matches(inner, v)),
        (SigType::Repeat(seq), Value::Array(items)) => {
            items.len() % seq.len() == 0
                && items
                    .iter()
                    .enumerate()
                    .all(|(i, v)| matches(&seq[i % seq.len()], v))
        }
        (SigType::TableOf(inner), Value::Table(entries)) => {
            entries.iter().all(|(_, v)| matches(inner, v))
        }
        _ => false,
    }
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn sequence(&mut self, close: Option<u8>) -> std::result::Result<Vec<SigType>, String> {
        let mut types = Vec::new();
        loop {
            match (self.peek(), close) {
                (None, None) => return Ok(types),
                (None, Some(c)) => return Err(format!("missing '{}'", c as char)),
                (Some(c), Some(want)) if c == want => {
                    self.pos += 1;
                    return Ok(types);
                }
                _ => types.push(self.single()?),
            }
        }
    }

    fn single(&mut self) -> std::result::Result<SigType, String> {
        let c = self.peek().ok_or_else(|| "unexpected end".to_string())?;
        self.pos += 1;
        Ok(match c {
            b'i' => SigType::Int,
            b's' => SigType::Str,
            b'b' => SigType::Bool,
            b'd' => SigType::Float,
            b'n' => SigType::Null,
            b'v' => SigType::Any,
            b't' => SigType::AnyTable,
            b'a' => match self.peek() {
                Some(next) if starts_type(next) => SigType::ArrayOf(Box::new(self.single()?)),
                _ => SigType::AnyArray,
            },
            b'[' => {
                let seq = self.sequence(Some(b']'))?;
                if seq.is_empty() {
                    SigType::AnyArray
                } else {
                    SigType::Repeat(seq)
                }
            }
            b'{' => {
                let seq = self.sequence(Some(b'}'))?;
                match seq.as_slice() {
                    [] => SigType::AnyTable,
                    [value] | [SigType::Str, value] => SigType::TableOf(Box::new(value.clone())),
                    _ => return Err("table signature takes one value type".to_string()),
                }
            }
            other => return Err(format!("unexpected '{}'", other as char)),
        })
    }
}

fn starts_type(c: u8) -> bool {
    matches!(
        c,
        b'i' | b's' | b'b' | b'd' | b'n' | b'v' | b't' | b'a' | b'[' | b'{'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        values.iter().map(|v| Value::Int(*v)).collect()
    }

    #[test]
    fn scalar_signatures() {
        assert!(Value::Int(1).validate("i"));
        assert!(!Value::Int(1).validate("s"));
        assert!(Value::String("x".into()).validate("s"));
        assert!(Value::Int(1).validate("d"));
        assert!(Value::Null.validate("v"));
    }

    #[test]
    fn multi_token_signature_matches_array_positions() {
        let v = Value::Array(vec![1.into(), "a".into(), "b".into()]);
        assert!(v.validate("iss"));
        assert!(!v.validate("is"));
        assert!(!v.validate("iis"));
    }

    #[test]
    fn array_of_and_repeat() {
        assert!(ints(&[1, 2, 3]).validate("ai"));
        assert!(!Value::Array(vec![1.into(), "x".into()]).validate("ai"));
        assert!(Value::Array(vec!["m".into(), Value::array()]).validate("[sa]"));
        assert!(!Value::Array(vec!["m".into()]).validate("[sa]"));
        assert!(Value::array().validate("a"));
    }

    #[test]
    fn table_signatures() {
        let t: Value = vec![("a", Value::Int(1)), ("b", Value::Int(2))]
            .into_iter()
            .collect();
        assert!(t.validate("{i}"));
        assert!(t.validate("{si}"));
        assert!(t.validate("t"));
        assert!(!t.validate("{s}"));
        let arr = Value::Array(vec![t.clone(), t]);
        assert!(arr.validate("a{sv}"));
    }

    #[test]
    fn malformed_signature_matches_nothing() {
        assert!(!Value::Int(1).validate("[i"));
        assert!(!Value::Int(1).validate("x"));
        assert!(matches!(
            Signature::parse("{iii}"),
            Err(ValueError::Signature { .. })
        ));
    }
}
