/// Errors produced while building, encoding or decoding values.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// The buffer ended before a complete field could be read.
    #[error("truncated value (needed {needed} bytes, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// A field header carried a type tag this decoder does not know.
    #[error("unknown value type tag {0}")]
    UnknownType(u8),

    /// A field header is structurally invalid (bad length or reserved bytes set).
    #[error("invalid {kind} field header (length {len})")]
    InvalidHeader { kind: &'static str, len: usize },

    /// A string field did not contain UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A table child in key position was not a string.
    #[error("table key at position {0} is not a string")]
    TableKey(usize),

    /// A table ended with a key that had no value.
    #[error("table has a dangling key")]
    DanglingKey,

    /// Nested containers exceed the decoder depth limit.
    #[error("value nesting exceeds {0} levels")]
    TooDeep(usize),

    /// Bytes follow the top-level field that are not padding.
    #[error("{0} unexpected trailing bytes after value")]
    TrailingBytes(usize),

    /// The encoded form would not fit the 32-bit length field.
    #[error("value too large to encode ({0} bytes)")]
    TooLarge(usize),

    /// Attempted to append to a value that is not the right kind of container.
    #[error("cannot append to {0} value")]
    NotAContainer(&'static str),

    /// A type signature string could not be parsed.
    #[error("invalid signature {signature:?}: {reason}")]
    Signature { signature: String, reason: String },

    /// JSON text could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ValueError>;
