//! Self-describing values for rpcbus.
//!
//! Every payload on the bus is exactly one [`Value`]: a tree of scalars,
//! arrays and string-keyed tables. This crate provides the tree model, a
//! compact 4-byte-aligned binary encoding, JSON conversion and a small
//! signature language used to describe method arguments.

pub mod blob;
pub mod error;
pub mod json;
pub mod signature;
pub mod value;

pub use blob::{ALIGNMENT, FIELD_HEADER_SIZE, MAX_DEPTH};
pub use error::{Result, ValueError};
pub use signature::Signature;
pub use value::Value;
