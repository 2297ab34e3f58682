//! Checksummed framing for rpcbus.
//!
//! Every binary frame carries:
//! - A 1-byte magic equal to the header size, for header validation
//! - A 2-byte little-endian CRC-16 of the payload
//! - A 4-byte little-endian payload length
//! - One reserved byte
//!
//! followed by one encoded [`rpcbus_value::Value`]. A newline-delimited line
//! codec is provided for text transports. Readers and writers never block:
//! partial reads and writes are buffered and resumed.

pub mod codec;
pub mod crc;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    encode_frame, encode_value, BinaryCodec, Decoder, FrameConfig, FrameHeader, LineCodec,
    DEFAULT_MAX_LINE, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC,
};
pub use crc::checksum;
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
