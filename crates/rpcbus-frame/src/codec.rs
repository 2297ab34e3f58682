use bytes::{Buf, BufMut, Bytes, BytesMut};
use rpcbus_value::Value;

use crate::crc::checksum;
use crate::error::{FrameError, Result};

/// Frame header: magic (1) + checksum (2) + length (4) + reserved (1) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic byte: the header size itself.
pub const MAGIC: u8 = HEADER_SIZE as u8;

/// Default maximum payload size: 10 240 000 bytes.
pub const DEFAULT_MAX_PAYLOAD: usize = 10_240_000;

/// Default maximum JSON line length, matching the frame payload cap.
pub const DEFAULT_MAX_LINE: usize = DEFAULT_MAX_PAYLOAD;

/// A parsed and validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub checksum: u16,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Parse the first [`HEADER_SIZE`] bytes of `src`.
    ///
    /// Rejects a wrong magic byte and a zero payload length.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src[0] != MAGIC {
            return Err(FrameError::InvalidMagic {
                found: src[0],
                expected: MAGIC,
            });
        }
        let checksum = u16::from_le_bytes([src[1], src[2]]);
        let payload_len = u32::from_le_bytes([src[3], src[4], src[5], src[6]]);
        if payload_len == 0 {
            return Err(FrameError::EmptyPayload);
        }
        Ok(Self {
            checksum,
            payload_len,
        })
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬──────────────┬─────────────┬──────────┬──────────────────┐
/// │ Magic (1B)│ CRC-16 (2B)  │ Length (4B) │ Rsvd (1B)│ Payload          │
/// │ 0x08      │ LE, payload  │ LE          │ 0x00     │ (Length bytes)   │
/// └───────────┴──────────────┴─────────────┴──────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(MAGIC);
    dst.put_u16_le(checksum(payload));
    dst.put_u32_le(payload.len() as u32);
    dst.put_u8(0);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a value (padded) and frame it.
pub fn encode_value(value: &Value, dst: &mut BytesMut) -> Result<()> {
    let payload = value.encode()?;
    encode_frame(&payload, dst)
}

/// Incremental decoder over an accumulating byte buffer.
pub trait Decoder {
    /// Take one complete item out of `src`, or `Ok(None)` if more bytes are needed.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>>;
}

/// Decoder for checksummed binary frames.
///
/// Consumes the header as soon as it is complete and reserves room for the
/// declared payload, then waits for the payload bytes.
#[derive(Debug)]
pub struct BinaryCodec {
    max_payload: usize,
    header: Option<FrameHeader>,
}

impl BinaryCodec {
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            header: None,
        }
    }

    /// Whether a header has been read and its payload is still outstanding.
    pub fn in_frame(&self) -> bool {
        self.header.is_some()
    }
}

impl Default for BinaryCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for BinaryCodec {
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let header = match self.header {
            Some(header) => header,
            None => {
                if src.len() < HEADER_SIZE {
                    return Ok(None);
                }
                let header = FrameHeader::parse(&src[..HEADER_SIZE])?;
                let len = header.payload_len as usize;
                if len > self.max_payload {
                    return Err(FrameError::PayloadTooLarge {
                        size: len,
                        max: self.max_payload,
                    });
                }
                src.advance(HEADER_SIZE);
                src.reserve(len.saturating_sub(src.len()));
                self.header = Some(header);
                header
            }
        };

        let len = header.payload_len as usize;
        if src.len() < len {
            return Ok(None);
        }

        self.header = None;
        let payload = src.split_to(len).freeze();
        let actual = checksum(&payload);
        if actual != header.checksum {
            return Err(FrameError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }
        Ok(Some(payload))
    }
}

/// Decoder for newline-terminated text lines.
///
/// Strips the terminator and an optional carriage return; blank lines are skipped.
#[derive(Debug)]
pub struct LineCodec {
    max_line: usize,
    scanned: usize,
}

impl LineCodec {
    pub fn new(max_line: usize) -> Self {
        Self {
            max_line,
            scanned: 0,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

impl Decoder for LineCodec {
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        loop {
            let newline = src[self.scanned..].iter().position(|b| *b == b'\n');
            let Some(offset) = newline else {
                self.scanned = src.len();
                if src.len() > self.max_line {
                    return Err(FrameError::LineTooLong {
                        size: src.len(),
                        max: self.max_line,
                    });
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            self.scanned = 0;
            let mut line = src.split_to(end + 1);
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(line.freeze()));
        }
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 10 240 000.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
