use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::codec::Decoder;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;
const MAX_READS_PER_FILL: usize = 16;

/// Reads decoded items from a non-blocking `Read` stream.
///
/// [`fill`](Self::fill) pulls whatever bytes are available without blocking;
/// [`next_frame`](Self::next_frame) hands out complete items one at a time.
/// End of stream is reported only after every buffered item was handed out.
pub struct FrameReader<T, D> {
    inner: T,
    decoder: D,
    buf: BytesMut,
    eof: bool,
}

impl<T: Read, D: Decoder> FrameReader<T, D> {
    pub fn new(inner: T, decoder: D) -> Self {
        Self {
            inner,
            decoder,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            eof: false,
        }
    }

    /// Read available bytes into the buffer. Returns how many were read.
    ///
    /// Stops when the stream would block, reaches end of stream, or after a
    /// bounded number of reads so one busy peer cannot starve the others.
    pub fn fill(&mut self) -> Result<usize> {
        let mut total = 0usize;
        let mut reads = 0usize;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        while !self.eof && reads < MAX_READS_PER_FILL {
            match self.inner.read(&mut chunk) {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    total += n;
                    reads += 1;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(total)
    }

    /// Next complete item from the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed and
    /// `Err(FrameError::ConnectionClosed)` once the stream ended and the
    /// buffer holds no further complete item.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        match self.decoder.decode(&mut self.buf)? {
            Some(item) => Ok(Some(item)),
            None if self.eof => Err(FrameError::ConnectionClosed),
            None => Ok(None),
        }
    }

    /// Whether the stream reported end of file.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}
