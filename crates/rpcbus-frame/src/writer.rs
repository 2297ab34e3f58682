use std::collections::VecDeque;
use std::io::{ErrorKind, Write};

use bytes::Bytes;

use crate::error::{FrameError, Result};

/// Queues encoded buffers and writes them to a non-blocking `Write` stream.
///
/// Buffers go out in FIFO order. A partial write is resumed from the same
/// offset on the next [`flush_pending`](Self::flush_pending).
pub struct FrameWriter<T> {
    inner: T,
    queue: VecDeque<Bytes>,
    offset: usize,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            queue: VecDeque::new(),
            offset: 0,
        }
    }

    /// Queue an encoded buffer. Empty buffers are ignored.
    pub fn queue_bytes(&mut self, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        if !bytes.is_empty() {
            self.queue.push_back(bytes);
        }
    }

    /// Write queued bytes until the queue drains or the stream would block.
    ///
    /// Returns `true` when nothing is left to send.
    pub fn flush_pending(&mut self) -> Result<bool> {
        while let Some(front) = self.queue.front() {
            match self.inner.write(&front[self.offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.offset += n;
                    if self.offset == front.len() {
                        self.queue.pop_front();
                        self.offset = 0;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(true),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Whether any bytes are waiting to be written.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Number of queued bytes not yet written.
    pub fn pending_bytes(&self) -> usize {
        self.queue.iter().map(Bytes::len).sum::<usize>() - self.offset
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
