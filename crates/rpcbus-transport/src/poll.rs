use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// One descriptor's interest and readiness for [`poll_readiness`].
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub fd: RawFd,
    pub want_write: bool,
    pub readable: bool,
    pub writable: bool,
    /// Hang-up or error condition reported by the kernel.
    pub closed: bool,
}

impl Readiness {
    pub fn new(fd: RawFd, want_write: bool) -> Self {
        Self {
            fd,
            want_write,
            readable: false,
            writable: false,
            closed: false,
        }
    }
}

/// Wait until at least one descriptor is ready or `timeout` elapses.
///
/// `None` waits indefinitely. Returns the number of ready descriptors; an
/// interrupted wait reports zero.
pub fn poll_readiness(entries: &mut [Readiness], timeout: Option<Duration>) -> Result<usize> {
    let mut fds: Vec<libc::pollfd> = entries
        .iter()
        .map(|entry| libc::pollfd {
            fd: entry.fd,
            events: if entry.want_write {
                libc::POLLIN | libc::POLLOUT
            } else {
                libc::POLLIN
            },
            revents: 0,
        })
        .collect();

    let timeout_ms = match timeout {
        None => -1,
        Some(d) => d.as_millis().min(i32::MAX as u128) as libc::c_int,
    };

    // SAFETY: `fds` is a valid, exclusively borrowed array of `fds.len()`
    // pollfd structs that lives for the duration of the call.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(0);
        }
        return Err(TransportError::Poll(err));
    }

    for (entry, fd) in entries.iter_mut().zip(&fds) {
        entry.readable = fd.revents & libc::POLLIN != 0;
        entry.writable = fd.revents & libc::POLLOUT != 0;
        entry.closed = fd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0;
    }

    Ok(rc as usize)
}
