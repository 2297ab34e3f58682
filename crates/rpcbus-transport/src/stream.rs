use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use tracing::debug;

use crate::address::Address;
use crate::error::{Result, TransportError};

/// A connected bus stream. Implements `Read + Write`.
///
/// Wraps either a Unix domain socket or a TCP connection so the layers above
/// do not care which one they were handed.
pub struct BusStream {
    inner: BusStreamInner,
}

enum BusStreamInner {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Read for BusStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            BusStreamInner::Unix(stream) => stream.read(buf),
            BusStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for BusStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            BusStreamInner::Unix(stream) => stream.write(buf),
            BusStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            BusStreamInner::Unix(stream) => stream.flush(),
            BusStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl AsRawFd for BusStream {
    fn as_raw_fd(&self) -> RawFd {
        match &self.inner {
            BusStreamInner::Unix(stream) => stream.as_raw_fd(),
            BusStreamInner::Tcp(stream) => stream.as_raw_fd(),
        }
    }
}

impl BusStream {
    pub(crate) fn from_unix(stream: UnixStream) -> Self {
        Self {
            inner: BusStreamInner::Unix(stream),
        }
    }

    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        Self {
            inner: BusStreamInner::Tcp(stream),
        }
    }

    /// Connect to a listening bus socket (blocking connect).
    pub fn connect(address: &Address) -> Result<Self> {
        let connect_err = |source| TransportError::Connect {
            address: address.to_string(),
            source,
        };
        let stream = match address {
            Address::Unix(path) => Self::from_unix(UnixStream::connect(path).map_err(connect_err)?),
            Address::Tcp { host, port } => {
                Self::from_tcp(TcpStream::connect((host.as_str(), *port)).map_err(connect_err)?)
            }
        };
        debug!(%address, "connected");
        Ok(stream)
    }

    /// Switch the stream between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match &self.inner {
            BusStreamInner::Unix(stream) => stream.set_nonblocking(nonblocking)?,
            BusStreamInner::Tcp(stream) => stream.set_nonblocking(nonblocking)?,
        }
        Ok(())
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        Ok(match &self.inner {
            BusStreamInner::Unix(stream) => Self::from_unix(stream.try_clone()?),
            BusStreamInner::Tcp(stream) => Self::from_tcp(stream.try_clone()?),
        })
    }

    /// Shut down both directions of the connection.
    pub fn shutdown(&self) {
        let _ = match &self.inner {
            BusStreamInner::Unix(stream) => stream.shutdown(std::net::Shutdown::Both),
            BusStreamInner::Tcp(stream) => stream.shutdown(std::net::Shutdown::Both),
        };
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            BusStreamInner::Unix(_) => "unix-domain-socket",
            BusStreamInner::Tcp(_) => "tcp",
        }
    }

    /// Get the credentials of the connected peer (Linux Unix sockets only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        let fd = match &self.inner {
            BusStreamInner::Unix(stream) => stream.as_raw_fd(),
            BusStreamInner::Tcp(_) => return None,
        };

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open Unix socket descriptor owned by this process.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }
}

impl std::fmt::Debug for BusStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusStream")
            .field("type", &self.transport_name())
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}

impl From<UnixStream> for BusStream {
    fn from(stream: UnixStream) -> Self {
        Self::from_unix(stream)
    }
}
