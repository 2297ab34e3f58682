use std::io::ErrorKind;
use std::net::TcpListener;
use std::os::fd::{AsRawFd, RawFd};

use tracing::{debug, info};

use crate::address::Address;
use crate::error::{Result, TransportError};
use crate::stream::BusStream;
use crate::uds::UnixDomainSocket;

/// A non-blocking listener on either a Unix socket path or a TCP port.
pub enum BusListener {
    Unix(UnixDomainSocket),
    Tcp(TcpListener),
}

impl BusListener {
    /// Bind to `address` and start listening.
    pub fn bind(address: &Address) -> Result<Self> {
        match address {
            Address::Unix(path) => Ok(BusListener::Unix(UnixDomainSocket::bind(path)?)),
            Address::Tcp { host, port } => {
                let bind_err = |source| TransportError::Bind {
                    address: address.to_string(),
                    source,
                };
                let listener = TcpListener::bind((host.as_str(), *port)).map_err(bind_err)?;
                listener.set_nonblocking(true).map_err(bind_err)?;
                info!(%address, "listening on tcp");
                Ok(BusListener::Tcp(listener))
            }
        }
    }

    /// Accept a pending connection, or `Ok(None)` if none is waiting.
    pub fn try_accept(&self) -> Result<Option<BusStream>> {
        match self {
            BusListener::Unix(uds) => uds.try_accept(),
            BusListener::Tcp(listener) => loop {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        debug!(%addr, "accepted tcp connection");
                        return Ok(Some(BusStream::from_tcp(stream)));
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                    Err(err) => return Err(TransportError::Accept(err)),
                }
            },
        }
    }

    /// The bound address. For TCP this reports the actual port when bound to port 0.
    pub fn local_address(&self) -> Option<Address> {
        match self {
            BusListener::Unix(uds) => Some(Address::Unix(uds.path().to_path_buf())),
            BusListener::Tcp(listener) => listener.local_addr().ok().map(|addr| Address::Tcp {
                host: addr.ip().to_string(),
                port: addr.port(),
            }),
        }
    }
}

impl AsRawFd for BusListener {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            BusListener::Unix(uds) => uds.as_raw_fd(),
            BusListener::Tcp(listener) => listener.as_raw_fd(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::time::Duration;

    #[test]
    fn test_tcp_listener_accepts() {
        let listener = BusListener::bind(&Address::parse("127.0.0.1:0").unwrap()).unwrap();
        let address = listener.local_address().unwrap();
        assert!(matches!(address, Address::Tcp { port, .. } if port != 0));

        let mut client = BusStream::connect(&address).unwrap();
        client.write_all(b"tcp").unwrap();

        let mut accepted = None;
        for _ in 0..200 {
            accepted = listener.try_accept().unwrap();
            if accepted.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let mut server = accepted.expect("connection should be accepted");
        server.set_nonblocking(false).unwrap();
        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"tcp");
        assert_eq!(server.transport_name(), "tcp");
    }

    #[test]
    fn test_connect_refused_reports_address() {
        let dir = std::env::temp_dir().join(format!("rpcbus-listener-{}", std::process::id()));
        let missing = Address::Unix(dir.join("missing.sock"));
        let err = BusStream::connect(&missing).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(err.to_string().contains("missing.sock"));
    }
}
