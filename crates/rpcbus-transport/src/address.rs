use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, TransportError};

/// Where a bus socket listens or connects.
///
/// Strings that begin with `/` or `.` are filesystem socket paths; anything
/// else is read as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl Address {
    pub fn parse(address: &str) -> Result<Self> {
        if address.starts_with('/') || address.starts_with('.') {
            return Ok(Address::Unix(PathBuf::from(address)));
        }

        let invalid = |reason: &str| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected a socket path or host:port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid("port is not a number in 0..=65535"))?;

        Ok(Address::Tcp {
            host: host.to_string(),
            port,
        })
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Address::Unix(_) => "unix-domain-socket",
            Address::Tcp { .. } => "tcp",
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Unix(path) => write!(f, "{}", path.display()),
            Address::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Address::Tcp { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_unix() {
        assert_eq!(
            Address::parse("/tmp/bus.sock").unwrap(),
            Address::Unix(PathBuf::from("/tmp/bus.sock"))
        );
        assert_eq!(
            Address::parse("./ubus.sock").unwrap(),
            Address::Unix(PathBuf::from("./ubus.sock"))
        );
    }

    #[test]
    fn test_host_port_is_tcp() {
        assert_eq!(
            Address::parse("127.0.0.1:1234").unwrap(),
            Address::Tcp {
                host: "127.0.0.1".into(),
                port: 1234
            }
        );
        let v6 = Address::parse("[::1]:80").unwrap();
        assert_eq!(v6.to_string(), "[::1]:80");
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in ["localhost", ":80", "host:http", "host:70000"] {
            assert!(
                matches!(
                    Address::parse(bad),
                    Err(TransportError::InvalidAddress { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }
}
