use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::TransportError;

/// A parsed endpoint address, as accepted by `bstream`/`cstream` creation.
///
/// Forms:
///   - `tcp://host[;iface]:port[/resource]`
///   - `ipc:///path`
///   - `ws://host[;iface]:port[/resource]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Tcp(StreamAddr),
    Ipc(String),
    Ws(StreamAddr),
}

/// Host/interface/port/resource tuple shared by `tcp://` and `ws://`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamAddr {
    pub iface: Option<String>,
    pub host: String,
    pub port: u16,
    /// Empty resource means `/`.
    pub resource: String,
}

impl Address {
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        if let Some(rest) = raw.strip_prefix("tcp://") {
            return Ok(Address::Tcp(parse_stream_addr(raw, rest)?));
        }
        if let Some(rest) = raw.strip_prefix("ws://") {
            return Ok(Address::Ws(parse_stream_addr(raw, rest)?));
        }
        if let Some(rest) = raw.strip_prefix("ipc://") {
            if rest.is_empty() {
                return Err(TransportError::Config { addr: raw.to_string(), reason: "empty ipc path" });
            }
            return Ok(Address::Ipc(rest.to_string()));
        }
        Err(TransportError::Config { addr: raw.to_string(), reason: "unknown scheme" })
    }
}

impl StreamAddr {
    /// Resolve `host:port` to a concrete `SocketAddr` via the platform
    /// resolver.
    pub fn resolve(&self) -> std::io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"))
    }
}

fn parse_stream_addr(raw: &str, rest: &str) -> Result<StreamAddr, TransportError> {
    let (hostport_and_iface, resource) = match rest.find('/') {
        Some(idx) => (&rest[..idx], rest[idx + 1..].to_string()),
        None => (rest, String::new()),
    };

    let (iface, hostport) = match hostport_and_iface.find(';') {
        Some(idx) => (
            Some(hostport_and_iface[..idx].to_string()),
            &hostport_and_iface[idx + 1..],
        ),
        None => (None, hostport_and_iface),
    };

    let colon = hostport.rfind(':').ok_or(TransportError::Config {
        addr: raw.to_string(),
        reason: "missing port",
    })?;
    let host = hostport[..colon].to_string();
    if host.is_empty() {
        return Err(TransportError::Config { addr: raw.to_string(), reason: "empty host" });
    }
    let port_str = &hostport[colon + 1..];
    let port: u32 = port_str
        .parse()
        .map_err(|_| TransportError::Config { addr: raw.to_string(), reason: "non-numeric port" })?;
    if port == 0 || port > 65535 {
        return Err(TransportError::InvalidPort(port));
    }

    Ok(StreamAddr { iface, host, port: port as u16, resource })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_minimal() {
        let a = Address::parse("tcp://127.0.0.1:5555").unwrap();
        assert_eq!(
            a,
            Address::Tcp(StreamAddr {
                iface: None,
                host: "127.0.0.1".into(),
                port: 5555,
                resource: String::new(),
            })
        );
    }

    #[test]
    fn parses_tcp_with_iface_and_resource() {
        let a = Address::parse("tcp://eth0;example.com:80/chat").unwrap();
        assert_eq!(
            a,
            Address::Tcp(StreamAddr {
                iface: Some("eth0".into()),
                host: "example.com".into(),
                port: 80,
                resource: "chat".into(),
            })
        );
    }

    #[test]
    fn parses_ipc() {
        let a = Address::parse("ipc:///tmp/foo.sock").unwrap();
        assert_eq!(a, Address::Ipc("/tmp/foo.sock".into()));
    }

    #[test]
    fn rejects_bad_port() {
        assert!(matches!(
            Address::parse("tcp://127.0.0.1:0"),
            Err(TransportError::InvalidPort(0))
        ));
        assert!(matches!(
            Address::parse("tcp://127.0.0.1:99999"),
            Err(TransportError::InvalidPort(99999))
        ));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(Address::parse("xyz://host:1").is_err());
    }
}
