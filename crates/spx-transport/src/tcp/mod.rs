use std::io;

use mio::net::{TcpListener, TcpStream};

use crate::addr::Address;
use crate::error::{Result, TransportError};
use crate::options::EndpointOptions;
use crate::session::{NullSession, Session};
use crate::vtable::{ListenerSocket, ResolvedTarget, StreamSocket, Transport};

/// `tcp://` transport vtable: the non-blocking connect/listen/tune
/// operations for a plain TCP byte stream. The framed socket and
/// send-backlog machinery lives generically in `usock.rs`, so this module
/// only supplies the transport-specific operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn start_resolve(&self, addr: &Address) -> Result<ResolvedTarget> {
        let Address::Tcp(stream_addr) = addr else {
            return Err(TransportError::Config { addr: format!("{addr:?}"), reason: "not a tcp address" });
        };
        Ok(ResolvedTarget::Net(stream_addr.resolve()?))
    }

    fn start_connect(&self, target: &ResolvedTarget) -> io::Result<StreamSocket> {
        let ResolvedTarget::Net(sock_addr) = target else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "tcp connect needs a resolved SocketAddr"));
        };
        Ok(StreamSocket::Tcp(TcpStream::connect(*sock_addr)?))
    }

    fn start_listen(&self, addr: &Address) -> Result<ListenerSocket> {
        let Address::Tcp(stream_addr) = addr else {
            return Err(TransportError::Config { addr: format!("{addr:?}"), reason: "not a tcp address" });
        };
        Ok(ListenerSocket::Tcp(TcpListener::bind(stream_addr.resolve()?)?))
    }

    fn tune(&self, sock: &StreamSocket, options: &EndpointOptions) -> Result<()> {
        let StreamSocket::Tcp(stream) = sock else {
            return Err(TransportError::Option("not a tcp stream"));
        };
        stream.set_nodelay(options.tcp_nodelay)?;
        Ok(())
    }

    fn activate(&self, _options: &EndpointOptions) -> Box<dyn Session> {
        Box::new(NullSession::default())
    }
}
