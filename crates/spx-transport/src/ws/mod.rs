use std::io;

use mio::net::{TcpListener, TcpStream};

use crate::addr::Address;
use crate::error::{Result, TransportError};
use crate::options::EndpointOptions;
use crate::session::{NullSession, Session};
use crate::vtable::{ListenerSocket, ResolvedTarget, StreamSocket, Transport};

/// `ws://` transport vtable. WS framing is a session-layer concern out of
/// scope here, so this reuses TCP's byte-level connect/listen/accept
/// verbatim and applies the same `TCP_NODELAY` option in `tune` — it
/// differs from `TcpTransport` only in which address variant it accepts;
/// `ws_message_type` passes straight through to the session the
/// (out-of-scope) framing layer installs.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn start_resolve(&self, addr: &Address) -> Result<ResolvedTarget> {
        let Address::Ws(stream_addr) = addr else {
            return Err(TransportError::Config { addr: format!("{addr:?}"), reason: "not a ws address" });
        };
        Ok(ResolvedTarget::Net(stream_addr.resolve()?))
    }

    fn start_connect(&self, target: &ResolvedTarget) -> io::Result<StreamSocket> {
        let ResolvedTarget::Net(sock_addr) = target else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "ws connect needs a resolved SocketAddr"));
        };
        Ok(StreamSocket::Tcp(TcpStream::connect(*sock_addr)?))
    }

    fn start_listen(&self, addr: &Address) -> Result<ListenerSocket> {
        let Address::Ws(stream_addr) = addr else {
            return Err(TransportError::Config { addr: format!("{addr:?}"), reason: "not a ws address" });
        };
        Ok(ListenerSocket::Tcp(TcpListener::bind(stream_addr.resolve()?)?))
    }

    fn tune(&self, sock: &StreamSocket, options: &EndpointOptions) -> Result<()> {
        let StreamSocket::Tcp(stream) = sock else {
            return Err(TransportError::Option("not a ws stream"));
        };
        // `ws_message_type` is carried to the session below, not applied
        // to the socket itself — it selects text/binary framing, which
        // the (out-of-scope) session layer is responsible for.
        stream.set_nodelay(options.tcp_nodelay)?;
        Ok(())
    }

    fn activate(&self, _options: &EndpointOptions) -> Box<dyn Session> {
        Box::new(NullSession::default())
    }
}
