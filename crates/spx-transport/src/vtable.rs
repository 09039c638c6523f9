use std::io;
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use mio::net::{UnixListener, UnixStream};

use crate::addr::Address;
use crate::error::Result;
use crate::options::EndpointOptions;
use crate::session::Session;

/// What `resolve` hands to `connect`: a plain enum field on `Cstream`
/// rather than a pointer threaded between two separate callbacks.
#[derive(Clone, Debug)]
pub enum ResolvedTarget {
    Net(SocketAddr),
    Path(String),
}

pub enum ListenerSocket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

pub enum StreamSocket {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

/// The per-transport operations, injected so `Bstream`, `Cstream` and
/// `Astream` never branch on "is this TCP or IPC or WS".
///
/// `cancel_io` is omitted as a real per-transport hook: on the
/// readiness-based worker, cancellation is always "deregister the
/// descriptor from the poller", which is identical for every transport —
/// `Usock::stop` does it directly via `TaskIo::cancel` rather than calling
/// back through here.
pub trait Transport: Send + Sync {
    /// Resolve `addr` to a connect target. IPC has no name resolution and
    /// resolves synchronously; TCP/WS go through `StreamAddr::resolve`.
    fn start_resolve(&self, addr: &Address) -> Result<ResolvedTarget>;

    /// Begin a non-blocking connect. The returned socket is already
    /// registered as connecting by the caller (`Usock::start_connect`).
    fn start_connect(&self, target: &ResolvedTarget) -> io::Result<StreamSocket>;

    /// Create, bind and listen. Local-path transports remove a stale
    /// socket file first (probe via non-blocking connect; unlink only on
    /// `ECONNREFUSED`).
    fn start_listen(&self, addr: &Address) -> Result<ListenerSocket>;

    /// Apply `SNDBUF`/`RCVBUF` and any transport-specific option.
    fn tune(&self, sock: &StreamSocket, options: &EndpointOptions) -> Result<()>;

    /// Construct the session installed once a usock reaches `ACTIVE`. The
    /// session is an opaque black box here; transports differ only in
    /// which one they hand back.
    fn activate(&self, options: &EndpointOptions) -> Box<dyn Session>;

    /// Post-send hook, called after each successful write (no-op for
    /// TCP/IPC; exists for transports that need to track frame boundaries).
    fn sent(&self, _sock: &mut StreamSocket) {}

    /// Final transport-specific teardown before a connected descriptor is
    /// dropped (e.g. nothing for TCP or IPC; exists for transports that
    /// need to flush or notify on close).
    fn close(&self, _sock: &mut StreamSocket) {}

    /// Final transport-specific teardown for a listener once its usock has
    /// gone idle. IPC unlinks the filesystem path it bound, so a stopped
    /// listener doesn't leave a dead socket file behind; TCP and WS have
    /// nothing to do here.
    fn close_listener(&self, _sock: &mut ListenerSocket) {}
}

/// Accept one pending connection off a listener (shared across TCP/IPC —
/// both are plain `accept()`, so this lives outside the `Transport` trait
/// rather than being injected per transport).
pub fn accept_one(listener: &mut ListenerSocket) -> io::Result<(StreamSocket, String)> {
    match listener {
        ListenerSocket::Tcp(l) => {
            let (stream, peer) = l.accept()?;
            Ok((StreamSocket::Tcp(stream), peer.to_string()))
        }
        #[cfg(unix)]
        ListenerSocket::Unix(l) => {
            let (stream, _) = l.accept()?;
            Ok((StreamSocket::Unix(stream), "unix".to_string()))
        }
    }
}
