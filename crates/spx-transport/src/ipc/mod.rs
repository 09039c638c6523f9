use std::io;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;

use mio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use crate::addr::Address;
use crate::error::{Result, TransportError};
use crate::options::EndpointOptions;
use crate::session::{NullSession, Session};
use crate::vtable::{ListenerSocket, ResolvedTarget, StreamSocket, Transport};

/// `ipc://` transport vtable: Unix-domain stream sockets. IPC has no name
/// resolution, so `start_resolve` is a pass-through to the path.
#[derive(Clone, Copy, Debug, Default)]
pub struct IpcTransport;

impl Transport for IpcTransport {
    fn start_resolve(&self, addr: &Address) -> Result<ResolvedTarget> {
        let Address::Ipc(path) = addr else {
            return Err(TransportError::Config { addr: format!("{addr:?}"), reason: "not an ipc address" });
        };
        Ok(ResolvedTarget::Path(path.clone()))
    }

    fn start_connect(&self, target: &ResolvedTarget) -> io::Result<StreamSocket> {
        let ResolvedTarget::Path(path) = target else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "ipc connect needs a resolved path"));
        };
        Ok(StreamSocket::Unix(UnixStream::connect(path)?))
    }

    /// Removes a stale socket file before binding, the same way nanomsg's
    /// `nn_ipc_start_listen` does: probe with a non-blocking connect, and
    /// only unlink on `ECONNREFUSED` — any other outcome means either
    /// nothing is there or something is genuinely listening, and in the
    /// latter case `bind` should fail with `EADDRINUSE` rather than
    /// stealing the path.
    fn start_listen(&self, addr: &Address) -> Result<ListenerSocket> {
        let Address::Ipc(path) = addr else {
            return Err(TransportError::Config { addr: format!("{addr:?}"), reason: "not an ipc address" });
        };
        unlink_stale_socket(path)?;
        Ok(ListenerSocket::Unix(UnixListener::bind(path)?))
    }

    fn tune(&self, sock: &StreamSocket, _options: &EndpointOptions) -> Result<()> {
        if !matches!(sock, StreamSocket::Unix(_)) {
            return Err(TransportError::Option("not an ipc stream"));
        }
        Ok(())
    }

    fn activate(&self, _options: &EndpointOptions) -> Box<dyn Session> {
        Box::new(NullSession::default())
    }

    /// Unlinks the bound path once the listener usock is idle, so a
    /// stopped bstream doesn't leave its socket file behind for the next
    /// bind to stumble over.
    fn close_listener(&self, sock: &mut ListenerSocket) {
        let ListenerSocket::Unix(listener) = sock else { return };
        let path = match listener.local_addr().ok().and_then(|a| a.as_pathname().map(Path::to_path_buf)) {
            Some(path) => path,
            None => return,
        };
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), err = %e, "failed to unlink ipc socket file on close");
            }
        }
    }
}

fn unlink_stale_socket(path: &str) -> io::Result<()> {
    match StdUnixStream::connect(path) {
        Ok(_) => Err(io::Error::new(io::ErrorKind::AddrInUse, "another endpoint is already listening")),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::ECONNREFUSED) => {
            debug!(path, "removing stale ipc socket file");
            std::fs::remove_file(Path::new(path))
        }
        Err(e) => Err(e),
    }
}
