use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::Shutdown as NetShutdown;

use mio::{Interest, Token};
use spx_utils::safe_assert;

use crate::error::TransportError;
use crate::options::EndpointOptions;
use crate::task_io::TaskIo;
use crate::vtable::{ListenerSocket, StreamSocket, Transport, accept_one};
use crate::worker::Worker;

/// One descriptor's lifetime. A single enum covers both the listening and
/// the connecting/streaming roles, matching nanomsg's one `nn_usock` state
/// table rather than splitting into two Rust types —
/// `BEING_ACCEPTED`/`ACCEPTING`/`CANCELLING_ACCEPT` exist for fidelity with
/// that table even though this readiness-based worker resolves an accept
/// synchronously in one call, collapsing what the completion-port variant
/// would spread across several ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsockState {
    Idle,
    Starting,
    BeingAccepted,
    Accepted,
    Listening,
    Accepting,
    AcceptingError,
    CancellingAccept,
    Connecting,
    Active,
    CancellingIo,
    Stopping,
    Done,
}

/// Events a `Usock` raises to its owner (`Bstream`/`Cstream`/`Astream`).
#[derive(Debug)]
pub enum UsockEvent {
    Established,
    Sent,
    Received,
    /// A connection-terminating or resource-exhaustion error.
    Error(io::Error),
    /// A pending task-IO was cancelled in response to `stop`.
    Shutdown,
    Stopped,
}

/// Batch size for the read path's fallback buffer, sized at least one MTU
/// to amortize syscalls. `2048` covers Ethernet MTU with headroom; IPC
/// datagrams over loopback streams are typically far smaller.
const RX_BATCH: usize = 2048;

pub struct Usock {
    state: UsockState,
    token: Option<Token>,
    socket: Option<UsockKind>,
    task_io: TaskIo,
    rx_batch: Vec<u8>,
    send_backlog: VecDeque<Vec<u8>>,
}

enum UsockKind {
    Listener(ListenerSocket),
    Stream(StreamSocket),
}

impl Default for Usock {
    fn default() -> Self {
        Self {
            state: UsockState::Idle,
            token: None,
            socket: None,
            task_io: TaskIo::default(),
            rx_batch: vec![0u8; RX_BATCH],
            send_backlog: VecDeque::new(),
        }
    }
}

impl Usock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> UsockState {
        self.state
    }

    pub fn token(&self) -> Option<Token> {
        self.token
    }

    /// IDLE -> STARTING -> LISTENING. Registers for `READABLE` so the
    /// worker wakes `accept_ready` whenever a connection is pending.
    pub fn start_listen(&mut self, worker: &mut Worker, token: Token, mut sock: ListenerSocket) -> io::Result<()> {
        safe_assert!(matches!(self.state, UsockState::Idle));
        self.state = UsockState::Starting;
        register_listener(worker, &mut sock, token)?;
        self.token = Some(token);
        self.socket = Some(UsockKind::Listener(sock));
        self.state = UsockState::Listening;
        Ok(())
    }

    /// IDLE -> STARTING -> CONNECTING. `sock` must already be a
    /// non-blocking, in-progress connect (`Transport::start_connect`).
    pub fn start_connect(&mut self, worker: &mut Worker, token: Token, mut sock: StreamSocket) -> io::Result<()> {
        safe_assert!(matches!(self.state, UsockState::Idle));
        self.state = UsockState::Starting;
        register_stream(worker, &mut sock, token, Interest::WRITABLE)?;
        self.token = Some(token);
        self.socket = Some(UsockKind::Stream(sock));
        self.state = UsockState::Connecting;
        Ok(())
    }

    /// Wraps an already-accepted stream straight into `ACTIVE`: on a
    /// readiness worker, `BEING_ACCEPTED`/`ACCEPTED` pass through in the
    /// same call that performed the `accept()`, so there is no separate
    /// tick where the pairing back-pointer needs to outlive this call.
    pub fn from_accepted(worker: &mut Worker, token: Token, mut sock: StreamSocket) -> io::Result<Self> {
        let mut usock = Self::default();
        usock.state = UsockState::Accepted;
        register_stream(worker, &mut sock, token, Interest::READABLE)?;
        usock.token = Some(token);
        usock.socket = Some(UsockKind::Stream(sock));
        usock.task_io.arm_readable();
        usock.state = UsockState::Active;
        Ok(usock)
    }

    /// CONNECTING + writable -> ACTIVE, or -> an error to be raised by the
    /// caller. `SO_ERROR` disambiguates "connected" from "refused".
    pub fn finish_connect(&mut self, worker: &mut Worker) -> io::Result<UsockEvent> {
        safe_assert!(matches!(self.state, UsockState::Connecting));
        let Some(UsockKind::Stream(sock)) = self.socket.as_mut() else {
            unreachable_usock(&self.state);
        };
        let err = stream_take_error(sock)?;
        if let Some(err) = err {
            self.state = UsockState::Done;
            return Ok(UsockEvent::Error(err));
        }
        let token = self.token.expect("connecting usock always has a token");
        register_stream(worker, sock, token, Interest::READABLE)?;
        self.task_io.arm_readable();
        self.state = UsockState::Active;
        Ok(UsockEvent::Established)
    }

    /// LISTENING + readable -> drain every pending connection, latching
    /// into ACCEPTING_ERROR and pulling the listener off the worker on
    /// resource exhaustion so a backlog that already tripped one
    /// edge-triggered notification can't trip `accept_one` again before
    /// `rearm_accept` puts it back.
    pub fn accept_ready(&mut self, worker: &mut Worker) -> AcceptBatch {
        safe_assert!(matches!(self.state, UsockState::Listening | UsockState::Accepting));
        self.state = UsockState::Accepting;
        let Some(UsockKind::Listener(listener)) = self.socket.as_mut() else {
            unreachable_usock(&self.state);
        };
        let mut accepted = Vec::new();
        loop {
            match accept_one(listener) {
                Ok(pair) => accepted.push(pair),
                Err(e) if TransportError::is_transient(&e) => {
                    self.state = UsockState::Listening;
                    return AcceptBatch::Ready(accepted);
                }
                Err(e) if TransportError::is_resource_exhaustion(&e) => {
                    self.state = UsockState::AcceptingError;
                    let _ = worker.deregister(listener_source(listener));
                    return AcceptBatch::ResourceExhausted(accepted, e);
                }
                Err(e) => {
                    // Logic/unexpected listener error: treat conservatively
                    // like resource exhaustion rather than tearing down the
                    // listener on a transient condition we didn't model.
                    self.state = UsockState::AcceptingError;
                    let _ = worker.deregister(listener_source(listener));
                    return AcceptBatch::ResourceExhausted(accepted, e);
                }
            }
        }
    }

    /// ACCEPTING_ERROR -> LISTENING, re-registering the listener with the
    /// worker after the caller has freed resources. The descriptor was
    /// pulled off the worker in `accept_ready`, so this has to put it back
    /// rather than just flip the state.
    pub fn rearm_accept(&mut self, worker: &mut Worker) -> io::Result<()> {
        safe_assert!(matches!(self.state, UsockState::AcceptingError));
        let token = self.token.expect("accepting-error usock always has a token");
        let Some(UsockKind::Listener(listener)) = self.socket.as_mut() else {
            unreachable_usock(&self.state);
        };
        register_listener(worker, listener, token)?;
        self.state = UsockState::Listening;
        Ok(())
    }

    /// ACTIVE I/O tick: drains readable bytes into `on_data`, and flushes
    /// the send backlog when writable. Returns the terminal event, if any.
    pub fn poll_active(
        &mut self,
        readable: bool,
        writable: bool,
        mut on_data: impl FnMut(&[u8]),
    ) -> Option<UsockEvent> {
        safe_assert!(matches!(self.state, UsockState::Active));
        let Some(UsockKind::Stream(sock)) = self.socket.as_mut() else {
            unreachable_usock(&self.state);
        };

        if writable {
            match flush_backlog(sock, &mut self.send_backlog) {
                Ok(_) => {}
                Err(e) => {
                    self.state = UsockState::Done;
                    return Some(UsockEvent::Error(e));
                }
            }
        }

        if readable {
            loop {
                match stream_read(sock, &mut self.rx_batch) {
                    Ok(0) => {
                        // Peer closed cleanly: a connection-terminating
                        // condition, surfaced the same as an error.
                        self.state = UsockState::Done;
                        return Some(UsockEvent::Error(io::Error::new(
                            io::ErrorKind::ConnectionReset,
                            "peer closed the stream",
                        )));
                    }
                    Ok(n) => on_data(&self.rx_batch[..n]),
                    Err(e) if TransportError::is_transient(&e) => break,
                    Err(e) => {
                        self.state = UsockState::Done;
                        return Some(UsockEvent::Error(e));
                    }
                }
            }
        }
        None
    }

    /// Queues `data` for send, writing immediately where possible and
    /// falling back to the backlog + re-armed `WRITABLE` interest on a
    /// short write.
    pub fn send(&mut self, worker: &mut Worker, data: &[u8]) -> io::Result<()> {
        safe_assert!(matches!(self.state, UsockState::Active));
        let Some(UsockKind::Stream(sock)) = self.socket.as_mut() else {
            unreachable_usock(&self.state);
        };
        if !self.send_backlog.is_empty() {
            self.send_backlog.push_back(data.to_vec());
            return Ok(());
        }
        match write_stream(sock, data) {
            Ok(n) if n == data.len() => Ok(()),
            Ok(n) => {
                self.send_backlog.push_back(data[n..].to_vec());
                self.arm_writable(worker, sock)
            }
            Err(e) if TransportError::is_transient(&e) => {
                self.send_backlog.push_back(data.to_vec());
                self.arm_writable(worker, sock)
            }
            Err(e) => Err(e),
        }
    }

    fn arm_writable(&mut self, worker: &mut Worker, sock: &mut StreamSocket) -> io::Result<()> {
        let token = self.token.expect("active usock always has a token");
        register_stream(worker, sock, token, Interest::READABLE | Interest::WRITABLE)?;
        self.task_io.arm_writable();
        Ok(())
    }

    /// Cancels any in-flight I/O, deregisters, and tears the descriptor
    /// down. Valid to call from any state. Returns the `SHUTDOWN`/`STOPPED`
    /// pair in order; `SHUTDOWN` is omitted for a usock that never had a
    /// descriptor (IDLE) — cancellation there is a pure no-op, nothing to
    /// acknowledge.
    pub fn stop(&mut self, worker: &mut Worker, transport: &dyn Transport) -> Vec<UsockEvent> {
        let had_descriptor = self.socket.is_some();
        let had_io = self.task_io.cancel();
        if let Some(token) = self.token.take() {
            worker.forget_token(token);
        }
        match self.socket.take() {
            Some(UsockKind::Stream(mut sock)) => {
                let _ = worker.deregister(stream_source(&mut sock));
                transport.close(&mut sock);
                let _ = stream_shutdown(&mut sock);
            }
            Some(UsockKind::Listener(mut listener)) => {
                let _ = worker.deregister(listener_source(&mut listener));
                transport.close_listener(&mut listener);
            }
            None => {}
        }
        self.state = UsockState::Done;

        let mut events = Vec::with_capacity(2);
        if had_descriptor || had_io {
            events.push(UsockEvent::Shutdown);
        }
        events.push(UsockEvent::Stopped);
        events
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Raw access to the underlying connected socket, for a `Session` that
    /// owns its own framing and reads/writes directly. `None` for a
    /// listener or a usock with no live descriptor.
    pub fn stream_socket_mut(&mut self) -> Option<&mut StreamSocket> {
        match self.socket.as_mut() {
            Some(UsockKind::Stream(s)) => Some(s),
            _ => None,
        }
    }

    pub fn stream_socket(&self) -> Option<&StreamSocket> {
        match self.socket.as_ref() {
            Some(UsockKind::Stream(s)) => Some(s),
            _ => None,
        }
    }

    /// The bound address of a listening usock's socket (tests binding to
    /// port `0` need this to discover the OS-assigned port).
    pub fn listener_local_addr(&self) -> io::Result<std::net::SocketAddr> {
        match self.socket.as_ref() {
            Some(UsockKind::Listener(ListenerSocket::Tcp(l))) => l.local_addr(),
            _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a tcp listener")),
        }
    }
}

pub enum AcceptBatch {
    Ready(Vec<(StreamSocket, String)>),
    ResourceExhausted(Vec<(StreamSocket, String)>, io::Error),
}

fn register_listener(worker: &mut Worker, sock: &mut ListenerSocket, token: Token) -> io::Result<()> {
    worker.register(listener_source(sock), token, Interest::READABLE)
}

fn register_stream(worker: &mut Worker, sock: &mut StreamSocket, token: Token, interest: Interest) -> io::Result<()> {
    match worker.register(stream_source(sock), token, interest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => worker.reregister(stream_source(sock), token, interest),
        Err(e) => Err(e),
    }
}

fn listener_source(sock: &mut ListenerSocket) -> &mut dyn mio::event::Source {
    match sock {
        ListenerSocket::Tcp(l) => l,
        #[cfg(unix)]
        ListenerSocket::Unix(l) => l,
    }
}

fn stream_source(sock: &mut StreamSocket) -> &mut dyn mio::event::Source {
    match sock {
        StreamSocket::Tcp(s) => s,
        #[cfg(unix)]
        StreamSocket::Unix(s) => s,
    }
}

fn stream_take_error(sock: &mut StreamSocket) -> io::Result<Option<io::Error>> {
    match sock {
        StreamSocket::Tcp(s) => s.take_error(),
        #[cfg(unix)]
        StreamSocket::Unix(s) => s.take_error(),
    }
}

fn stream_shutdown(sock: &mut StreamSocket) -> io::Result<()> {
    match sock {
        StreamSocket::Tcp(s) => s.shutdown(NetShutdown::Both),
        #[cfg(unix)]
        StreamSocket::Unix(s) => s.shutdown(NetShutdown::Both),
    }
}

fn write_stream(sock: &mut StreamSocket, data: &[u8]) -> io::Result<usize> {
    match sock {
        StreamSocket::Tcp(s) => s.write(data),
        #[cfg(unix)]
        StreamSocket::Unix(s) => s.write(data),
    }
}

/// Plain byte read, used by the default black-box session: no framing
/// here, a session reads through the usock's descriptor directly.
pub fn stream_read(sock: &mut StreamSocket, buf: &mut [u8]) -> io::Result<usize> {
    match sock {
        StreamSocket::Tcp(s) => s.read(buf),
        #[cfg(unix)]
        StreamSocket::Unix(s) => recv_unix_with_fds(s, buf),
    }
}

/// Unix-domain recv with `SCM_RIGHTS` ancillary data drained and closed
/// immediately: an unclaimed passed fd must never leak. This core has no
/// use for passed descriptors itself — the session layer that would claim
/// them is out of scope — so every fd received here is closed on the spot.
#[cfg(unix)]
fn recv_unix_with_fds(stream: &mut mio::net::UnixStream, buf: &mut [u8]) -> io::Result<usize> {
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    const CMSG_CAPACITY: usize = 256;
    let mut cmsg_buf = [0u8; CMSG_CAPACITY];
    let mut iov = libc::iovec { iov_base: buf.as_mut_ptr().cast(), iov_len: buf.len() };
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr().cast();
    msg.msg_controllen = cmsg_buf.len();

    let fd = stream.as_raw_fd();
    let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    let mut fds: Vec<OwnedFd> = Vec::new();
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            let hdr = &*cmsg;
            if hdr.cmsg_level == libc::SOL_SOCKET && hdr.cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(cmsg);
                let count = (hdr.cmsg_len as usize - libc::CMSG_LEN(0) as usize) / std::mem::size_of::<libc::c_int>();
                for i in 0..count {
                    let raw = *(data as *const libc::c_int).add(i);
                    fds.push(OwnedFd::from_raw_fd(raw));
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }
    // No session in this core claims passed descriptors; drop them
    // immediately rather than leaking them into the process's fd table.
    drop(fds);

    Ok(n as usize)
}

fn flush_backlog(sock: &mut StreamSocket, backlog: &mut VecDeque<Vec<u8>>) -> io::Result<()> {
    while let Some(front) = backlog.front_mut() {
        match write_stream(sock, front) {
            Ok(n) if n == front.len() => {
                backlog.pop_front();
            }
            Ok(n) => {
                front.drain(..n);
                return Ok(());
            }
            Err(e) if TransportError::is_transient(&e) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn unreachable_usock(state: &UsockState) -> ! {
    crate::unreachable_fsm!(state, "expected a live descriptor");
    unreachable!()
}
