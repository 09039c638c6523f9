use crate::vtable::StreamSocket;

/// Outcome of one `Session::poll_io` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Nothing terminal happened; keep the usock active.
    Ok,
    /// The session observed an unrecoverable condition on the stream.
    Error,
    /// The session has nothing further to do and may be torn down.
    Stopped,
}

/// The opaque byte-stream consumer installed once a usock reaches `ACTIVE`.
/// What a session actually does with the bytes — scalability-protocol
/// framing, a higher-level request/response layer — is out of scope here;
/// this crate only owns the two events a session is allowed to raise:
/// `ERROR` and `STOPPED`.
pub trait Session: Send {
    /// Called once per worker tick while the owning usock is `ACTIVE` and
    /// readable/writable. Implementations read/write through `sock`
    /// directly — the core never inspects the bytes.
    fn poll_io(&mut self, sock: &mut StreamSocket, readable: bool, writable: bool) -> SessionOutcome;

    /// Requests a graceful stop. `is_idle` should report `true` once the
    /// session has nothing left outstanding.
    fn stop(&mut self);

    fn is_idle(&self) -> bool;
}

/// Default black-box session: drains and discards anything readable,
/// never initiates writes, and is idle immediately on `stop`. Stands in
/// for the real scalability-protocol session layer, which is out of scope
/// for this crate.
#[derive(Default)]
pub struct NullSession {
    stopped: bool,
}

impl Session for NullSession {
    fn poll_io(&mut self, sock: &mut StreamSocket, readable: bool, _writable: bool) -> SessionOutcome {
        if !readable {
            return SessionOutcome::Ok;
        }
        let mut scratch = [0u8; 2048];
        loop {
            match crate::usock::stream_read(sock, &mut scratch) {
                Ok(0) => return SessionOutcome::Error,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return SessionOutcome::Ok,
                Err(_) => return SessionOutcome::Error,
            }
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn is_idle(&self) -> bool {
        self.stopped
    }
}
