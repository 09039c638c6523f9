use mio::Token;

use crate::session::{Session, SessionOutcome};
use crate::usock::{Usock, UsockState};
use crate::vtable::Transport;
use crate::worker::Worker;

/// Events an `Astream` raises to its owning `Bstream`.
#[derive(Debug)]
pub enum AstreamEvent {
    Error,
    Stopped,
}

/// One accepted connection's lifetime, owned by the `Bstream` that
/// accepted it. Grounded on nanomsg's `nn_astream`: a thin wrapper that
/// waits for its usock to finish the handoff and then babysits the
/// installed session until it errors or is stopped.
///
/// On this readiness-based worker the handoff itself is synchronous
/// (`Usock::from_accepted` lands straight in `ACTIVE`), so `Astream` skips
/// nanomsg's separate "armed, waiting for ACCEPTED" phase entirely.
pub struct Astream {
    usock: Usock,
    session: Box<dyn Session>,
    stopping: bool,
}

impl Astream {
    pub fn new(usock: Usock, session: Box<dyn Session>) -> Self {
        Self { usock, session, stopping: false }
    }

    pub fn token(&self) -> Option<Token> {
        self.usock.token()
    }

    /// Drives one worker tick's readiness through the installed session.
    pub fn on_ready(&mut self, readable: bool, writable: bool) -> Option<AstreamEvent> {
        if !matches!(self.usock.state(), UsockState::Active) {
            return None;
        }
        let Some(sock) = self.usock.stream_socket_mut() else {
            return Some(AstreamEvent::Error);
        };
        match self.session.poll_io(sock, readable, writable) {
            SessionOutcome::Ok => None,
            SessionOutcome::Error => Some(AstreamEvent::Error),
            SessionOutcome::Stopped => Some(AstreamEvent::Stopped),
        }
    }

    /// Requests a graceful stop; the caller should keep polling
    /// `is_idle`/tearing down once the session reports idle. Valid to call
    /// from any state.
    pub fn stop(&mut self, worker: &mut Worker, transport: &dyn Transport) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        self.session.stop();
        let _ = self.usock.stop(worker, transport);
    }

    pub fn is_idle(&self) -> bool {
        self.stopping && self.session.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::NullSession;
    use crate::tcp::TcpTransport;
    use crate::vtable::ListenerSocket;
    use crate::worker::EndpointId;
    use std::net::TcpListener as StdTcpListener;
    use std::time::{Duration, Instant};

    fn accepted_astream(worker: &mut Worker) -> (Astream, mio::net::TcpStream) {
        let std_listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        std_listener.set_nonblocking(true).unwrap();
        let addr = std_listener.local_addr().unwrap();
        let listener = mio::net::TcpListener::from_std(std_listener);
        let listen_token = worker.bind_token(EndpointId(0));
        let mut server = Usock::new();
        server.start_listen(worker, listen_token, ListenerSocket::Tcp(listener)).unwrap();

        let client = mio::net::TcpStream::connect(addr).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let events = worker.poll(Some(Duration::from_millis(50))).unwrap();
            for (_, token) in events {
                if token == listen_token {
                    if let crate::usock::AcceptBatch::Ready(accepted) = server.accept_ready(worker) {
                        for (sock, _) in accepted {
                            let tok = worker.bind_token(EndpointId(0));
                            let usock = Usock::from_accepted(worker, tok, sock).unwrap();
                            return (Astream::new(usock, Box::new(NullSession::default())), client);
                        }
                    }
                }
            }
            assert!(Instant::now() < deadline, "accept never became ready");
        }
    }

    #[test]
    fn stop_is_idempotent_and_marks_idle() {
        let mut worker = Worker::new().unwrap();
        let (mut astream, _client) = accepted_astream(&mut worker);
        assert!(!astream.is_idle());
        astream.stop(&mut worker, &TcpTransport);
        assert!(astream.is_idle());
        // Calling stop again must not panic or double-close the descriptor.
        astream.stop(&mut worker, &TcpTransport);
        assert!(astream.is_idle());
    }

    #[test]
    fn on_ready_drains_via_session_until_peer_closes() {
        use std::io::Write;
        let mut worker = Worker::new().unwrap();
        let (mut astream, mut client) = accepted_astream(&mut worker);
        client.write_all(b"ping").unwrap();
        drop(client);

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut outcome = None;
        while outcome.is_none() && Instant::now() < deadline {
            for (_, token) in worker.poll(Some(Duration::from_millis(50))).unwrap() {
                if Some(token) == astream.token() {
                    if let Some(event) = astream.on_ready(true, false) {
                        outcome = Some(event);
                    }
                }
            }
        }
        assert!(matches!(outcome, Some(AstreamEvent::Error)), "peer close should surface as an error event");
    }
}
