use mio::Token;
use spx_utils::safe_assert_eq;
use tracing::{debug, warn};

use crate::astream::{Astream, AstreamEvent};
use crate::epbase::Epbase;
use crate::error::Result;
use crate::options::EndpointOptions;
use crate::usock::{AcceptBatch, Usock, UsockState};
use crate::vtable::Transport;
use crate::worker::{EndpointId, Worker};

/// States of a listener, ported from nanomsg's `nn_bstream`.
/// `STOPPING_ASTREAM` (singular, the one pending being-accepted connection)
/// has no analogue here — the readiness worker never leaves an accept
/// half-finished across ticks — so only the plural draining phase remains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BstreamState {
    Idle,
    Active,
    StoppingUsock,
    StoppingAstreams,
    Done,
}

#[derive(Debug)]
pub enum BstreamEvent {
    Accepted,
    AcceptError,
    ChildError,
    Stopped,
}

/// Listener lifetime FSM: owns one listening `Usock` plus every `Astream`
/// it has accepted.
pub struct Bstream<T: Transport> {
    id: EndpointId,
    epbase: Epbase,
    transport: T,
    listener: Usock,
    astreams: Vec<Astream>,
    state: BstreamState,
}

impl<T: Transport> Bstream<T> {
    pub fn new(id: EndpointId, addr: impl Into<String>, options: EndpointOptions, transport: T) -> Self {
        Self {
            id,
            epbase: Epbase::new(addr, options),
            transport,
            listener: Usock::new(),
            astreams: Vec::new(),
            state: BstreamState::Idle,
        }
    }

    pub fn epbase(&self) -> &Epbase {
        &self.epbase
    }

    pub fn state(&self) -> BstreamState {
        self.state
    }

    /// IDLE -> ACTIVE: resolve the address, bind and listen.
    pub fn bind(&mut self, worker: &mut Worker, addr: &crate::addr::Address) -> Result<()> {
        safe_assert_eq!(self.state, BstreamState::Idle);
        let listener = self.transport.start_listen(addr)?;
        let token = worker.bind_token(self.id);
        self.listener.start_listen(worker, token, listener)?;
        self.state = BstreamState::Active;
        debug!(addr = self.epbase.addr(), "bstream listening");
        Ok(())
    }

    pub fn listener_token(&self) -> Option<Token> {
        self.listener.token()
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.listener_local_addr()
    }

    fn astream_index(&self, token: Token) -> Option<usize> {
        self.astreams.iter().position(|a| a.token() == Some(token))
    }

    /// Routes one worker-readiness token to whichever of this bstream's
    /// descriptors it belongs to: the listener (drive the accept loop) or
    /// one of its live astreams (forward to its session).
    pub fn on_worker_event(
        &mut self,
        worker: &mut Worker,
        token: Token,
        readable: bool,
        writable: bool,
    ) -> Vec<BstreamEvent> {
        let mut out = Vec::new();
        if self.state != BstreamState::Active {
            return out;
        }
        if self.listener.token() == Some(token) {
            self.drain_accept_queue(worker, &mut out);
            return out;
        }

        if let Some(idx) = self.astream_index(token) {
            if let Some(event) = self.astreams[idx].on_ready(readable, writable) {
                match event {
                    AstreamEvent::Error => {
                        self.epbase.stat_broken_connection();
                        out.push(BstreamEvent::ChildError);
                    }
                    AstreamEvent::Stopped => {}
                }
                self.astreams[idx].stop(worker, &self.transport);
                if self.astreams[idx].is_idle() {
                    self.astreams.remove(idx);
                }
            }
        }
        out
    }

    pub fn astream_count(&self) -> usize {
        self.astreams.len()
    }

    fn spawn_astream(&mut self, worker: &mut Worker, sock: crate::vtable::StreamSocket, peer: String, out: &mut Vec<BstreamEvent>) {
        let token = worker.bind_token(self.id);
        match Usock::from_accepted(worker, token, sock) {
            Ok(usock) => {
                if let Some(sock) = usock.stream_socket() {
                    if let Err(e) = self.transport.tune(sock, self.epbase.options()) {
                        warn!(err = %e, peer, "tune failed on accepted connection");
                    }
                }
                let session = self.transport.activate(self.epbase.options());
                self.astreams.push(Astream::new(usock, session));
                self.epbase.stat_accepted_connection();
                out.push(BstreamEvent::Accepted);
            }
            Err(e) => {
                worker.forget_token(token);
                warn!(err = %e, peer, "failed to register accepted connection");
            }
        }
    }

    /// Drains every connection currently sitting in the listener's accept
    /// queue, spawning an `Astream` per success. Factored out so both the
    /// worker-event path and `rearm_accept` share it: `mio`'s
    /// edge-triggered registration only raises one notification per
    /// transition to readable, so after an `EMFILE` pause the backlog that
    /// was already signalled needs an explicit re-drain rather than
    /// waiting on a fresh kernel event that may never come.
    fn drain_accept_queue(&mut self, worker: &mut Worker, out: &mut Vec<BstreamEvent>) {
        match self.listener.accept_ready(worker) {
            AcceptBatch::Ready(accepted) => {
                for (sock, peer) in accepted {
                    self.spawn_astream(worker, sock, peer, out);
                }
            }
            AcceptBatch::ResourceExhausted(accepted, err) => {
                for (sock, peer) in accepted {
                    self.spawn_astream(worker, sock, peer, out);
                }
                warn!(err = %err, "accept failed: resource exhaustion, listener paused");
                self.epbase.set_error(err);
                out.push(BstreamEvent::AcceptError);
            }
        }
    }

    /// Re-arms the listener after `AcceptError` once the caller has freed
    /// a resource, then immediately retries the drain rather than waiting
    /// for another edge-triggered notification.
    pub fn rearm_accept(&mut self, worker: &mut Worker) -> Vec<BstreamEvent> {
        let mut out = Vec::new();
        if matches!(self.listener.state(), UsockState::AcceptingError) {
            if let Err(e) = self.listener.rearm_accept(worker) {
                warn!(err = %e, "failed to re-register listener after rearm");
                return out;
            }
            self.epbase.clear_error();
            self.drain_accept_queue(worker, &mut out);
        }
        out
    }

    /// Drives the shutdown cascade one step. Returns `true` once fully
    /// stopped. Mirrors `nn_bstream_shutdown`'s sequential `if` chain,
    /// which falls straight through every already-idle phase in one call.
    pub fn stop(&mut self, worker: &mut Worker) -> bool {
        if self.state == BstreamState::Idle {
            self.state = BstreamState::Done;
        }
        if self.state == BstreamState::Active {
            let _ = self.listener.stop(worker, &self.transport);
            self.state = BstreamState::StoppingUsock;
        }
        if self.state == BstreamState::StoppingUsock {
            self.state = BstreamState::StoppingAstreams;
        }
        if self.state == BstreamState::StoppingAstreams {
            for astream in &mut self.astreams {
                astream.stop(worker, &self.transport);
            }
            self.astreams.retain(|a| !a.is_idle());
            if self.astreams.is_empty() {
                self.state = BstreamState::Done;
                self.epbase.stopped();
            }
        }
        self.state == BstreamState::Done
    }

    pub fn is_done(&self) -> bool {
        self.state == BstreamState::Done
    }
}
