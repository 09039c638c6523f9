use mio::Token;
use spx_utils::safe_assert_eq;
use tracing::{debug, warn};

use crate::addr::Address;
use crate::backoff::Backoff;
use crate::epbase::Epbase;
use crate::options::EndpointOptions;
use crate::session::{Session, SessionOutcome};
use crate::usock::{Usock, UsockEvent};
use crate::vtable::{ResolvedTarget, Transport};
use crate::worker::{EndpointId, Worker};

/// States of a connector, ported from nanomsg's `nn_cstream`. The two
/// `STOPPING_SSTREAM`/`STOPPING_SSTREAM_FINAL` phases collapse into one
/// `StoppingUsock` step here, and `STOPPING_BACKOFF` is folded straight
/// through `Backoff::cancel` in the same call rather than waiting on a
/// later acknowledgment, since this worker has no asynchronous timer
/// object to tear down (see `backoff.rs`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CstreamState {
    Idle,
    Resolving,
    Connecting,
    Active,
    Waiting,
    StoppingUsock,
    Stopping,
    Done,
}

#[derive(Debug)]
pub enum CstreamEvent {
    Connected,
    ConnectError,
    BrokenConnection,
    Stopped,
}

/// Connector lifetime FSM: resolve -> connect -> active, retrying with
/// exponential backoff on failure when `persistent`.
pub struct Cstream<T: Transport> {
    id: EndpointId,
    epbase: Epbase,
    transport: T,
    usock: Usock,
    session: Option<Box<dyn Session>>,
    backoff: Backoff,
    state: CstreamState,
    target: Option<ResolvedTarget>,
}

impl<T: Transport> Cstream<T> {
    pub fn new(id: EndpointId, addr: impl Into<String>, options: EndpointOptions, transport: T) -> Self {
        let backoff = Backoff::new(options.reconnect_ivl, options.effective_max_ivl());
        Self {
            id,
            epbase: Epbase::new(addr, options),
            transport,
            usock: Usock::new(),
            session: None,
            backoff,
            state: CstreamState::Idle,
            target: None,
        }
    }

    pub fn epbase(&self) -> &Epbase {
        &self.epbase
    }

    pub fn state(&self) -> CstreamState {
        self.state
    }

    pub fn usock_token(&self) -> Option<Token> {
        self.usock.token()
    }

    /// Target produced by the last `start_resolve` call: a plain field
    /// rather than a pointer threaded between two callbacks.
    pub fn resolved_target(&self) -> Option<&ResolvedTarget> {
        self.target.as_ref()
    }

    /// IDLE -> RESOLVING -> CONNECTING (or -> WAITING on failure).
    pub fn start(&mut self, worker: &mut Worker, addr: &Address) {
        safe_assert_eq!(self.state, CstreamState::Idle);
        self.resolve_and_connect(worker, addr);
    }

    fn resolve_and_connect(&mut self, worker: &mut Worker, addr: &Address) {
        self.state = CstreamState::Resolving;
        match self.transport.start_resolve(addr) {
            Ok(target) => {
                self.target = Some(target.clone());
                match self.transport.start_connect(&target) {
                    Ok(sock) => {
                        let token = worker.bind_token(self.id);
                        if let Err(e) = self.usock.start_connect(worker, token, sock) {
                            self.connect_failed(e.into());
                        } else {
                            self.epbase.stat_inprogress_connections(1);
                            self.state = CstreamState::Connecting;
                        }
                    }
                    Err(e) => self.connect_failed(e.into()),
                }
            }
            Err(e) => self.connect_failed(e),
        }
    }

    fn connect_failed(&mut self, err: crate::error::TransportError) {
        warn!(err = %err, "connect failed");
        self.epbase.stat_connect_error();
        self.epbase.set_error(std::io::Error::other(err.to_string()));
        if self.epbase.options().persistent {
            self.backoff.start();
            self.state = CstreamState::Waiting;
        } else {
            self.state = CstreamState::Stopping;
        }
    }

    /// Routes one worker-readiness token belonging to this cstream.
    pub fn on_worker_event(&mut self, worker: &mut Worker, token: Token, readable: bool, writable: bool) -> Option<CstreamEvent> {
        if self.usock.token() != Some(token) {
            return None;
        }
        match self.state {
            CstreamState::Connecting => match self.usock.finish_connect(worker) {
                Ok(UsockEvent::Established) => {
                    self.epbase.stat_inprogress_connections(-1);
                    self.epbase.stat_established_connection();
                    self.backoff.reset_interval();
                    self.session = Some(self.transport.activate(self.epbase.options()));
                    self.state = CstreamState::Active;
                    debug!(addr = self.epbase.addr(), "cstream connected");
                    Some(CstreamEvent::Connected)
                }
                Ok(UsockEvent::Error(e)) | Err(e) => {
                    self.epbase.stat_inprogress_connections(-1);
                    self.connect_failed(e.into());
                    Some(CstreamEvent::ConnectError)
                }
                Ok(_) => None,
            },
            CstreamState::Active => {
                let session = self.session.as_mut()?;
                let sock = self.usock.stream_socket_mut()?;
                match session.poll_io(sock, readable, writable) {
                    SessionOutcome::Ok => None,
                    SessionOutcome::Error | SessionOutcome::Stopped => {
                        self.epbase.stat_broken_connection();
                        let _ = self.usock.stop(worker, &self.transport);
                        self.session = None;
                        if self.epbase.options().persistent {
                            self.backoff.start();
                            self.state = CstreamState::Waiting;
                        } else {
                            self.state = CstreamState::Stopping;
                        }
                        Some(CstreamEvent::BrokenConnection)
                    }
                }
            }
            _ => None,
        }
    }

    /// Call periodically (e.g. once per worker-poll timeout) to drive the
    /// backoff timer while `WAITING`. Returns `true` if a retry was kicked
    /// off, so the caller knows to re-register with the worker's address.
    pub fn poll_backoff(&mut self, worker: &mut Worker, addr: &Address) -> bool {
        if self.state != CstreamState::Waiting {
            return false;
        }
        if self.backoff.poll() {
            self.backoff.cancel();
            self.resolve_and_connect(worker, addr);
            true
        } else {
            false
        }
    }

    pub fn backoff_remaining(&self) -> Option<std::time::Duration> {
        self.backoff.remaining()
    }

    /// Drives the shutdown cascade one step; returns `true` once fully
    /// stopped. `STOPPING_BACKOFF` folds through `Backoff::cancel`
    /// immediately rather than waiting on an async acknowledgment.
    pub fn stop(&mut self, worker: &mut Worker) -> bool {
        match self.state {
            CstreamState::Idle => self.state = CstreamState::Done,
            CstreamState::Resolving | CstreamState::Connecting | CstreamState::Active => {
                if let Some(session) = self.session.as_mut() {
                    session.stop();
                }
                let _ = self.usock.stop(worker, &self.transport);
                self.session = None;
                self.state = CstreamState::StoppingUsock;
            }
            CstreamState::Waiting => {
                self.backoff.cancel();
                self.state = CstreamState::Stopping;
            }
            CstreamState::StoppingUsock | CstreamState::Stopping => {}
            CstreamState::Done => {}
        }
        if matches!(self.state, CstreamState::StoppingUsock | CstreamState::Stopping) {
            self.state = CstreamState::Done;
            self.epbase.stopped();
        }
        self.state == CstreamState::Done
    }

    pub fn is_done(&self) -> bool {
        self.state == CstreamState::Done
    }
}
