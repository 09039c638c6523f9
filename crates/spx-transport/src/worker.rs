use std::collections::HashMap;
use std::io;
use std::time::Duration;

use mio::{Events, Interest, Poll, Registry, Token, event::Event};

/// Identifies which live endpoint (`Bstream` or `Cstream`) owns a token,
/// so a bare readiness event can be routed to the FSM that understands it.
/// Each endpoint may own more than one token (a listener plus any number of
/// accepted streams), so this is deliberately coarse — the endpoint itself
/// resolves which of its own descriptors the token belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EndpointId(pub u64);

/// Single-thread readiness reactor: one `mio::Poll`, monotonically
/// increasing tokens, and a routing map from token to whichever endpoint
/// registered it, so a single worker can be shared by every
/// `bstream`/`cstream`/`astream` in a context rather than owning one
/// transport's connections directly.
///
/// Only the readiness-based (POSIX/`mio`) branch is implemented; the
/// completion-port branch nanomsg uses on Windows has no analogue here.
pub struct Worker {
    poll: Poll,
    events: Events,
    next_token: usize,
    owners: HashMap<Token, EndpointId>,
}

impl Worker {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            next_token: 0,
            owners: HashMap::new(),
        })
    }

    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Allocates a fresh token and records which endpoint it belongs to.
    /// The caller still has to `registry().register(...)` the descriptor.
    pub fn bind_token(&mut self, owner: EndpointId) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.owners.insert(token, owner);
        token
    }

    pub fn forget_token(&mut self, token: Token) {
        self.owners.remove(&token);
    }

    pub fn owner_of(&self, token: Token) -> Option<EndpointId> {
        self.owners.get(&token).copied()
    }

    pub fn register(
        &mut self,
        source: &mut dyn mio::event::Source,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    pub fn reregister(
        &mut self,
        source: &mut dyn mio::event::Source,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn deregister(&mut self, source: &mut dyn mio::event::Source) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// Blocks for at most `timeout` (or indefinitely if `None`) and returns
    /// the `(EndpointId, &Event)` pairs ready for dispatch. Events whose
    /// token has no registered owner (a race between deregistration and an
    /// in-flight notification) are silently dropped.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<(EndpointId, Token)>> {
        self.poll.poll(&mut self.events, timeout)?;
        Ok(self
            .events
            .iter()
            .filter_map(|ev: &Event| self.owners.get(&ev.token()).map(|id| (*id, ev.token())))
            .collect())
    }

    /// Raw readiness details for a token from the most recent `poll` call.
    pub fn event_for(&self, token: Token) -> Option<&Event> {
        self.events.iter().find(|ev| ev.token() == token)
    }

    /// `(readable, writable)` for a token from the most recent `poll` call.
    pub fn readiness(&self, token: Token) -> (bool, bool) {
        match self.event_for(token) {
            Some(ev) => (ev.is_readable(), ev.is_writable()),
            None => (false, false),
        }
    }
}
