use std::io;

use crate::options::EndpointOptions;

/// Statistics counters an endpoint accumulates over its lifetime:
/// `cstream`'s `inprogress_connections`/`established_connections`/
/// `connect_errors`/`broken_connections`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EndpointStats {
    pub inprogress_connections: i64,
    pub established_connections: u64,
    pub connect_errors: u64,
    pub broken_connections: u64,
    pub dropped_connections: u64,
    pub accepted_connections: u64,
}

/// Minimal stand-in for the upper scalability-protocol core's endpoint
/// registry (`epbase`). The real registry owns socket-wide option storage,
/// a context pointer, and the stopped-notification callback that lets the
/// owning SP socket reap a fully-stopped endpoint; this core only needs a
/// narrow slice of that, so `Epbase` is a plain struct rather than a trait
/// object.
#[derive(Debug)]
pub struct Epbase {
    addr: String,
    options: EndpointOptions,
    stats: EndpointStats,
    last_error: Option<io::Error>,
    stopped: bool,
}

impl Epbase {
    pub fn new(addr: impl Into<String>, options: EndpointOptions) -> Self {
        Self { addr: addr.into(), options, stats: EndpointStats::default(), last_error: None, stopped: false }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn options(&self) -> &EndpointOptions {
        &self.options
    }

    pub fn stats(&self) -> EndpointStats {
        self.stats
    }

    pub fn set_error(&mut self, err: io::Error) {
        self.last_error = Some(err);
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn last_error(&self) -> Option<&io::Error> {
        self.last_error.as_ref()
    }

    pub fn stat_inprogress_connections(&mut self, delta: i64) {
        self.stats.inprogress_connections += delta;
    }

    pub fn stat_established_connection(&mut self) {
        self.stats.established_connections += 1;
    }

    pub fn stat_connect_error(&mut self) {
        self.stats.connect_errors += 1;
    }

    pub fn stat_broken_connection(&mut self) {
        self.stats.broken_connections += 1;
    }

    pub fn stat_dropped_connection(&mut self) {
        self.stats.dropped_connections += 1;
    }

    pub fn stat_accepted_connection(&mut self) {
        self.stats.accepted_connections += 1;
    }

    /// Marks the endpoint as fully stopped. Mirrors `nn_epbase_stopped`:
    /// the owning SP socket is notified that it may now reap this endpoint.
    pub fn stopped(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}
