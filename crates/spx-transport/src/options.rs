use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default frame opcode for a WS transport's session layer (`WS`/`MSG_TYPE`).
///
/// The core never interprets this value itself — framing is the out-of-scope
/// session black box — it is only carried through `tune` for the session to
/// pick up once installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WsMessageType {
    Text,
    Binary,
}

/// Snapshot of the socket options honored by `tune`.
///
/// Values are copied into each `Usock`/`Cstream`/`Bstream` at creation time
/// and never read live during I/O.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointOptions {
    /// `SOL_SOCKET`/`SNDBUF`.
    pub send_buf: Option<usize>,
    /// `SOL_SOCKET`/`RCVBUF`.
    pub recv_buf: Option<usize>,
    /// `SOL_SOCKET`/`RECONNECT_IVL`. First retry delay for `cstream`.
    pub reconnect_ivl: Duration,
    /// `SOL_SOCKET`/`RECONNECT_IVL_MAX`. Zero (the default) means "same as
    /// `reconnect_ivl`".
    pub reconnect_ivl_max: Duration,
    /// `SOL_SOCKET`/`IPV4ONLY`. Gates IPv6 resolution.
    pub ipv4_only: bool,
    /// `TCP`/`NODELAY`. Disables Nagle. On by default.
    pub tcp_nodelay: bool,
    /// `WS`/`MSG_TYPE`.
    pub ws_message_type: WsMessageType,
    /// Whether a `cstream` retries indefinitely after a failed/broken
    /// connection.
    pub persistent: bool,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            send_buf: None,
            recv_buf: None,
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::ZERO,
            ipv4_only: false,
            tcp_nodelay: true,
            ws_message_type: WsMessageType::Binary,
            persistent: true,
        }
    }
}

impl EndpointOptions {
    /// Effective cap for the backoff timer: `reconnect_ivl_max` when set,
    /// else `reconnect_ivl`.
    pub fn effective_max_ivl(&self) -> Duration {
        if self.reconnect_ivl_max.is_zero() { self.reconnect_ivl } else { self.reconnect_ivl_max }
    }
}
