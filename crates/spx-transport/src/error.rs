use std::io;

use thiserror::Error;

/// Errors surfaced synchronously from `bind`/`connect` entry points, or
/// recorded on a usock and propagated once to its owner.
///
/// Mirrors the taxonomy of configuration / connection-terminating /
/// resource-exhaustion errors; transient errors (`EAGAIN`, `ECONNABORTED`)
/// never reach this type, they're swallowed at the usock layer.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("bad address {addr:?}: {reason}")]
    Config { addr: String, reason: &'static str },

    #[error("port out of range: {0}")]
    InvalidPort(u32),

    #[error("socket option rejected: {0}")]
    Option(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("accept failed due to resource exhaustion: {0}")]
    ResourceExhausted(io::Error),
}

impl TransportError {
    /// True for `EMFILE`/`ENFILE`/`ENOBUFS`/`ENOMEM` style accept failures
    /// that should latch the listener into `ACCEPTING_ERROR` rather than
    /// being retried silently.
    pub fn is_resource_exhaustion(err: &io::Error) -> bool {
        matches!(
            err.raw_os_error(),
            Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM)
        )
    }

    /// True for errors the usock read/write path treats as "try again later",
    /// never surfaced to the owner.
    pub fn is_transient(err: &io::Error) -> bool {
        matches!(err.kind(), io::ErrorKind::WouldBlock)
            || matches!(err.raw_os_error(), Some(libc::ECONNABORTED))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_exhaustion_matches_only_the_expected_errnos() {
        assert!(TransportError::is_resource_exhaustion(&io::Error::from_raw_os_error(libc::EMFILE)));
        assert!(TransportError::is_resource_exhaustion(&io::Error::from_raw_os_error(libc::ENFILE)));
        assert!(TransportError::is_resource_exhaustion(&io::Error::from_raw_os_error(libc::ENOBUFS)));
        assert!(TransportError::is_resource_exhaustion(&io::Error::from_raw_os_error(libc::ENOMEM)));
        assert!(!TransportError::is_resource_exhaustion(&io::Error::from_raw_os_error(libc::ECONNRESET)));
    }

    #[test]
    fn transient_matches_would_block_and_econnaborted_only() {
        assert!(TransportError::is_transient(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(TransportError::is_transient(&io::Error::from_raw_os_error(libc::ECONNABORTED)));
        assert!(!TransportError::is_transient(&io::Error::from_raw_os_error(libc::ECONNRESET)));
    }
}
