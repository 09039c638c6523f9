//! Integration scenario S3 (IPC stale-socket cleanup and `EADDRINUSE`),
//! Unix-domain only.

#![cfg(unix)]

use std::os::unix::net::UnixListener as StdUnixListener;

use spx_transport::addr::Address;
use spx_transport::bstream::Bstream;
use spx_transport::error::TransportError;
use spx_transport::ipc::IpcTransport;
use spx_transport::options::EndpointOptions;
use spx_transport::worker::{EndpointId, Worker};

fn socket_path(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}

/// A stale socket file (creator process gone, nothing listening) is
/// removed and the bind succeeds.
#[test]
fn stale_socket_file_is_removed_and_bind_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "stale.sock");

    {
        // Create and immediately drop a listener: the inode stays on disk
        // (Unix-domain sockets aren't auto-unlinked), but nothing accepts
        // connections on it any more.
        let _stale = StdUnixListener::bind(&path).unwrap();
    }
    assert!(std::path::Path::new(&path).exists(), "socket file should remain after the listener is dropped");

    let mut worker = Worker::new().unwrap();
    let mut bstream =
        Bstream::new(EndpointId(1), format!("ipc://{path}"), EndpointOptions::default(), IpcTransport);
    bstream.bind(&mut worker, &Address::Ipc(path.clone())).expect("stale socket file should be cleaned up");
}

/// A genuinely live listener on the same path causes `EADDRINUSE` rather
/// than being stolen.
#[test]
fn live_listener_is_not_stolen() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "live.sock");

    let mut worker = Worker::new().unwrap();
    let mut first =
        Bstream::new(EndpointId(1), format!("ipc://{path}"), EndpointOptions::default(), IpcTransport);
    first.bind(&mut worker, &Address::Ipc(path.clone())).unwrap();

    let mut second =
        Bstream::new(EndpointId(2), format!("ipc://{path}"), EndpointOptions::default(), IpcTransport);
    let err = second
        .bind(&mut worker, &Address::Ipc(path.clone()))
        .expect_err("binding to a live listener's path must fail");
    match err {
        TransportError::Io(io_err) => assert_eq!(io_err.kind(), std::io::ErrorKind::AddrInUse),
        other => panic!("expected an AddrInUse io error, got {other:?}"),
    }

    assert!(first.stop(&mut worker));
}

/// Stopping a bound listener unlinks its socket file, so the next bind to
/// the same path doesn't have to go through the stale-file probe at all.
#[test]
fn stop_unlinks_the_bound_socket_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = socket_path(&dir, "torn-down.sock");

    let mut worker = Worker::new().unwrap();
    let mut bstream =
        Bstream::new(EndpointId(1), format!("ipc://{path}"), EndpointOptions::default(), IpcTransport);
    bstream.bind(&mut worker, &Address::Ipc(path.clone())).unwrap();
    assert!(std::path::Path::new(&path).exists(), "bind should have created the socket file");

    assert!(bstream.stop(&mut worker));
    assert!(!std::path::Path::new(&path).exists(), "stop should have unlinked the socket file");
}
