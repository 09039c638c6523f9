//! Integration scenario S5 (accept EMFILE): drives the process close to
//! its open-file limit so a burst of pending connections makes `accept()`
//! fail with `EMFILE`, and checks the listener latches into
//! `ACCEPTING_ERROR` and resumes only once the owner re-arms it.
//!
//! Lives in its own test binary (one `#[test]` function) so holding the
//! process near its fd ceiling can't starve any other test running
//! concurrently in the same binary.

use std::fs::File;
use std::net::TcpStream as StdTcpStream;
use std::time::{Duration, Instant};

use spx_transport::addr::{Address, StreamAddr};
use spx_transport::bstream::{Bstream, BstreamEvent};
use spx_transport::options::EndpointOptions;
use spx_transport::tcp::TcpTransport;
use spx_transport::worker::{EndpointId, Worker};

fn loopback(port: u16) -> Address {
    Address::Tcp(StreamAddr { iface: None, host: "127.0.0.1".into(), port, resource: String::new() })
}

fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd").map(|d| d.count()).unwrap_or(0)
}

#[test]
fn accept_emfile_latches_and_resumes_after_rearm() {
    let mut worker = Worker::new().unwrap();
    let mut bstream =
        Bstream::new(EndpointId(1), "tcp://127.0.0.1:0", EndpointOptions::default(), TcpTransport);
    bstream.bind(&mut worker, &loopback(0)).unwrap();
    let listen_addr = bstream.local_addr().unwrap();

    // Queue up several pending connections before starving the process of
    // descriptors, so the client side's own fd usage doesn't compete with
    // the budget we're about to spend forcing the server's accept() into
    // EMFILE.
    let mut clients = Vec::new();
    for _ in 0..10 {
        clients.push(StdTcpStream::connect(listen_addr).expect("client connect should succeed"));
    }

    let mut limit: libc::rlimit = unsafe { std::mem::zeroed() };
    unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    let used = open_fd_count();
    let slack = 3usize;
    let budget = (limit.rlim_cur as usize).saturating_sub(used + slack);

    let mut filler: Vec<File> = Vec::new();
    for _ in 0..budget {
        match File::open("/dev/null") {
            Ok(f) => filler.push(f),
            Err(_) => break,
        }
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut saw_accept_error = false;
    let mut accepted = 0usize;
    while Instant::now() < deadline && !saw_accept_error {
        for (id, token) in worker.poll(Some(Duration::from_millis(100))).unwrap() {
            if id != EndpointId(1) {
                continue;
            }
            let (r, w) = worker.readiness(token);
            for event in bstream.on_worker_event(&mut worker, token, r, w) {
                match event {
                    BstreamEvent::Accepted => accepted += 1,
                    BstreamEvent::AcceptError => saw_accept_error = true,
                    _ => {}
                }
            }
        }
    }
    assert!(saw_accept_error, "expected the listener to latch into an accept error under fd pressure");

    // Release the filler descriptors — standing in for whatever resource
    // the real owner would reclaim before re-arming — then resume.
    filler.clear();
    for event in bstream.rearm_accept(&mut worker) {
        if matches!(event, BstreamEvent::Accepted) {
            accepted += 1;
        }
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline && accepted < clients.len() {
        for (id, token) in worker.poll(Some(Duration::from_millis(100))).unwrap() {
            if id != EndpointId(1) {
                continue;
            }
            let (r, w) = worker.readiness(token);
            for event in bstream.on_worker_event(&mut worker, token, r, w) {
                if matches!(event, BstreamEvent::Accepted) {
                    accepted += 1;
                }
            }
        }
    }
    assert!(accepted > 0, "listener should resume accepting after re-arm");

    drop(clients);
    assert!(bstream.stop(&mut worker));
}
