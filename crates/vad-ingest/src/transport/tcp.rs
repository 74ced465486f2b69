// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stream receiver: accept loop + length-prefixed framer.
//!
//! TCP has no message boundaries, so each sensor packet travels as
//! `[u32 LE total_len][total_len bytes]` where `total_len` covers the
//! 32-byte header plus payload (not the prefix itself). The framer is a
//! two-state machine:
//!
//! ```text
//! ReadLen --4 bytes--> ReadBody --total_len bytes--> enqueue --> ReadLen
//! ```
//!
//! A length outside `[32, 65535]` desynchronizes the stream; the
//! connection is closed and the error counted. EOF in either state closes
//! the connection cleanly.
//!
//! Connections are handled inline on the accept thread: the benchmark
//! workload is one firehose connection, and inline handling keeps the
//! receive path allocation- and handoff-free. The accept loop polls a
//! non-blocking listener so it can observe shutdown between connections.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ring::Ring;
use crate::shutdown::Shutdown;
use crate::stats::Stats;
use crate::transport::{push_or_count, RECV_TIMEOUT_SECS, TCP_BACKLOG};
use crate::wire::{validate_frame_len, MAX_DATAGRAM};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Frame length prefix size.
const LEN_PREFIX: usize = 4;

/// Accept-poll interval; bounds shutdown latency between connections.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Bind the listener and spawn the accept thread.
pub fn spawn_receiver(
    config: &Config,
    ring: Arc<Ring>,
    stats: Arc<Stats>,
    shutdown: Shutdown,
) -> Result<JoinHandle<()>> {
    let addr = config.listen_addr();
    let listener = bind_listener(&addr)?;
    let recv_buf = config.recv_buf;

    log::info!("[TCP] listening on {addr} (backlog {TCP_BACKLOG})");

    let handle = std::thread::Builder::new()
        .name("tcp-accept".to_string())
        .spawn(move || accept_loop(&listener, recv_buf, &ring, &stats, &shutdown))?;

    Ok(handle)
}

fn accept_loop(
    listener: &TcpListener,
    recv_buf: usize,
    ring: &Ring,
    stats: &Stats,
    shutdown: &Shutdown,
) {
    while !shutdown.is_stopped() {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("[TCP] client connected: {peer}");
                if let Err(e) = configure_stream(&stream, recv_buf) {
                    log::warn!("[TCP] failed to configure {peer}: {e}");
                    stats.record_recv_error();
                    continue;
                }
                connection_loop(stream, &peer, ring, stats, shutdown);
                log::debug!("[TCP] client disconnected: {peer}");
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::warn!("[TCP] accept error: {e}");
                stats.record_recv_error();
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }

    log::debug!("[TCP] accept loop stopped");
}

fn configure_stream(stream: &TcpStream, recv_buf: usize) -> io::Result<()> {
    // Some platforms let accepted sockets inherit the listener's
    // non-blocking mode; the framer wants timeout-bounded blocking reads.
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(Duration::from_secs(RECV_TIMEOUT_SECS)))?;
    SockRef::from(stream).set_recv_buffer_size(recv_buf)?;
    Ok(())
}

/// Outcome of filling a buffer from the stream.
enum ReadOutcome {
    /// Buffer completely filled.
    Filled,
    /// Peer closed the connection (clean in either framer state).
    Eof,
    /// Shutdown flag tripped mid-read.
    Stopped,
    /// Persistent socket error.
    Failed(io::Error),
}

/// Framer state (one frame per cycle).
enum ReadState {
    ReadLen,
    ReadBody { total_len: usize },
}

/// Run the length-prefixed framer until EOF, shutdown, or a framing error.
fn connection_loop(
    mut stream: TcpStream,
    peer: &SocketAddr,
    ring: &Ring,
    stats: &Stats,
    shutdown: &Shutdown,
) {
    let mut len_buf = [0u8; LEN_PREFIX];
    let mut body = vec![0u8; MAX_DATAGRAM];
    let mut state = ReadState::ReadLen;

    loop {
        match state {
            ReadState::ReadLen => {
                match read_full(&mut stream, &mut len_buf, shutdown) {
                    ReadOutcome::Filled => {}
                    ReadOutcome::Eof | ReadOutcome::Stopped => return,
                    ReadOutcome::Failed(e) => {
                        log::warn!("[TCP] read error from {peer}: {e}");
                        stats.record_recv_error();
                        return;
                    }
                }

                let total_len = u32::from_le_bytes(len_buf) as usize;
                if let Err(e) = validate_frame_len(total_len) {
                    log::warn!("[TCP] closing {peer}: {e}");
                    stats.record_parse_error();
                    return;
                }
                state = ReadState::ReadBody { total_len };
            }
            ReadState::ReadBody { total_len } => {
                match read_full(&mut stream, &mut body[..total_len], shutdown) {
                    ReadOutcome::Filled => {}
                    ReadOutcome::Eof | ReadOutcome::Stopped => return,
                    ReadOutcome::Failed(e) => {
                        log::warn!("[TCP] read error from {peer}: {e}");
                        stats.record_recv_error();
                        return;
                    }
                }

                // The prefix itself counts toward received bytes.
                stats.record_recv(total_len + LEN_PREFIX);
                push_or_count(ring, stats, &body[..total_len]);
                state = ReadState::ReadLen;
            }
        }
    }
}

/// Read exactly `buf.len()` bytes, surviving read timeouts and interrupts.
///
/// `std::io::Read::read_exact` cannot be used here: with a read timeout set
/// it may fail mid-buffer and discard the partial fill, desynchronizing the
/// frame stream. This loop keeps its cursor across timeouts and polls the
/// shutdown flag between attempts.
fn read_full(stream: &mut TcpStream, buf: &mut [u8], shutdown: &Shutdown) -> ReadOutcome {
    let mut filled = 0;
    while filled < buf.len() {
        if shutdown.is_stopped() {
            return ReadOutcome::Stopped;
        }
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return ReadOutcome::Eof,
            Ok(n) => filled += n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => return ReadOutcome::Failed(e),
        }
    }
    ReadOutcome::Filled
}

/// Bind a listening socket with an explicit backlog.
fn bind_listener(addr: &str) -> Result<TcpListener> {
    let parsed: SocketAddr = addr
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("bad listen address {addr}: {e}")))?;

    let bind = || -> io::Result<TcpListener> {
        let socket = Socket::new(
            match parsed {
                SocketAddr::V4(_) => Domain::IPV4,
                SocketAddr::V6(_) => Domain::IPV6,
            },
            Type::STREAM,
            Some(Protocol::TCP),
        )?;
        socket.set_reuse_address(true)?;
        socket.bind(&parsed.into())?;
        socket.listen(TCP_BACKLOG)?;
        let listener: TcpListener = socket.into();
        // Non-blocking accept, polled on ACCEPT_POLL, so shutdown is
        // observed between connections.
        listener.set_nonblocking(true)?;
        Ok(listener)
    };

    bind().map_err(|source| Error::Bind {
        addr: addr.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::SLOT_BODY;
    use crate::wire::HEADER_SIZE;
    use std::io::Write;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(LEN_PREFIX + payload.len());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Connect a client to a private listener and run the connection loop
    /// on the accepted side.
    fn run_connection(
        client_writes: impl FnOnce(&mut TcpStream) + Send + 'static,
    ) -> (Arc<Ring>, Arc<Stats>) {
        let ring = Arc::new(Ring::with_capacity(16).expect("alloc"));
        let stats = Stats::new();
        let shutdown = Shutdown::new();

        let listener = bind_listener("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let client = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).expect("connect");
            client_writes(&mut stream);
            // Drop closes the stream; the framer sees EOF and returns.
        });

        // Accept (listener is non-blocking).
        let stream = loop {
            match listener.accept() {
                Ok((s, _)) => break s,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("accept failed: {e}"),
            }
        };
        configure_stream(&stream, 64 * 1024).expect("configure");

        let peer = stream.peer_addr().expect("peer addr");
        connection_loop(stream, &peer, &ring, &stats, &shutdown);
        client.join().expect("client thread");

        (ring, stats)
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let msg_a = vec![0xaa; HEADER_SIZE + 4];
        let msg_b = vec![0xbb; HEADER_SIZE];
        let (wire_a, wire_b) = (frame(&msg_a), frame(&msg_b));

        let (ring, stats) = run_connection(move |stream| {
            let mut all = wire_a.clone();
            all.extend_from_slice(&wire_b);
            stream.write_all(&all).expect("write");
        });

        let mut buf = [0u8; SLOT_BODY];
        let len = ring.try_pop(&mut buf).expect("first frame");
        assert_eq!(&buf[..len], msg_a.as_slice());
        let len = ring.try_pop(&mut buf).expect("second frame");
        assert_eq!(&buf[..len], msg_b.as_slice());
        assert!(ring.try_pop(&mut buf).is_none());

        // Byte accounting includes the two 4-byte prefixes.
        let snap = stats.snapshot_and_reset(Duration::from_secs(1));
        assert_eq!(snap.pps, 2.0);
        let expected_bytes = (msg_a.len() + 4 + msg_b.len() + 4) as f64;
        assert_eq!(snap.mbps, expected_bytes * 8.0 / 1e6);
    }

    #[test]
    fn test_frame_split_across_writes() {
        let msg = (0..100u8).cycle().take(HEADER_SIZE + 64).collect::<Vec<_>>();
        let wire = frame(&msg);

        let (ring, _stats) = run_connection(move |stream| {
            // Dribble the frame in awkward chunks, including a split inside
            // the length prefix.
            for chunk in [&wire[..2], &wire[2..7], &wire[7..40], &wire[40..]] {
                stream.write_all(chunk).expect("write chunk");
                stream.flush().expect("flush");
                std::thread::sleep(Duration::from_millis(10));
            }
        });

        let mut buf = [0u8; SLOT_BODY];
        let len = ring.try_pop(&mut buf).expect("reassembled frame");
        assert_eq!(&buf[..len], msg.as_slice());
    }

    #[test]
    fn test_undersized_length_closes_connection() {
        let (ring, stats) = run_connection(move |stream| {
            // total_len = 31 < header size.
            stream
                .write_all(&31u32.to_le_bytes())
                .expect("write bad len");
            // Anything after the bad prefix must be ignored.
            stream.write_all(&[0u8; 64]).ok();
        });

        let mut buf = [0u8; SLOT_BODY];
        assert!(ring.try_pop(&mut buf).is_none());
        assert_eq!(stats.parse_errors(), 1);
    }

    #[test]
    fn test_oversized_length_closes_connection() {
        let (ring, stats) = run_connection(move |stream| {
            stream
                .write_all(&(MAX_DATAGRAM as u32 + 1).to_le_bytes())
                .expect("write bad len");
        });

        let mut buf = [0u8; SLOT_BODY];
        assert!(ring.try_pop(&mut buf).is_none());
        assert_eq!(stats.parse_errors(), 1);
    }

    #[test]
    fn test_eof_mid_body_is_clean() {
        let (ring, stats) = run_connection(move |stream| {
            // Declare 100 bytes, send 10, hang up.
            stream.write_all(&100u32.to_le_bytes()).expect("write len");
            stream.write_all(&[0u8; 10]).expect("write partial");
        });

        let mut buf = [0u8; SLOT_BODY];
        assert!(ring.try_pop(&mut buf).is_none());
        assert_eq!(stats.parse_errors(), 0);
    }
}
