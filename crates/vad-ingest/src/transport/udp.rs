// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram receiver: N parallel SO_REUSEPORT sockets.
//!
//! Each worker thread owns its own socket bound to the same port; the
//! kernel hashes the 4-tuple across sockets, so flows from different
//! senders land on different threads without any userspace dispatch. Each
//! socket gets a large receive buffer (datagram bursts outrun the ring
//! briefly) and a 1 s receive timeout so the loop can observe shutdown.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ring::Ring;
use crate::shutdown::Shutdown;
use crate::stats::Stats;
use crate::transport::{push_or_count, RECV_TIMEOUT_SECS};
use crate::wire::MAX_DATAGRAM;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Bind all sockets, then spawn one receiver thread per socket.
///
/// Binding happens up front so a bad port fails the whole startup instead
/// of killing worker threads one by one.
pub fn spawn_receivers(
    config: &Config,
    ring: Arc<Ring>,
    stats: Arc<Stats>,
    shutdown: Shutdown,
) -> Result<Vec<JoinHandle<()>>> {
    let n_threads = config.resolved_recv_threads();
    let addr = config.listen_addr();

    let mut sockets = Vec::with_capacity(n_threads);
    for _ in 0..n_threads {
        sockets.push(bind_reuseport(&addr, config.recv_buf)?);
    }

    log::info!(
        "[UDP] listening on {} with {} receiver thread(s), recv_buf={}",
        addr,
        n_threads,
        config.recv_buf
    );

    let mut handles = Vec::with_capacity(n_threads);
    for (i, socket) in sockets.into_iter().enumerate() {
        let ring = Arc::clone(&ring);
        let stats = Arc::clone(&stats);
        let shutdown = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name(format!("udp-recv-{i}"))
            .spawn(move || recv_loop(i, &socket, &ring, &stats, &shutdown))?;
        handles.push(handle);
    }

    Ok(handles)
}

/// Blocking receive loop for one socket.
///
/// Transient errors (timeout, interrupt) are retried silently; anything
/// else is counted and terminates this thread only.
fn recv_loop(thread_id: usize, socket: &UdpSocket, ring: &Ring, stats: &Stats, shutdown: &Shutdown) {
    log::debug!("[UDP-{thread_id}] receiver started");

    let mut buf = vec![0u8; MAX_DATAGRAM];

    while !shutdown.is_stopped() {
        match socket.recv(&mut buf) {
            Ok(n) => {
                stats.record_recv(n);
                push_or_count(ring, stats, &buf[..n]);
            }
            Err(e) if is_transient(&e) => continue,
            Err(e) => {
                log::warn!("[UDP-{thread_id}] recv error, stopping thread: {e}");
                stats.record_recv_error();
                break;
            }
        }
    }

    log::debug!("[UDP-{thread_id}] receiver stopped");
}

#[inline]
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Bind a datagram socket with SO_REUSEPORT + SO_REUSEADDR, the configured
/// SO_RCVBUF, and a bounded receive timeout.
fn bind_reuseport(addr: &str, recv_buf_size: usize) -> Result<UdpSocket> {
    let parsed: SocketAddr = addr
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("bad listen address {addr}: {e}")))?;

    let bind = || -> io::Result<UdpSocket> {
        let socket = Socket::new(
            match parsed {
                SocketAddr::V4(_) => Domain::IPV4,
                SocketAddr::V6(_) => Domain::IPV6,
            },
            Type::DGRAM,
            Some(Protocol::UDP),
        )?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_recv_buffer_size(recv_buf_size)?;
        socket.set_read_timeout(Some(Duration::from_secs(RECV_TIMEOUT_SECS)))?;
        socket.bind(&parsed.into())?;
        Ok(socket.into())
    };

    bind().map_err(|source| Error::Bind {
        addr: addr.to_string(),
        source,
    })
}
