// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lock-free throughput and error counters.
//!
//! Producers (receivers) and consumers (processors) increment atomic
//! counters with Relaxed ordering; the numbers are advisory and a report
//! may observe slight skew between counters taken microseconds apart.
//! `snapshot_and_reset` exchanges each counter to zero individually, so an
//! increment racing with a snapshot lands either in that report or in the
//! next one, never nowhere.
//!
//! # Performance
//! - record: one or two `fetch_add` (Relaxed), no branches on the hot path
//! - snapshot: seven `swap` loads, called once per report interval

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared counter block, one per pipeline.
#[derive(Debug, Default)]
pub struct Stats {
    recv_packets: AtomicU64,
    recv_bytes: AtomicU64,
    processed: AtomicU64,
    vad_active: AtomicU64,
    parse_errors: AtomicU64,
    recv_errors: AtomicU64,
    drops: AtomicU64,
}

impl Stats {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// One packet (datagram, frame, or broker message) received.
    #[inline]
    pub fn record_recv(&self, bytes: usize) {
        self.recv_packets.fetch_add(1, Ordering::Relaxed);
        self.recv_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// One packet fully decoded and run through VAD.
    #[inline]
    pub fn record_processed(&self, is_active: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if is_active {
            self.vad_active.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_recv_error(&self) {
        self.recv_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// `try_push` returned `Full`; the packet was dropped at the ring.
    #[inline]
    pub fn record_drop(&self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Current received-packet count (test observability).
    #[must_use]
    pub fn recv_packets(&self) -> u64 {
        self.recv_packets.load(Ordering::Relaxed)
    }

    /// Current received-byte count (test observability).
    #[must_use]
    pub fn recv_bytes(&self) -> u64 {
        self.recv_bytes.load(Ordering::Relaxed)
    }

    /// Current VAD-active count (test observability).
    #[must_use]
    pub fn vad_active(&self) -> u64 {
        self.vad_active.load(Ordering::Relaxed)
    }

    /// Current parse-error count (test observability).
    #[must_use]
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    /// Current processed count (test observability).
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Current drop count (test observability).
    #[must_use]
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Exchange every counter to zero and compute per-second rates.
    ///
    /// `elapsed` is clamped to 1 ms before division so a pathological
    /// scheduler stall cannot produce infinities.
    pub fn snapshot_and_reset(&self, elapsed: Duration) -> StatsSnapshot {
        let secs = elapsed.as_secs_f64().max(0.001);

        let pkts = self.recv_packets.swap(0, Ordering::Relaxed);
        let bytes = self.recv_bytes.swap(0, Ordering::Relaxed);
        let proc = self.processed.swap(0, Ordering::Relaxed);
        let active = self.vad_active.swap(0, Ordering::Relaxed);
        let parse_errors = self.parse_errors.swap(0, Ordering::Relaxed);
        let recv_errors = self.recv_errors.swap(0, Ordering::Relaxed);
        let drops = self.drops.swap(0, Ordering::Relaxed);

        StatsSnapshot {
            pps: pkts as f64 / secs,
            mbps: (bytes as f64 * 8.0) / (secs * 1e6),
            proc_per_sec: proc as f64 / secs,
            active,
            parse_errors,
            recv_errors,
            drops,
        }
    }
}

/// One reporting interval's worth of rates and absolute error counts.
#[derive(Debug)]
pub struct StatsSnapshot {
    pub pps: f64,
    pub mbps: f64,
    pub proc_per_sec: f64,
    pub active: u64,
    pub parse_errors: u64,
    pub recv_errors: u64,
    pub drops: u64,
}

impl StatsSnapshot {
    /// Render the stable `[STATS]` line for `transport` ("UDP"/"TCP"/"MQTT").
    ///
    /// The format is a stdout contract consumed by the benchmark scripts;
    /// rate fields print with zero decimals except Mbit/s which carries two.
    #[must_use]
    pub fn format_line(&self, transport: &str) -> String {
        format!(
            "[STATS] {}: {:.0} pps, {:.2} Mbps | VAD: {:.0} proc/s, {} active | errors: parse={} recv={} drops={}",
            transport,
            self.pps,
            self.mbps,
            self.proc_per_sec,
            self.active,
            self.parse_errors,
            self.recv_errors,
            self.drops
        )
    }
}
