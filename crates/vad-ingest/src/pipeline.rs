// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Processor pool and pipeline assembly.
//!
//! The pipeline owns the ring, the stats block, and every thread handle.
//! Receivers for exactly one transport feed the ring; M processor threads
//! drain it, decode, run VAD, and update stats. Processor 0 additionally
//! owns the report clock. Teardown is strictly ordered: wait for the
//! shutdown flag, stop the broker loop if one is running, join receivers,
//! join processors, flush the tail stats interval.

use crate::config::{Config, Transport};
use crate::error::{Error, Result};
use crate::ring::{Ring, SLOT_BODY};
use crate::shutdown::Shutdown;
use crate::stats::Stats;
use crate::transport::{mqtt::MqttReceiver, tcp, udp};
use crate::vad;
use crate::wire::{self, SensorPacket};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Empty-pop back-off ladder: spin briefly, then yield, then sleep.
///
/// Spinning keeps latency low across sub-microsecond gaps; yielding hands
/// the core to a receiver on oversubscribed hosts; the sleep caps idle CPU
/// burn when the feed genuinely stops.
const SPIN_BEFORE_YIELD: u32 = 64;
const YIELD_BEFORE_SLEEP: u32 = 1024;
const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Poll cadence of the run loop waiting for shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// A fully assembled ingestion pipeline.
pub struct Pipeline {
    config: Config,
    ring: Arc<Ring>,
    stats: Arc<Stats>,
    shutdown: Shutdown,
    /// When processor 0 last reported; shared so the final flush covers
    /// exactly the tail interval. Off the hot path (touched once per
    /// report).
    last_report: Arc<Mutex<Instant>>,
}

impl Pipeline {
    /// Allocate the ring and stats block.
    ///
    /// # Errors
    ///
    /// [`Error::RingAlloc`] if the slot array cannot be allocated.
    pub fn new(config: Config, shutdown: Shutdown) -> Result<Self> {
        let ring = Ring::with_capacity(config.ring_cap).ok_or(Error::RingAlloc {
            capacity: config.ring_cap,
        })?;

        log::info!(
            "[PIPELINE] ring: {} slots x {} B body ({} MiB)",
            ring.capacity(),
            SLOT_BODY,
            ring.capacity() * crate::ring::SLOT_SIZE / (1024 * 1024)
        );

        Ok(Self {
            config,
            ring: Arc::new(ring),
            stats: Stats::new(),
            shutdown,
            last_report: Arc::new(Mutex::new(Instant::now())),
        })
    }

    /// Shared stats handle (test observability).
    #[must_use]
    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Shared ring handle (test observability).
    #[must_use]
    pub fn ring(&self) -> Arc<Ring> {
        Arc::clone(&self.ring)
    }

    /// Start receivers and processors, block until shutdown, tear down.
    ///
    /// # Errors
    ///
    /// Startup failures only (bind, broker connect, thread spawn); once
    /// running, per-packet and per-connection errors are counted and
    /// absorbed.
    pub fn run(&self) -> Result<()> {
        let transport = self.config.transport;

        // Receivers first: bind/connect errors must fail startup before
        // any processor exists.
        let mut receiver_handles = Vec::new();
        let mut mqtt_receiver = None;
        match transport {
            Transport::Udp => {
                receiver_handles = udp::spawn_receivers(
                    &self.config,
                    Arc::clone(&self.ring),
                    Arc::clone(&self.stats),
                    self.shutdown.clone(),
                )?;
            }
            Transport::Tcp => {
                receiver_handles.push(tcp::spawn_receiver(
                    &self.config,
                    Arc::clone(&self.ring),
                    Arc::clone(&self.stats),
                    self.shutdown.clone(),
                )?);
            }
            Transport::Mqtt => {
                mqtt_receiver = Some(MqttReceiver::start(
                    &self.config,
                    Arc::clone(&self.ring),
                    Arc::clone(&self.stats),
                    self.shutdown.clone(),
                )?);
            }
        }

        let processor_handles = self.spawn_processors()?;

        log::info!(
            "[PIPELINE] running: transport={} processors={}",
            transport.label(),
            processor_handles.len()
        );

        while !self.shutdown.is_stopped() {
            std::thread::sleep(SHUTDOWN_POLL);
        }

        log::info!("[PIPELINE] shutting down");

        if let Some(receiver) = mqtt_receiver {
            receiver.stop();
        }
        for handle in receiver_handles {
            let _ = handle.join();
        }
        for handle in processor_handles {
            let _ = handle.join();
        }

        self.final_flush();
        Ok(())
    }

    fn spawn_processors(&self) -> Result<Vec<JoinHandle<()>>> {
        let n = self.config.resolved_proc_threads();
        let interval = self.config.stats_interval;
        let label = self.config.transport.label();

        let mut handles = Vec::with_capacity(n);
        for i in 0..n {
            let ring = Arc::clone(&self.ring);
            let stats = Arc::clone(&self.stats);
            let shutdown = self.shutdown.clone();
            let last_report = Arc::clone(&self.last_report);
            let handle = std::thread::Builder::new()
                .name(format!("vad-proc-{i}"))
                .spawn(move || {
                    processor_loop(i, &ring, &stats, &shutdown, label, interval, &last_report)
                })?;
            handles.push(handle);
        }
        Ok(handles)
    }

    /// Emit one last `[STATS]` line covering the tail interval.
    fn final_flush(&self) {
        if self.config.stats_interval == 0 {
            return;
        }
        let elapsed = self
            .last_report
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        let snap = self.stats.snapshot_and_reset(elapsed);
        println!("{}", snap.format_line(self.config.transport.label()));
    }
}

/// One processor thread: pop, decode, VAD, count; never block, never die
/// on a bad packet.
fn processor_loop(
    index: usize,
    ring: &Ring,
    stats: &Stats,
    shutdown: &Shutdown,
    transport_label: &str,
    stats_interval: u64,
    last_report: &Mutex<Instant>,
) {
    log::debug!("[PROC-{index}] started");

    let report_every = Duration::from_secs(stats_interval);
    let is_reporter = index == 0 && stats_interval > 0;

    let mut buf = [0u8; SLOT_BODY];
    let mut packet = SensorPacket::new();
    let mut empty_streak = 0u32;

    while !shutdown.is_stopped() {
        if is_reporter {
            report_if_due(stats, transport_label, report_every, last_report);
        }

        match ring.try_pop(&mut buf) {
            Some(len) => {
                empty_streak = 0;
                match wire::decode(&buf[..len], &mut packet) {
                    Ok(()) => {
                        let result = vad::process_packet(&packet);
                        stats.record_processed(result.is_active);
                    }
                    Err(e) => {
                        log::debug!("[PROC-{index}] parse error: {e}");
                        stats.record_parse_error();
                    }
                }
            }
            None => {
                empty_streak = empty_streak.saturating_add(1);
                if empty_streak <= SPIN_BEFORE_YIELD {
                    std::hint::spin_loop();
                } else if empty_streak <= YIELD_BEFORE_SLEEP {
                    std::thread::yield_now();
                } else {
                    std::thread::sleep(IDLE_SLEEP);
                }
            }
        }
    }

    log::debug!("[PROC-{index}] stopped");
}

#[inline]
fn report_if_due(
    stats: &Stats,
    transport_label: &str,
    report_every: Duration,
    last_report: &Mutex<Instant>,
) {
    let Ok(mut last) = last_report.lock() else {
        return;
    };
    let elapsed = last.elapsed();
    if elapsed >= report_every {
        *last = Instant::now();
        drop(last);
        let snap = stats.snapshot_and_reset(elapsed);
        println!("{}", snap.format_line(transport_label));
    }
}
