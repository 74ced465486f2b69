// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # vad-ingest - High-throughput sensor ingestion with VAD
//!
//! Accepts binary sensor packets over one of three transports, decodes
//! them, runs a Voice Activity Detection computation, and reports
//! throughput and error counters at a fixed cadence.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |  one transport per invocation                                |
//! |  UDP (N reuseport sockets) | TCP (framed) | MQTT (QoS 0)     |
//! +------------------------------+-------------------------------+
//!                                | try_push (raw wire bytes)
//!                                v
//! +--------------------------------------------------------------+
//! |  lock-free MPMC ring (power-of-two slots, per-slot ready)    |
//! +------------------------------+-------------------------------+
//!                                | try_pop
//!                                v
//! +--------------------------------------------------------------+
//! |  M processors: decode -> VAD -> stats                        |
//! |  processor 0 owns the periodic [STATS] report                |
//! +--------------------------------------------------------------+
//! ```
//!
//! Everything on the hot path is OS threads and atomics: receivers may
//! block on sockets (bounded by a 1 s timeout), processors never block,
//! and the ring is the only shared mutable object between them. Per-packet
//! errors are counted, never fatal; only startup errors (bind, broker
//! connect, ring allocation) abort the process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vad_ingest::{Config, Pipeline, Shutdown};
//! use clap::Parser;
//!
//! fn main() -> vad_ingest::Result<()> {
//!     let config = Config::parse();
//!     let shutdown = Shutdown::new();
//!     Pipeline::new(config, shutdown)?.run()
//! }
//! ```

/// Runtime configuration and transport selection.
pub mod config;
/// Fatal startup error type.
pub mod error;
/// Processor pool and pipeline assembly.
pub mod pipeline;
/// Bounded lock-free MPMC ring of fixed-size byte slots.
pub mod ring;
/// Cooperative shutdown flag.
pub mod shutdown;
/// Throughput and error counters.
pub mod stats;
/// Ingestion transports (UDP, TCP, MQTT).
pub mod transport;
/// Audio and emotional VAD kernels.
pub mod vad;
/// Binary wire codec for sensor packets.
pub mod wire;

pub use config::{Config, Transport};
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use ring::{PushError, Ring, SLOT_BODY, SLOT_SIZE};
pub use shutdown::Shutdown;
pub use stats::{Stats, StatsSnapshot};
pub use vad::{VadKind, VadResult};
pub use wire::{ParseError, SensorPacket, HEADER_SIZE, MAX_DATAGRAM, MAX_PAYLOAD};
