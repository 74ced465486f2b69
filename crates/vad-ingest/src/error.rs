// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Startup error type.
//!
//! Per-packet and per-connection failures never surface here; they are
//! counted in [`crate::stats::Stats`] and the pipeline keeps running. Only
//! errors that prevent the pipeline from starting at all (bind, broker
//! connect, ring allocation) are fatal, and the binary maps them to a
//! non-zero exit code.

use std::io;
use thiserror::Error;

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum Error {
    /// Binding the datagram or stream socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The broker connection could not be established at startup.
    #[error("MQTT broker connect failed ({host}:{port}): {reason}")]
    BrokerConnect {
        host: String,
        port: u16,
        reason: String,
    },

    /// The ring's slot array could not be allocated.
    #[error("failed to allocate ring with {capacity} slots")]
    RingAlloc { capacity: usize },

    /// Invalid runtime configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Installing the signal handler failed.
    #[error("failed to install signal handler: {0}")]
    Signal(String),

    /// Other I/O failure during startup.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
