// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion transports.
//!
//! Exactly one of the three receivers runs per invocation; all of them feed
//! the shared ring with raw wire bytes through the same
//! [`crate::ring::Ring::try_push`] contract, so the processor pool never
//! knows which transport is active. No dynamic dispatch sits on the hot
//! path; the pipeline selects a concrete receiver at startup.

pub mod mqtt;
pub mod tcp;
pub mod udp;

use crate::ring::{PushError, Ring};
use crate::stats::Stats;

/// Listen backlog for the stream transport.
pub const TCP_BACKLOG: i32 = 128;

/// Socket receive timeout; bounds how long a receiver can miss the
/// shutdown flag.
pub const RECV_TIMEOUT_SECS: u64 = 1;

/// Push raw wire bytes, mapping the outcome onto the stats counters.
///
/// `Full` is back-pressure (a drop); `Oversize` means the bytes could never
/// decode (`payload_len` would exceed the wire maximum), so it counts as a
/// parse error rather than a drop.
#[inline]
pub(crate) fn push_or_count(ring: &Ring, stats: &Stats, data: &[u8]) {
    match ring.try_push(data) {
        Ok(()) => {}
        Err(PushError::Full) => stats.record_drop(),
        Err(PushError::Oversize) => stats.record_parse_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::SLOT_BODY;

    #[test]
    fn test_push_outcome_mapping() {
        let ring = Ring::with_capacity(2).expect("alloc");
        let stats = Stats::new();

        push_or_count(&ring, &stats, &[1, 2, 3]);
        push_or_count(&ring, &stats, &[4, 5, 6]);
        assert_eq!(stats.drops(), 0);

        // Ring is full now.
        push_or_count(&ring, &stats, &[7]);
        assert_eq!(stats.drops(), 1);

        // Oversize counts as a parse error, not a drop.
        let big = vec![0u8; SLOT_BODY + 1];
        push_or_count(&ring, &stats, &big);
        assert_eq!(stats.drops(), 1);
        assert_eq!(stats.parse_errors(), 1);
    }
}
