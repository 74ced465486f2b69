// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded lock-free MPMC ring of fixed-size byte slots.
//!
//! The ring decouples receiver threads (producers) from processor threads
//! (consumers). Both sides are non-blocking: a full ring rejects the push
//! (the caller records a drop), an empty ring rejects the pop (the caller
//! backs off).
//!
//! # Protocol
//!
//! Producer `try_push`:
//! 1. Reject payloads larger than [`SLOT_BODY`] (`Oversize`).
//! 2. Load `head` (Relaxed) and `tail` (Relaxed); if `head - tail >=
//!    capacity`, return `Full`.
//! 3. CAS `head -> head + 1` (AcqRel); on failure go to 2.
//! 4. Wait for the slot's `ready` flag to drop to 0 (Acquire): a consumer
//!    that claimed the previous lap of this index may still be copying out.
//! 5. Write `len` + payload, then Release-store `ready = 1`.
//!
//! Consumer `try_pop`:
//! 1. Load `tail` (Relaxed) and `head` (Acquire); if `tail >= head`,
//!    return empty.
//! 2. Acquire-load the slot's `ready`; if 0 the reserving producer has not
//!    published yet, so return empty rather than spin (back-off is the
//!    caller's policy).
//! 3. CAS `tail -> tail + 1` (AcqRel); on failure go to 1.
//! 4. Copy the payload out, then Release-store `ready = 0`.
//!
//! # Why the per-slot flag
//!
//! Multiple producers own disjoint indices between `tail` and `head`
//! simultaneously. A consumer that only compared `tail < head` could land
//! on a slot whose producer won the `head` CAS but has not finished the
//! payload copy. The `ready` flag separates "reserved" from "published"
//! without any global lock. Symmetrically, step 4 of push keeps a wrapping
//! producer from overwriting a slot a slower consumer is still copying out:
//! the consumer holds `ready = 1` until its copy completes, so the ring
//! never overwrites live data.
//!
//! Occupancy (`head - tail`) never exceeds capacity, so at most one
//! producer can hold a given index per lap, and the slot's `ready` cycles
//! strictly 0 -> 1 -> 0.

mod slot;

pub use slot::{RingSlot, SLOT_BODY, SLOT_SIZE};

use std::sync::atomic::{AtomicU64, Ordering};

/// Push rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Occupancy equals capacity; the caller should record a drop.
    Full,
    /// Payload exceeds [`SLOT_BODY`] and can never be enqueued.
    Oversize,
}

/// A popped message, used by [`Ring::pop_batch`].
pub struct RingMsg {
    pub len: u16,
    pub data: [u8; SLOT_BODY],
}

impl Default for RingMsg {
    fn default() -> Self {
        Self {
            len: 0,
            data: [0u8; SLOT_BODY],
        }
    }
}

impl RingMsg {
    /// The valid portion of the message buffer.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

/// `head` and `tail` each get their own cache line; producers and consumers
/// would otherwise false-share a single line and serialize on it.
#[repr(align(64))]
struct PaddedCounter(AtomicU64);

/// Bounded MPMC ring. See module docs for the protocol.
pub struct Ring {
    /// Reservation counter, bumped by producers.
    head: PaddedCounter,
    /// Claim counter, bumped by consumers.
    tail: PaddedCounter,
    mask: u64,
    capacity: u64,
    slots: Box<[RingSlot]>,
}

impl Ring {
    /// Allocate a ring with at least `capacity` slots, rounded up to the
    /// next power of two.
    ///
    /// Returns `None` if the slot array cannot be allocated; the caller
    /// treats that as a fatal startup error.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        let cap = capacity.max(2).next_power_of_two();

        let mut slots = Vec::new();
        slots.try_reserve_exact(cap).ok()?;
        slots.resize_with(cap, RingSlot::new);

        Some(Self {
            head: PaddedCounter(AtomicU64::new(0)),
            tail: PaddedCounter(AtomicU64::new(0)),
            mask: cap as u64 - 1,
            capacity: cap as u64,
            slots: slots.into_boxed_slice(),
        })
    }

    /// Slot count (power of two).
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Current occupancy (`head - tail`). Advisory under concurrency.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        let h = self.head.0.load(Ordering::Acquire);
        let t = self.tail.0.load(Ordering::Acquire);
        h.saturating_sub(t) as usize
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue `data` without blocking.
    ///
    /// # Errors
    ///
    /// `Full` when occupancy equals capacity (nothing is mutated),
    /// `Oversize` when `data` cannot fit a slot body.
    pub fn try_push(&self, data: &[u8]) -> Result<(), PushError> {
        if data.len() > SLOT_BODY {
            return Err(PushError::Oversize);
        }

        let h = loop {
            let h = self.head.0.load(Ordering::Relaxed);
            let t = self.tail.0.load(Ordering::Relaxed);
            if h.wrapping_sub(t) >= self.capacity {
                return Err(PushError::Full);
            }
            match self.head.0.compare_exchange_weak(
                h,
                h + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break h,
                Err(_) => continue,
            }
        };

        let slot = &self.slots[(h & self.mask) as usize];

        // The consumer that claimed this index last lap releases ready only
        // after its copy-out; wait for it. Bounded by one memcpy.
        while slot.ready.load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
        }

        slot.write_payload(data);
        slot.ready.store(1, Ordering::Release);
        Ok(())
    }

    /// Dequeue one message into `out` without blocking.
    ///
    /// `out` must be at least [`SLOT_BODY`] bytes. Returns the payload
    /// length, or `None` when the ring is empty (or the next slot is
    /// reserved but not yet published; both mean "back off and retry").
    pub fn try_pop(&self, out: &mut [u8]) -> Option<usize> {
        debug_assert!(out.len() >= SLOT_BODY);

        loop {
            let t = self.tail.0.load(Ordering::Relaxed);
            let h = self.head.0.load(Ordering::Acquire);
            if t >= h {
                return None;
            }

            let slot = &self.slots[(t & self.mask) as usize];
            if slot.ready.load(Ordering::Acquire) == 0 {
                // Reserved but not yet written by a slower producer.
                return None;
            }

            match self.tail.0.compare_exchange_weak(
                t,
                t + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let len = slot.read_payload(out);
                    slot.ready.store(0, Ordering::Release);
                    return Some(len);
                }
                // Another consumer claimed this slot first; retry from the
                // new tail.
                Err(_) => continue,
            }
        }
    }

    /// Pop up to `out.len()` messages, stopping early when the ring drains.
    ///
    /// Not atomic across slots (other consumers may interleave), but each
    /// slot is still claimed by exactly one consumer. Returns the number of
    /// messages written into `out`.
    pub fn pop_batch(&self, out: &mut [RingMsg]) -> usize {
        let mut n = 0;
        for msg in out.iter_mut() {
            match self.try_pop(&mut msg.data) {
                Some(len) => {
                    msg.len = len as u16;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }
}
