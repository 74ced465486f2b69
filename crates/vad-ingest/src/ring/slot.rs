// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ring slot with cache-line alignment.
//!
//! Slots are 64-byte aligned so neighbouring slots never share a cache line
//! header-to-payload, which matters when producers and consumers hammer
//! adjacent indices from different cores.
//!
//! # Memory Ordering Strategy
//!
//! The `ready` flag is the only synchronization point for slot contents:
//!
//! - **Release** store of `ready = 1` (producer publish): everything the
//!   producer wrote to `len` and `payload` beforehand is visible to any
//!   thread that Acquire-loads `ready` and sees 1.
//! - **Acquire** load of `ready` (consumer claim check, producer reuse
//!   wait): pairs with the Release stores on both publish and release.
//! - **Release** store of `ready = 0` (consumer release): the consumer's
//!   copy-out is complete; a producer that Acquire-observes 0 may safely
//!   overwrite the payload.
//! - `len` itself is Relaxed; it is ordered by the `ready` edges.
//!
//! A slot's `ready` therefore cycles 0 -> 1 -> 0, and each transition is
//! owned by exactly one thread: the producer that won the `head` CAS for
//! this index, then the consumer that won the `tail` CAS for it.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

/// Total slot footprint in bytes (66 cache lines).
///
/// Sized so a maximal wire packet (32-byte header + 4096-byte payload) fits
/// the body with the 8-byte slot header on top.
pub const SLOT_SIZE: usize = 4224;

/// Usable payload bytes per slot.
pub const SLOT_BODY: usize = SLOT_SIZE - 8;

/// One message slot.
///
/// ```text
/// Offset  Size   Field
/// 0       4      ready (AtomicU32): 0 = free, 1 = written
/// 4       2      len (AtomicU16): valid bytes in data
/// 6       2      _pad
/// 8       4216   data
/// ```
#[repr(C, align(64))]
pub struct RingSlot {
    /// 0 = free/claimable by a producer, 1 = written/claimable by a consumer.
    pub ready: AtomicU32,
    /// Valid prefix of `data`; ordered by `ready`.
    pub len: AtomicU16,
    _pad: u16,
    /// Payload bytes (`UnsafeCell` for interior mutability across threads).
    data: UnsafeCell<[u8; SLOT_BODY]>,
}

// SAFETY: concurrent access to `data` is mediated by the `ready` protocol
// described in the module docs; at any instant at most one thread owns the
// payload (the reserving producer while ready == 0 after its head CAS, the
// claiming consumer while ready == 1 after its tail CAS).
unsafe impl Send for RingSlot {}
unsafe impl Sync for RingSlot {}

impl RingSlot {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ready: AtomicU32::new(0),
            len: AtomicU16::new(0),
            _pad: 0,
            data: UnsafeCell::new([0u8; SLOT_BODY]),
        }
    }

    /// Copy `src` into the slot body and record its length.
    ///
    /// Caller must be the producer that reserved this slot (won the `head`
    /// CAS) and must have observed `ready == 0` with Acquire ordering.
    #[inline]
    pub fn write_payload(&self, src: &[u8]) {
        debug_assert!(src.len() <= SLOT_BODY);
        self.len.store(src.len() as u16, Ordering::Relaxed);
        // SAFETY:
        // - src.len() <= SLOT_BODY is a precondition checked by the ring
        //   before the head CAS (Oversize rejection) and debug-asserted here
        // - exclusive write access holds: this thread won the head CAS for
        //   this index and observed ready == 0, so no consumer holds the
        //   slot and no other producer can reserve the same index until
        //   head wraps a full capacity, which the occupancy bound forbids
        //   while this slot is unconsumed
        // - src is a caller-owned buffer; the regions cannot overlap
        unsafe {
            let dst = (*self.data.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
        }
    }

    /// Copy the slot body out into `dst`, returning the payload length.
    ///
    /// Caller must be the consumer that claimed this slot (won the `tail`
    /// CAS) after observing `ready == 1` with Acquire ordering, and must
    /// keep `ready == 1` until the copy completes.
    #[inline]
    pub fn read_payload(&self, dst: &mut [u8]) -> usize {
        let len = self.len.load(Ordering::Relaxed) as usize;
        debug_assert!(len <= SLOT_BODY && len <= dst.len());
        // SAFETY:
        // - len <= SLOT_BODY because write_payload stored it from a bounded
        //   slice; the Acquire load of ready == 1 made that store visible
        // - exclusive read access holds: this thread won the tail CAS for
        //   this index, and producers spin on ready == 1 before rewriting,
        //   so the payload cannot change until this thread releases the
        //   slot by storing ready = 0
        // - dst is a caller-owned buffer sized >= SLOT_BODY by the ring's
        //   pop contract; the regions cannot overlap
        unsafe {
            let src = (*self.data.get()).as_ptr();
            std::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), len);
        }
        len
    }
}

impl Default for RingSlot {
    fn default() -> Self {
        Self::new()
    }
}
