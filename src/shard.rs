//! Shard table: occupancy words, inspection flags, and slot arrays.
//!
//! A registry is split into [`SHARD_COUNT`] shards so that concurrent
//! registrations rarely touch the same cache line. Each shard pairs a
//! 64-bit occupancy word (bit `i` set ⇔ slot `i` holds a registered
//! reader) with a fixed array of slot pointers. Readers claim a slot with
//! a CAS on the occupancy word, then publish a pointer to their state
//! into the matching slot.
//!
//! The `inspect` flag is the writer side of the slot-liveness handshake:
//! a grace-period scan raises it while dereferencing this shard's slot
//! pointers, and unregistration spins until it is clear before the slot's
//! backing memory may be reused.

use core::hash::BuildHasher;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use foldhash::fast::FixedState;

use crate::reader::ReaderState;

/// log2 of the shard count.
pub(crate) const SHARD_BITS: u32 = 5;

/// Number of shards in a registry.
pub(crate) const SHARD_COUNT: usize = 1 << SHARD_BITS;

pub(crate) const SHARD_MASK: usize = SHARD_COUNT - 1;

/// Reader slots per shard.
pub(crate) const SLOTS_PER_SHARD: usize = 23;

/// One partition of the reader registry.
pub(crate) struct Shard {
    /// Occupancy word. Bit `i` set ⇔ `slots[i]` belongs to a currently
    /// registered reader.
    pub(crate) occupancy: AtomicU64,
    /// Raised while a grace-period scan dereferences this shard's slot
    /// pointers. Unregistration must observe it clear after publishing
    /// the sentinel, which guarantees no scan still holds a pointer into
    /// the departing reader's state.
    pub(crate) inspect: AtomicBool,
    /// Slot pointers. Never null: a vacant or parked slot points at the
    /// registry's sentinel.
    pub(crate) slots: [AtomicPtr<ReaderState>; SLOTS_PER_SHARD],
}

impl Shard {
    pub(crate) fn new(sentinel: *mut ReaderState) -> Self {
        Self {
            occupancy: AtomicU64::new(0),
            inspect: AtomicBool::new(false),
            slots: core::array::from_fn(|_| AtomicPtr::new(sentinel)),
        }
    }

    /// Claim the lowest free slot via CAS on the occupancy word.
    ///
    /// Returns the claimed index, or `None` if the shard is full. The
    /// retry loop is unbounded but contention is limited to registrations
    /// landing on this shard concurrently.
    pub(crate) fn claim(&self) -> Option<usize> {
        let mut bits = self.occupancy.load(Ordering::Acquire);
        loop {
            let pos = (!bits).trailing_zeros() as usize;
            if pos >= SLOTS_PER_SHARD {
                return None;
            }
            match self.occupancy.compare_exchange_weak(
                bits,
                bits | (1 << pos),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(pos),
                Err(current) => bits = current,
            }
        }
    }

    /// Release slot `pos` and wait out any in-flight inspection.
    ///
    /// The caller must already have stored the sentinel into the slot.
    /// `SeqCst` on the clear and on the flag load keeps them in the same
    /// total order as the scan's flag-raise and occupancy load, so either
    /// the scan sees the bit cleared here, or this call sees the flag
    /// raised and spins until the scan has finished with the shard.
    pub(crate) fn release(&self, pos: usize) {
        debug_assert!(pos < SLOTS_PER_SHARD);
        self.occupancy.fetch_and(!(1u64 << pos), Ordering::SeqCst);
        while self.inspect.load(Ordering::SeqCst) {
            spin_loop();
        }
    }
}

/// Map a reader's identity (its state address) to its home shard.
///
/// Distribution quality only affects contention, never correctness; any
/// fast hash works here.
pub(crate) fn home_shard(state: *const ReaderState) -> usize {
    FixedState::default().hash_one(state as usize) as usize & SHARD_MASK
}
