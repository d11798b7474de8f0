//! The QSBR registry: reader registration and the grace-period wait.

use core::sync::atomic::{fence, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::error::Exhausted;
use crate::reader::{Reader, ReaderState};
use crate::shard::{home_shard, Shard, SHARD_COUNT, SHARD_MASK, SLOTS_PER_SHARD};

/// A sharded quiescent-state registry.
///
/// Readers [`register`](Qsbr::register) once and then announce their
/// progress through the returned [`Reader`] handle. A writer that has
/// published a new generation of some protected structure calls
/// [`wait`](Qsbr::wait) with that generation; when it returns, every
/// reader that was registered when the call began has either announced
/// the target generation (or a later one) or parked, and the previous
/// generation's data can be reclaimed.
///
/// The registry tracks readers, nothing else: what to reclaim, and when
/// to advance the generation counter, is entirely the caller's policy.
///
/// Reader handles borrow the registry, so the borrow checker enforces
/// that a registry cannot be dropped while any reader is still
/// registered.
pub struct Qsbr {
    shards: Box<[CachePadded<Shard>]>,
    /// Park target shared by every reader. Before each scan the writer
    /// stores the target generation here, so a slot pointing at the
    /// sentinel (parked, vacated, or mid-registration) reads as already
    /// satisfied.
    sentinel: Box<ReaderState>,
}

// SAFETY: the sentinel's raw back-pointers stay null; all cross-thread
// state in the shard table is accessed through atomics.
unsafe impl Send for Qsbr {}
unsafe impl Sync for Qsbr {}

impl Qsbr {
    /// Create an empty registry.
    pub fn new() -> Self {
        let sentinel = Box::new(ReaderState::detached());
        let sentinel_ptr = &*sentinel as *const ReaderState as *mut ReaderState;
        let shards = (0..SHARD_COUNT)
            .map(|_| CachePadded::new(Shard::new(sentinel_ptr)))
            .collect();
        Self { shards, sentinel }
    }

    /// Total reader capacity: shards × slots per shard.
    pub fn capacity(&self) -> usize {
        SHARD_COUNT * SLOTS_PER_SHARD
    }

    /// Number of currently registered readers.
    pub fn active(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.occupancy.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    /// Register the calling thread as a reader.
    ///
    /// The reader starts at generation 0. Its home shard is chosen by
    /// hashing the handle's address; if that shard is full the remaining
    /// shards are probed in order, so registration fails with
    /// [`Exhausted`] only once the whole registry is at
    /// [`capacity`](Qsbr::capacity).
    pub fn register(&self) -> Result<Reader<'_>, Exhausted> {
        let mut state = Box::new(ReaderState::detached());
        let home = home_shard(&*state);
        for step in 0..SHARD_COUNT {
            let shard = &*self.shards[(home + step) & SHARD_MASK];
            let Some(pos) = shard.claim() else { continue };
            // Wire the back-pointers before the state becomes reachable
            // through the slot; after the store below, other threads may
            // read its generation word at any time.
            state.slot = &shard.slots[pos];
            state.park = &*self.sentinel;
            let state_ptr = &mut *state as *mut ReaderState;
            shard.slots[pos].store(state_ptr, Ordering::Release);
            return Ok(Reader::new(state, shard, pos));
        }
        Err(Exhausted)
    }

    /// Block until every reader registered when this call began has
    /// announced a generation `>= target` or parked.
    ///
    /// Readers that register after the call begins are not waited for:
    /// they cannot hold references to data older than the generation the
    /// caller already published.
    ///
    /// Callers must serialize: at most one `wait` may be in flight per
    /// registry at a time (a single writer thread, or an external
    /// mutex). The wait spins without timeout; bounding it is a policy
    /// for the caller to layer on top.
    pub fn wait(&self, target: u64) {
        fence(Ordering::SeqCst);
        self.sentinel.generation.store(target, Ordering::Relaxed);

        // Unsynchronized snapshot of who is registered right now.
        let mut pending = [0u64; SHARD_COUNT];
        let mut remaining: u64 = 0; // bit i set ⇔ shard i still has pending readers
        for (i, shard) in self.shards.iter().enumerate() {
            pending[i] = shard.occupancy.load(Ordering::Acquire);
            if pending[i] != 0 {
                remaining |= 1 << i;
            }
        }

        let backoff = Backoff::new();
        while remaining != 0 {
            let mut scan = remaining;
            while scan != 0 {
                let i = scan.trailing_zeros() as usize;
                scan &= scan - 1;
                let shard = &*self.shards[i];

                // Freeze unregistration's final step for this shard
                // while slot pointers are dereferenced below.
                shard.inspect.swap(true, Ordering::SeqCst);
                let occupied = shard.occupancy.load(Ordering::SeqCst);

                let mut bits = pending[i];
                while bits != 0 {
                    let bit = bits & bits.wrapping_neg();
                    bits &= bits - 1;
                    let pos = bit.trailing_zeros() as usize;
                    // Satisfied if the slot was vacated since the
                    // snapshot, or if the pointed-to state has reached
                    // the target. A parked slot points at the sentinel
                    // and therefore reads `target` exactly.
                    let done = (occupied & bit) == 0 || {
                        let state = shard.slots[pos].load(Ordering::Acquire);
                        // SAFETY: the bit is set in `occupied`, which was
                        // loaded after raising the inspection flag, so
                        // the owning reader cannot complete
                        // unregistration (and free this state) until the
                        // flag drops below.
                        let announced =
                            unsafe { (*state).generation.load(Ordering::Acquire) };
                        announced >= target
                    };
                    if done {
                        pending[i] &= !bit;
                    }
                }

                shard.inspect.store(false, Ordering::Release);
                if pending[i] == 0 {
                    remaining &= !(1 << i);
                }
            }
            if remaining != 0 {
                backoff.snooze();
            }
        }
        fence(Ordering::SeqCst);
    }
}

impl Default for Qsbr {
    fn default() -> Self {
        Self::new()
    }
}
