//! Per-reader handle: quiescent-state announcements, park/resume, and
//! unregistration on drop.

use core::fmt;
use core::sync::atomic::{fence, AtomicPtr, AtomicU64, Ordering};

use crate::shard::Shard;

/// Internal per-reader state.
///
/// Heap-allocated so its address stays stable while a shard slot points
/// at it. Only the owning thread mutates it; a grace-period scan reads
/// nothing but `generation` through the slot pointer.
pub(crate) struct ReaderState {
    /// Last generation this reader announced as safely observed.
    pub(crate) generation: AtomicU64,
    /// Back-pointer to the shard slot holding this reader. Fixed at
    /// registration.
    pub(crate) slot: *const AtomicPtr<ReaderState>,
    /// The registry's sentinel, stored into the slot on park and on
    /// unregister.
    pub(crate) park: *const ReaderState,
}

impl ReaderState {
    /// A state not yet wired into any shard. Also the layout of the
    /// registry's sentinel.
    pub(crate) fn detached() -> Self {
        Self {
            generation: AtomicU64::new(0),
            slot: core::ptr::null(),
            park: core::ptr::null(),
        }
    }

    fn as_ptr(&self) -> *mut ReaderState {
        self as *const ReaderState as *mut ReaderState
    }
}

/// A registered reader handle, returned by [`Qsbr::register`].
///
/// The owning thread repeatedly calls [`update`](Reader::update) to
/// announce the generation it has safely moved past. Two usage styles,
/// mirroring the QSBR/EBR distinction:
///
/// - **QSBR**: just call `update` at every quiescent point.
/// - **EBR-flavored**: bracket long gaps with [`park`](Reader::park) /
///   [`resume`](Reader::resume) so a writer's grace period does not stall
///   on a reader that is about to block. A park/resume pair costs more
///   than a bare `update`, but the park can happen much earlier than the
///   next quiescent point.
///
/// Dropping the handle unregisters the reader. The handle may move
/// between threads, but only one thread may use it at a time (it is
/// `Send` and deliberately not `Sync`).
///
/// [`Qsbr::register`]: crate::Qsbr::register
pub struct Reader<'q> {
    state: Box<ReaderState>,
    shard: &'q Shard,
    pos: usize,
}

// SAFETY: ownership of a Reader may move between threads. Other threads
// reach the boxed state only through the shard slot, and read nothing
// but the atomic `generation` word through it.
unsafe impl Send for Reader<'_> {}

impl<'q> Reader<'q> {
    pub(crate) fn new(state: Box<ReaderState>, shard: &'q Shard, pos: usize) -> Self {
        debug_assert!(!state.slot.is_null() && !state.park.is_null());
        Self { state, shard, pos }
    }

    /// True while the slot points back at this reader.
    fn is_active(&self) -> bool {
        // Relaxed: only this thread ever redirects the slot.
        let current = unsafe { (*self.state.slot).load(Ordering::Relaxed) };
        core::ptr::eq(current.cast_const(), &*self.state)
    }

    /// Announce that this reader no longer holds any reference to data
    /// older than `generation`.
    ///
    /// A single relaxed store: the value only has to become eventually
    /// visible to a waiting writer. Ordering the announcement after the
    /// protected-data accesses it covers is the caller's contract.
    ///
    /// Calling this while parked is a programming error, caught by a
    /// debug assertion.
    #[inline]
    pub fn update(&self, generation: u64) {
        debug_assert!(self.is_active(), "update() called on a parked reader");
        self.state.generation.store(generation, Ordering::Relaxed);
    }

    /// Step out of the registry before a long or potentially unbounded
    /// block, so grace periods do not stall on this reader.
    ///
    /// Cheaper than unregistering: one fence and one store, no CAS, no
    /// occupancy traffic. Must be balanced by [`resume`](Reader::resume)
    /// before the next [`update`](Reader::update).
    #[inline]
    pub fn park(&self) {
        debug_assert!(self.is_active(), "park() called twice without resume()");
        fence(Ordering::SeqCst);
        // A parked slot reads as the sentinel; the writer treats it as
        // already satisfied.
        unsafe { (*self.state.slot).store(self.state.park as *mut ReaderState, Ordering::Release) };
    }

    /// Undo [`park`](Reader::park): point the slot back at this reader.
    #[inline]
    pub fn resume(&self) {
        debug_assert!(!self.is_active(), "resume() without a preceding park()");
        unsafe { (*self.state.slot).store(self.state.as_ptr(), Ordering::Release) };
        fence(Ordering::SeqCst);
    }
}

impl Drop for Reader<'_> {
    /// Unregisters the reader.
    ///
    /// Publishes the sentinel into the slot, clears the occupancy bit,
    /// then spins until no grace-period scan is inspecting the shard.
    /// That spin is the only blocking point on the reader side; it is
    /// unbounded if a concurrent `wait` stalls while holding the
    /// inspection flag.
    fn drop(&mut self) {
        // Sentinel first: a scan that revisits this slot must see the
        // sentinel, never a pointer about to dangle.
        unsafe { (*self.state.slot).store(self.state.park as *mut ReaderState, Ordering::Release) };
        self.shard.release(self.pos);
    }
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("generation", &self.state.generation.load(Ordering::Relaxed))
            .field("active", &self.is_active())
            .finish()
    }
}
