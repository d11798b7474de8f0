//! Quiesce: sharded quiescent-state-based reclamation (QSBR) for
//! lock-free data structures.
//!
//! Readers access shared, versioned data without locks and periodically
//! announce the generation they have safely moved past. A writer that
//! has published a new generation waits out a *grace period*: the
//! interval until every reader active at its start has caught up or
//! parked. After that, the old generation can be freed with no risk of
//! use-after-free.
//!
//! # Key properties
//!
//! - **Cheap announcements**: a quiescent-state update is one relaxed
//!   atomic store.
//! - **Lock-free registration**: readers claim a slot in a sharded
//!   bitmap with a CAS; no mutexes anywhere.
//! - **Park/resume fast path**: a reader about to block for a long time
//!   steps out with a single store so writers never stall on it.
//! - **Caller-owned policy**: the registry tracks readers; what to
//!   reclaim and when to advance the generation counter stays with you.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use quiesce::Qsbr;
//!
//! let qsbr = Qsbr::new();
//! let version = AtomicU64::new(0);
//!
//! // Reader: register once, announce after each pass over the data.
//! let reader = qsbr.register().unwrap();
//! let v = version.load(Ordering::Acquire);
//! // ... access data tagged with generation `v` ...
//! reader.update(v);
//!
//! // Writer: publish a new generation, then wait out the grace period
//! // before freeing anything tagged with the old one.
//! let target = version.fetch_add(1, Ordering::AcqRel) + 1;
//! reader.update(target); // readers keep announcing as they go
//! qsbr.wait(target);
//! // ... reclaim generation `target - 1` ...
//! ```

#![warn(missing_docs)]

mod error;
mod reader;
mod registry;
mod shard;

pub use error::Exhausted;
pub use reader::Reader;
pub use registry::Qsbr;
