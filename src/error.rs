//! Error types.

use core::fmt;

/// Registration failed because every slot in the registry is occupied.
///
/// This is the only recoverable error in the crate: the registration
/// simply did not happen, and the caller may retry after another reader
/// unregisters. Total capacity is fixed at registry creation
/// ([`Qsbr::capacity`](crate::Qsbr::capacity)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted;

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("reader registry is at capacity")
    }
}

impl std::error::Error for Exhausted {}
