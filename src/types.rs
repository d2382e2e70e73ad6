//! Shared types for the gather primitive.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use mpi::traits::Equivalence;

/// Rank of a process within a group.
pub type Rank = i32;

/// Element and byte counts as exchanged with the transport.
pub type Count = i32;

/// Values that can be handed to the transport without explicit encoding.
///
/// Every type with an MPI datatype that is `Copy` qualifies. This is the
/// fixed-layout capability of a type.
pub trait FixedLayout: Equivalence + Copy + Send + 'static {}

impl<T: Equivalence + Copy + Send + 'static> FixedLayout for T {}

/// Identifier of a single transport exchange.
///
/// All ranks draw tags in the same order, so matching exchanges carry
/// matching tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectiveTag(pub u64);

impl Display for CollectiveTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonically increasing source of collective tags for one group.
#[derive(Debug, Default)]
pub struct TagSequence {
    next: AtomicU64,
}

impl TagSequence {
    /// Create a new sequence starting at `start`.
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Draw the next tag.
    pub fn next_tag(&self) -> CollectiveTag {
        CollectiveTag(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
