//! Process groups and the exchanges a gather needs from them.
//!
//! A group offers two all-to-one exchanges. The fixed size exchange moves
//! values with a native datatype, every rank contributing the same count. The
//! variable size exchange moves raw bytes, every rank contributing its own
//! length and the root placing each contribution at a given offset.

pub mod local;
pub mod mpi_comm;

pub use local::LocalGroup;
pub use mpi_comm::MpiGroup;

use crate::{
    error::TransportError,
    types::{CollectiveTag, Count, FixedLayout, Rank},
};

/// Receive side of a variable size exchange, only present on the root.
///
/// The contribution of rank `k` lands in
/// `buffer[offsets[k]..offsets[k] + sizes[k]]`.
#[derive(Debug)]
pub struct RecvPartition<'a> {
    /// Buffer holding all contributions back to back.
    pub buffer: &'a mut [u8],
    /// Byte length contributed by each rank.
    pub sizes: &'a [Count],
    /// Start of each rank's region in `buffer`.
    pub offsets: &'a [Count],
}

/// A fixed set of cooperating processes.
///
/// Both exchanges are collective. Every rank of the group must call them in
/// the same order with the same root. The output arguments are `Some` on the
/// root and `None` everywhere else.
pub trait ProcessGroup {
    /// Rank of the calling process.
    fn rank(&self) -> Rank;

    /// Number of processes in the group.
    fn size(&self) -> Rank;

    /// Draw the tag of the next exchange on this rank.
    ///
    /// Tags increase monotonically, so the n-th exchange carries the same
    /// tag on every rank.
    fn next_tag(&self) -> CollectiveTag;

    /// Gather `local.len()` values from every rank into `out` on `root`.
    ///
    /// The values of rank `k` land in `out[k * n..(k + 1) * n]` with
    /// `n = local.len()`. `out` must hold `size() * n` values.
    fn fixed_size_exchange<T: FixedLayout>(
        &self,
        tag: CollectiveTag,
        local: &[T],
        out: Option<&mut [T]>,
        root: Rank,
    ) -> Result<(), TransportError>;

    /// Gather a byte buffer of rank specific length from every rank on `root`.
    fn variable_size_exchange(
        &self,
        tag: CollectiveTag,
        local: &[u8],
        recv: Option<RecvPartition<'_>>,
        root: Rank,
    ) -> Result<(), TransportError>;
}

impl<G: ProcessGroup> ProcessGroup for &G {
    fn rank(&self) -> Rank {
        (**self).rank()
    }

    fn size(&self) -> Rank {
        (**self).size()
    }

    fn next_tag(&self) -> CollectiveTag {
        (**self).next_tag()
    }

    fn fixed_size_exchange<T: FixedLayout>(
        &self,
        tag: CollectiveTag,
        local: &[T],
        out: Option<&mut [T]>,
        root: Rank,
    ) -> Result<(), TransportError> {
        (**self).fixed_size_exchange(tag, local, out, root)
    }

    fn variable_size_exchange(
        &self,
        tag: CollectiveTag,
        local: &[u8],
        recv: Option<RecvPartition<'_>>,
        root: Rank,
    ) -> Result<(), TransportError> {
        (**self).variable_size_exchange(tag, local, recv, root)
    }
}
