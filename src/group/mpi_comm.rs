//! Process group backed by an MPI communicator.

use mpi::{
    datatype::PartitionMut,
    traits::{Communicator, Root},
};

use crate::{
    error::TransportError,
    group::{ProcessGroup, RecvPartition},
    types::{CollectiveTag, FixedLayout, Rank, TagSequence},
};

/// Wraps an MPI communicator as a process group.
///
/// The exchanges map onto `MPI_Gather` and `MPI_Gatherv`. MPI orders
/// collectives per communicator, so the collective tag is only used for
/// logging.
/// The default MPI error handler aborts the job on failure, which means the
/// exchanges never return an error.
pub struct MpiGroup<'a, C: Communicator> {
    comm: &'a C,
    tags: TagSequence,
}

impl<'a, C: Communicator> MpiGroup<'a, C> {
    /// Use `comm` as a process group.
    pub fn new(comm: &'a C) -> Self {
        Self {
            comm,
            tags: TagSequence::default(),
        }
    }

    /// The wrapped communicator.
    pub fn communicator(&self) -> &C {
        self.comm
    }
}

impl<C: Communicator> ProcessGroup for MpiGroup<'_, C> {
    fn rank(&self) -> Rank {
        self.comm.rank()
    }

    fn size(&self) -> Rank {
        self.comm.size()
    }

    fn next_tag(&self) -> CollectiveTag {
        self.tags.next_tag()
    }

    fn fixed_size_exchange<T: FixedLayout>(
        &self,
        tag: CollectiveTag,
        local: &[T],
        out: Option<&mut [T]>,
        root: Rank,
    ) -> Result<(), TransportError> {
        let root_process = self.comm.process_at_rank(root);

        tracing::trace!(%tag, root, count = local.len(), "MPI_Gather");

        match out {
            Some(out) => root_process.gather_into_root(local, out),
            None => root_process.gather_into(local),
        }

        Ok(())
    }

    fn variable_size_exchange(
        &self,
        tag: CollectiveTag,
        local: &[u8],
        recv: Option<RecvPartition<'_>>,
        root: Rank,
    ) -> Result<(), TransportError> {
        let root_process = self.comm.process_at_rank(root);

        tracing::trace!(%tag, root, bytes = local.len(), "MPI_Gatherv");

        match recv {
            Some(RecvPartition {
                buffer,
                sizes,
                offsets,
            }) => {
                let mut partition = PartitionMut::new(buffer, sizes, offsets);
                root_process.gather_varcount_into_root(local, &mut partition);
            }
            None => root_process.gather_varcount_into(local),
        }

        Ok(())
    }
}
