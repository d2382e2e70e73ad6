//! Process group whose ranks are threads of the current process.
//!
//! Contributions are posted to a board shared by all ranks, keyed by
//! collective tag and source rank, and the root collects them from there.
//! Non-root ranks return as soon as their contribution is posted, much like
//! an eager MPI send.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use itertools::Itertools;

use crate::{
    config::GatherConfig,
    error::TransportError,
    group::{ProcessGroup, RecvPartition},
    types::{CollectiveTag, Count, FixedLayout, Rank, TagSequence},
};

enum Contribution {
    Fixed(Box<dyn Any + Send>),
    Bytes(Vec<u8>),
}

type Slots = HashMap<(CollectiveTag, Rank), Contribution>;

#[derive(Default)]
struct Board {
    posted: Mutex<Slots>,
    arrived: Condvar,
}

impl Board {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.posted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post(&self, tag: CollectiveTag, src: Rank, contribution: Contribution) {
        self.lock().insert((tag, src), contribution);
        self.arrived.notify_all();
    }

    /// Remove the contribution of `src`, waiting for it until `deadline`.
    fn take(&self, tag: CollectiveTag, src: Rank, deadline: Instant) -> Option<Contribution> {
        let mut posted = self.lock();
        loop {
            if let Some(contribution) = posted.remove(&(tag, src)) {
                return Some(contribution);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            posted = match self.arrived.wait_timeout(posted, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Drop every contribution still posted under `tag`.
    fn discard(&self, tag: CollectiveTag) {
        self.lock().retain(|&(posted, _), _| posted != tag);
    }
}

/// One rank of an in-process group.
///
/// Clones refer to the same rank and share its tag sequence.
#[derive(Clone)]
pub struct LocalGroup {
    rank: Rank,
    size: Rank,
    board: Arc<Board>,
    tags: Arc<TagSequence>,
    timeout: Duration,
}

impl LocalGroup {
    /// Create the `size` ranks of a new group.
    ///
    /// The root of an exchange waits at most `config.timeout` for the other
    /// ranks to contribute.
    pub fn create(size: Rank, config: &GatherConfig) -> Vec<LocalGroup> {
        assert!(size >= 1, "A group needs at least one rank.");

        let board = Arc::new(Board::default());

        (0..size)
            .map(|rank| LocalGroup {
                rank,
                size,
                board: Arc::clone(&board),
                tags: Arc::default(),
                timeout: config.timeout,
            })
            .collect()
    }

    /// Run `f` on every rank of a new group, each rank on its own thread.
    ///
    /// Returns the results ordered by rank. A panic on any rank is resumed on
    /// the calling thread.
    pub fn run<R, F>(size: Rank, config: &GatherConfig, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(LocalGroup) -> R + Sync,
    {
        let f = &f;
        std::thread::scope(|scope| {
            let handles = Self::create(size, config)
                .into_iter()
                .map(|group| scope.spawn(move || f(group)))
                .collect_vec();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn receive(
        &self,
        operation: &'static str,
        tag: CollectiveTag,
        src: Rank,
        deadline: Instant,
    ) -> Result<Contribution, TransportError> {
        self.board.take(tag, src, deadline).ok_or_else(|| {
            tracing::warn!(%tag, rank = self.rank, peer = src, "{operation} timed out");
            TransportError::Timeout {
                operation,
                tag,
                peer: src,
                timeout_ms: self.timeout.as_millis() as u64,
            }
        })
    }

    fn mismatch(&self, operation: &'static str, tag: CollectiveTag, src: Rank) -> TransportError {
        tracing::warn!(%tag, rank = self.rank, peer = src, "{operation}: datatype mismatch");
        TransportError::DatatypeMismatch {
            operation,
            tag,
            peer: src,
        }
    }

    /// Receive the values of every rank, ordered by rank.
    fn collect_fixed<T: FixedLayout>(
        &self,
        tag: CollectiveTag,
        local: &[T],
        root: Rank,
    ) -> Result<Vec<T>, TransportError> {
        const OPERATION: &str = "fixed size exchange";

        let n = local.len();
        let deadline = Instant::now() + self.timeout;
        let mut gathered = local.repeat(self.size as usize);

        for src in (0..self.size).filter(|&src| src != root) {
            let values = match self.receive(OPERATION, tag, src, deadline)? {
                Contribution::Fixed(values) => values
                    .downcast::<Vec<T>>()
                    .map_err(|_| self.mismatch(OPERATION, tag, src))?,
                Contribution::Bytes(_) => return Err(self.mismatch(OPERATION, tag, src)),
            };

            if values.len() != n {
                return Err(TransportError::CountMismatch {
                    operation: OPERATION,
                    tag,
                    peer: src,
                    expected: as_count(n),
                    actual: as_count(values.len()),
                });
            }

            gathered[src as usize * n..(src as usize + 1) * n].copy_from_slice(&values);
        }

        Ok(gathered)
    }

    /// Copy the stream of every rank into its region of `buffer`.
    fn collect_bytes(
        &self,
        tag: CollectiveTag,
        local: &[u8],
        recv: RecvPartition<'_>,
        root: Rank,
    ) -> Result<(), TransportError> {
        const OPERATION: &str = "variable size exchange";

        let RecvPartition {
            buffer,
            sizes,
            offsets,
        } = recv;

        assert_eq!(sizes.len(), self.size as usize);
        assert_eq!(offsets.len(), self.size as usize);

        let deadline = Instant::now() + self.timeout;

        for (src, (&size, &offset)) in sizes.iter().zip(offsets).enumerate() {
            let src = src as Rank;
            let region = &mut buffer[offset as usize..(offset + size) as usize];

            let received;
            let bytes = if src == root {
                local
            } else {
                received = match self.receive(OPERATION, tag, src, deadline)? {
                    Contribution::Bytes(bytes) => bytes,
                    Contribution::Fixed(_) => return Err(self.mismatch(OPERATION, tag, src)),
                };
                &received[..]
            };

            if bytes.len() != region.len() {
                return Err(TransportError::CountMismatch {
                    operation: OPERATION,
                    tag,
                    peer: src,
                    expected: size,
                    actual: as_count(bytes.len()),
                });
            }

            region.copy_from_slice(bytes);
        }

        Ok(())
    }
}

fn as_count(len: usize) -> Count {
    Count::try_from(len).unwrap_or(Count::MAX)
}

impl ProcessGroup for LocalGroup {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> Rank {
        self.size
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
        let Some(out) = out else {
            self.board.post(tag, self.rank, Contribution::Fixed(Box::new(local.to_vec())));
            return Ok(());
        };

        assert_eq!(self.rank, root, "Only the root receives.");
        assert_eq!(out.len(), local.len() * self.size as usize);

        // `out` is only written once every rank has delivered.
        match self.collect_fixed(tag, local, root) {
            Ok(gathered) => {
                out.copy_from_slice(&gathered);
                Ok(())
            }
            Err(e) => {
                self.board.discard(tag);
                Err(e)
            }
        }
    }

    fn variable_size_exchange(
        &self,
        tag: CollectiveTag,
        local: &[u8],
        recv: Option<RecvPartition<'_>>,
        root: Rank,
    ) -> Result<(), TransportError> {
        let Some(recv) = recv else {
            self.board.post(tag, self.rank, Contribution::Bytes(local.to_vec()));
            return Ok(());
        };

        assert_eq!(self.rank, root, "Only the root receives.");

        self.collect_bytes(tag, local, recv, root).inspect_err(|_| self.board.discard(tag))
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        config::GatherConfig,
        error::TransportError,
        group::{ProcessGroup, RecvPartition},
        tools::displacements,
        types::{CollectiveTag, Count},
    };

    use super::LocalGroup;

    #[test]
    fn test_fixed_size_exchange_orders_by_rank() {
        let root = 2;
        let results = LocalGroup::run(4, &GatherConfig::default(), |group| {
            let rank = group.rank();
            let local = [100 * rank, 100 * rank + 1];

            if rank == root {
                let mut out = vec![0; 8];
                group
                    .fixed_size_exchange(CollectiveTag(0), &local, Some(&mut out[..]), root)
                    .unwrap();
                Some(out)
            } else {
                group
                    .fixed_size_exchange(CollectiveTag(0), &local, None, root)
                    .unwrap();
                None
            }
        });

        assert_eq!(
            results[root as usize].as_deref(),
            Some(&[0, 1, 100, 101, 200, 201, 300, 301][..])
        );
        assert!(results.iter().filter(|r| r.is_some()).count() == 1);
    }

    #[test]
    fn test_variable_size_exchange_places_regions() {
        let sizes: Vec<Count> = vec![1, 0, 3];
        let offsets = displacements(&sizes);

        let results = LocalGroup::run(3, &GatherConfig::default(), |group| {
            let rank = group.rank();
            let local = vec![rank as u8; sizes[rank as usize] as usize];

            if rank == 0 {
                let mut buffer = vec![0_u8; 4];
                let recv = RecvPartition {
                    buffer: &mut buffer,
                    sizes: &sizes,
                    offsets: &offsets,
                };
                group
                    .variable_size_exchange(CollectiveTag(3), &local, Some(recv), 0)
                    .unwrap();
                buffer
            } else {
                group
                    .variable_size_exchange(CollectiveTag(3), &local, None, 0)
                    .unwrap();
                Vec::new()
            }
        });

        assert_eq!(results[0], vec![0, 2, 2, 2]);
    }

    #[test]
    fn test_datatype_mismatch_is_reported() {
        let results = LocalGroup::run(2, &GatherConfig::default(), |group| {
            if group.rank() == 0 {
                let mut out = [0_u32; 2];
                group.fixed_size_exchange(CollectiveTag(0), &[1_u32], Some(&mut out[..]), 0)
            } else {
                group.fixed_size_exchange(CollectiveTag(0), &[1.0_f64], None, 0)
            }
        });

        assert!(matches!(
            results[0],
            Err(TransportError::DatatypeMismatch { peer: 1, .. })
        ));
        assert!(results[1].is_ok());
    }

    #[test]
    fn test_missing_rank_times_out() {
        let config = GatherConfig::default().with_timeout(Duration::from_millis(50));

        let results = LocalGroup::run(3, &config, |group| {
            match group.rank() {
                0 => {
                    let mut out = [0_i32; 3];
                    group.fixed_size_exchange(CollectiveTag(7), &[0], Some(&mut out[..]), 0)
                }
                1 => group.fixed_size_exchange(CollectiveTag(7), &[1], None, 0),
                // Rank 2 never takes part.
                _ => Ok(()),
            }
        });

        assert!(matches!(
            results[0],
            Err(TransportError::Timeout { peer: 2, .. })
        ));
    }

    #[test]
    fn test_fixed_count_mismatch_leaves_output_unchanged() {
        let groups = LocalGroup::create(3, &GatherConfig::default());
        let tag = CollectiveTag(1);

        groups[1].fixed_size_exchange(tag, &[1_i64], None, 0).unwrap();
        groups[2].fixed_size_exchange(tag, &[2_i64, 3], None, 0).unwrap();

        let mut out = [-1_i64; 3];
        let result = groups[0].fixed_size_exchange(tag, &[0], Some(&mut out[..]), 0);

        assert!(matches!(
            result,
            Err(TransportError::CountMismatch {
                peer: 2,
                expected: 1,
                actual: 2,
                ..
            })
        ));
        assert_eq!(out, [-1; 3]);
    }

    #[test]
    fn test_variable_count_mismatch_is_reported() {
        let groups = LocalGroup::create(2, &GatherConfig::default());
        let tag = CollectiveTag(4);
        let sizes: Vec<Count> = vec![1, 2];
        let offsets = displacements(&sizes);

        groups[1]
            .variable_size_exchange(tag, &[7, 7, 7], None, 0)
            .unwrap();

        let mut buffer = vec![0_u8; 3];
        let recv = RecvPartition {
            buffer: &mut buffer,
            sizes: &sizes,
            offsets: &offsets,
        };
        let result = groups[0].variable_size_exchange(tag, &[0], Some(recv), 0);

        assert!(matches!(
            result,
            Err(TransportError::CountMismatch {
                peer: 1,
                expected: 2,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_failed_exchange_discards_posted_contributions() {
        let groups = LocalGroup::create(3, &GatherConfig::default());
        let tag = CollectiveTag(2);

        groups[1].fixed_size_exchange(tag, &[1.0_f64], None, 0).unwrap();
        groups[2].fixed_size_exchange(tag, &[2_u32], None, 0).unwrap();
        groups[2]
            .fixed_size_exchange(CollectiveTag(3), &[5_u32], None, 0)
            .unwrap();

        let mut out = [0_u32; 3];
        let result = groups[0].fixed_size_exchange(tag, &[0_u32], Some(&mut out[..]), 0);

        assert!(matches!(
            result,
            Err(TransportError::DatatypeMismatch { peer: 1, .. })
        ));

        // Only the contribution to the later exchange is left.
        let posted = groups[0].board.lock();
        assert_eq!(posted.len(), 1);
        assert!(posted.contains_key(&(CollectiveTag(3), 2)));
    }
}
