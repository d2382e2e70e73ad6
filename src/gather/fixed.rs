//! Gather of values with a native transport datatype.

use crate::{
    codec::Codec,
    error::Result,
    gather::{Collectives, GatherStrategy},
    group::ProcessGroup,
    types::{FixedLayout, Rank},
};

/// Strategy for fixed-layout values. The transport moves them as they are.
#[derive(Debug, Clone, Copy)]
pub struct Fixed;

impl<T: FixedLayout> GatherStrategy<T> for Fixed {
    const FIXED_LAYOUT: bool = true;

    fn gather_root<G: ProcessGroup, C: Codec>(
        collectives: &Collectives<G, C>,
        local: &[T],
        out: &mut [T],
        root: Rank,
    ) -> Result<()> {
        let group = collectives.group();
        let tag = group.next_tag();

        tracing::debug!(%tag, root, n = local.len(), "fixed layout gather at root");

        group.fixed_size_exchange(tag, local, Some(out), root)?;

        Ok(())
    }

    fn gather_send<G: ProcessGroup, C: Codec>(
        collectives: &Collectives<G, C>,
        local: &[T],
        root: Rank,
    ) -> Result<()> {
        let group = collectives.group();
        let tag = group.next_tag();

        tracing::debug!(%tag, rank = group.rank(), root, n = local.len(), "fixed layout gather");

        group.fixed_size_exchange(tag, local, None, root)?;

        Ok(())
    }
}
