//! Rank ordered gather to a root process.
//!
//! Every rank of a group contributes `n` values and the root receives all
//! `size * n` values, the values of rank `k` at positions `k * n..(k + 1) * n`.
//!
//! How values travel depends on the type. Types with a fixed binary layout
//! (an MPI datatype) are handed to the transport directly. All other types
//! are encoded into a byte stream, exchanged with a varcount gather and
//! decoded on the root. The choice is made once per type through
//! [`Gatherable::Strategy`].

mod fixed;
mod serialized;

pub use fixed::Fixed;
pub use serialized::Serialized;

use std::collections::BTreeMap;

use crate::{
    codec::{BincodeCodec, Codec},
    config::GatherConfig,
    error::Result,
    group::ProcessGroup,
    types::Rank,
};

/// How values of a type are moved to the root.
pub trait GatherStrategy<T: Clone> {
    /// Whether values are sent in their in-memory layout.
    const FIXED_LAYOUT: bool;

    /// Root side: gather `local.len()` values per rank into `out`.
    ///
    /// On error `out` is left unchanged.
    fn gather_root<G: ProcessGroup, C: Codec>(
        collectives: &Collectives<G, C>,
        local: &[T],
        out: &mut [T],
        root: Rank,
    ) -> Result<()>;

    /// Non-root side: send `local` to `root`.
    fn gather_send<G: ProcessGroup, C: Codec>(
        collectives: &Collectives<G, C>,
        local: &[T],
        root: Rank,
    ) -> Result<()>;

    /// Root side: replace the contents of `out` by the gathered values.
    ///
    /// On error `out` is left unchanged.
    fn gather_root_vec<G: ProcessGroup, C: Codec>(
        collectives: &Collectives<G, C>,
        local: &[T],
        out: &mut Vec<T>,
        root: Rank,
    ) -> Result<()> {
        let mut gathered = Vec::new();
        if let Some(first) = local.first() {
            gathered.resize(collectives.size() as usize * local.len(), first.clone());
        }
        Self::gather_root(collectives, local, &mut gathered, root)?;

        *out = gathered;
        Ok(())
    }
}

/// Types that can be gathered.
///
/// Use the [`gatherable!`](crate::gatherable) macro to implement it.
pub trait Gatherable: Clone {
    /// Either [`Fixed`] or [`Serialized`].
    type Strategy: GatherStrategy<Self>;
}

/// Implement [`Gatherable`] for a list of types.
///
/// `fixed:` types must implement `mpi::traits::Equivalence` and `Copy`,
/// `serialized:` types must implement `serde::Serialize` and
/// `serde::de::DeserializeOwned`.
///
/// ```ignore
/// gatherable!(fixed: Point);
/// gatherable!(serialized: Mesh, Label);
/// ```
#[macro_export]
macro_rules! gatherable {
    (fixed: $($t:ty),+ $(,)?) => {
        $(
            impl $crate::gather::Gatherable for $t {
                type Strategy = $crate::gather::Fixed;
            }
        )+
    };
    (serialized: $($t:ty),+ $(,)?) => {
        $(
            impl $crate::gather::Gatherable for $t {
                type Strategy = $crate::gather::Serialized;
            }
        )+
    };
}

gatherable!(fixed: u8, u16, u32, u64, usize, i8, i16, i32, i64, f32, f64, bool);
gatherable!(serialized: String);

impl<T: serde::Serialize + serde::de::DeserializeOwned + Clone> Gatherable for Vec<T> {
    type Strategy = Serialized;
}

impl<T: serde::Serialize + serde::de::DeserializeOwned + Clone> Gatherable for Option<T> {
    type Strategy = Serialized;
}

impl<K, V> Gatherable for BTreeMap<K, V>
where
    K: serde::Serialize + serde::de::DeserializeOwned + Clone + Ord,
    V: serde::Serialize + serde::de::DeserializeOwned + Clone,
{
    type Strategy = Serialized;
}

/// Gather entry point for a process group.
///
/// Owns the group and the codec used for types without a fixed layout. All
/// ranks must issue the same gathers in the same order.
///
/// Only [`GatherConfig::max_chunk_bytes`] of the configuration applies here.
/// Timeouts belong to the group, see [`LocalGroup::create`](crate::group::LocalGroup::create).
pub struct Collectives<G, C = BincodeCodec> {
    group: G,
    codec: C,
    config: GatherConfig,
}

impl<G: ProcessGroup> Collectives<G> {
    /// Gather over `group` with the default codec and configuration.
    pub fn new(group: G) -> Self {
        Self::with_codec(group, BincodeCodec, GatherConfig::default())
    }
}

impl<G: ProcessGroup, C: Codec> Collectives<G, C> {
    /// Gather over `group` with a custom codec and configuration.
    pub fn with_codec(group: G, codec: C, config: GatherConfig) -> Self {
        Self {
            group,
            codec,
            config,
        }
    }

    /// The process group.
    pub fn group(&self) -> &G {
        &self.group
    }

    /// The codec.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The configuration.
    pub fn config(&self) -> &GatherConfig {
        &self.config
    }

    /// Rank of the calling process.
    pub fn rank(&self) -> Rank {
        self.group.rank()
    }

    /// Number of processes in the group.
    pub fn size(&self) -> Rank {
        self.group.size()
    }

    fn check_root(&self, root: Rank) {
        let size = self.size();
        assert!(
            (0..size).contains(&root),
            "Root {root} is not a rank of a group of size {size}."
        );
    }

    /// Gather one value per rank into `out` on the root.
    ///
    /// `out` must hold `size()` values. Must be called on the root.
    pub fn gather_into_root<T: Gatherable>(
        &self,
        value: &T,
        out: &mut [T],
        root: Rank,
    ) -> Result<()> {
        self.gather_slice_into_root(std::slice::from_ref(value), out, root)
    }

    /// Send one value to the root. Must not be called on the root.
    pub fn gather_into<T: Gatherable>(&self, value: &T, root: Rank) -> Result<()> {
        self.gather_slice_into(std::slice::from_ref(value), root)
    }

    /// Gather one value per rank.
    ///
    /// On the root `out` is resized to `size()` and filled. On all other
    /// ranks `out` is left untouched.
    pub fn gather_to_vec<T: Gatherable>(
        &self,
        value: &T,
        out: &mut Vec<T>,
        root: Rank,
    ) -> Result<()> {
        self.gather_slice_to_vec(std::slice::from_ref(value), out, root)
    }

    /// Gather `values.len()` values per rank into `out` on the root.
    ///
    /// `out` must hold `size() * values.len()` values. Must be called on the root.
    pub fn gather_slice_into_root<T: Gatherable>(
        &self,
        values: &[T],
        out: &mut [T],
        root: Rank,
    ) -> Result<()> {
        self.check_root(root);
        assert_eq!(
            self.rank(),
            root,
            "Only the root can receive a gather. Use `gather_slice_into` on other ranks."
        );
        assert_eq!(
            out.len(),
            self.size() as usize * values.len(),
            "The output buffer must hold the values of all ranks."
        );

        T::Strategy::gather_root(self, values, out, root)
    }

    /// Send `values` to the root. Must not be called on the root.
    pub fn gather_slice_into<T: Gatherable>(&self, values: &[T], root: Rank) -> Result<()> {
        self.check_root(root);
        assert_ne!(
            self.rank(),
            root,
            "The root must provide an output buffer to a gather."
        );

        T::Strategy::gather_send(self, values, root)
    }

    /// Gather `values.len()` values per rank.
    ///
    /// The output is required on the root and ignored on all other ranks.
    pub fn gather_slice<T: Gatherable>(
        &self,
        values: &[T],
        out: Option<&mut [T]>,
        root: Rank,
    ) -> Result<()> {
        if self.rank() != root {
            return self.gather_slice_into(values, root);
        }

        match out {
            Some(out) => self.gather_slice_into_root(values, out, root),
            None => panic!("The root must provide an output buffer to a gather."),
        }
    }

    /// Gather `values.len()` values per rank.
    ///
    /// On the root `out` is resized to `size() * values.len()` and filled. On
    /// all other ranks `out` is left untouched.
    pub fn gather_slice_to_vec<T: Gatherable>(
        &self,
        values: &[T],
        out: &mut Vec<T>,
        root: Rank,
    ) -> Result<()> {
        self.check_root(root);

        if self.rank() == root {
            T::Strategy::gather_root_vec(self, values, out, root)
        } else {
            T::Strategy::gather_send(self, values, root)
        }
    }

    /// Gather `values` to the root.
    ///
    /// The result is `Some` on the root and `None` on all other ranks.
    pub fn gather_to_root<T: Gatherable>(
        &self,
        values: &[T],
        root: Rank,
    ) -> Result<Option<Vec<T>>> {
        let mut out = Vec::new();
        self.gather_slice_to_vec(values, &mut out, root)?;

        Ok((self.rank() == root).then_some(out))
    }
}

/// Gather `values` from every rank of `group` to `root` with the default codec.
pub fn gather_to_root<T: Gatherable, G: ProcessGroup>(
    values: &[T],
    group: &G,
    root: Rank,
) -> Result<Option<Vec<T>>> {
    Collectives::new(group).gather_to_root(values, root)
}
