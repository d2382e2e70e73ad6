//! Utility routines.

use num::traits::Zero;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Compute displacements from a vector of counts.
///
/// This is what a varcount gather needs to place each rank's contribution.
/// For the counts `[3, 4, 5]` the displacements are `[0, 3, 7]`. Note that
/// the last element `5` is ignored.
pub fn displacements<T: Zero + Copy>(counts: &[T]) -> Vec<T> {
    counts
        .iter()
        .scan(T::zero(), |acc, &x| {
            let tmp = *acc;
            *acc = *acc + x;
            Some(tmp)
        })
        .collect()
}

/// Sum of all counts, the length of the concatenated buffer.
pub fn total_count<T: Zero + Copy>(counts: &[T]) -> T {
    counts.iter().fold(T::zero(), |acc, &x| acc + x)
}

/// Get a seeded rng
pub fn seeded_rng(seed: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed as u64)
}
