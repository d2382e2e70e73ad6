//! Gather fixed-layout values to a root rank.
//!
//! ```bash
//! mpirun -n 4 cargo run --example mpi_gather
//! ```

use bempp_gather::{gatherable, tools::seeded_rng, Collectives, MpiGroup, ProcessGroup};
use mpi::traits::Equivalence;
use rand::Rng;

#[derive(Copy, Clone, Debug, PartialEq, Equivalence)]
struct Sample {
    rank: i32,
    index: u32,
    value: f64,
}

gatherable!(fixed: Sample);

fn samples(rank: i32, nsamples: usize) -> Vec<Sample> {
    let mut rng = seeded_rng(rank as usize);

    (0..nsamples)
        .map(|index| Sample {
            rank,
            index: index as u32,
            value: rng.gen(),
        })
        .collect()
}

pub fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Initialise MPI
    let universe = mpi::initialize().unwrap();

    // Get the world communicator
    let comm = universe.world();
    let group = MpiGroup::new(&comm);

    let rank = group.rank();
    let size = group.size();
    let root = size - 1;

    let collectives = Collectives::new(group);

    // One value per rank.

    let mut ranks = Vec::new();
    collectives.gather_to_vec(&rank, &mut ranks, root).unwrap();

    // A chunk of samples per rank.

    let nsamples = 5;
    let local = samples(rank, nsamples);

    if let Some(gathered) = collectives.gather_to_root(&local, root).unwrap() {
        assert_eq!(ranks, (0..size).collect::<Vec<_>>());
        assert_eq!(gathered.len(), size as usize * nsamples);

        for (other, chunk) in gathered.chunks(nsamples).enumerate() {
            assert_eq!(chunk, samples(other as i32, nsamples).as_slice());
        }

        println!("Gathered {} samples from {} ranks.", gathered.len(), size);
    }
}
