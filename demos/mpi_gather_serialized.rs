//! Gather values without a fixed layout to a root rank.
//!
//! ```bash
//! mpirun -n 4 cargo run --example mpi_gather_serialized
//! ```

use std::collections::BTreeMap;

use bempp_gather::{gatherable, tools::seeded_rng, Collectives, GatherConfig, MpiGroup};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A rank's summary, of different encoded length on every rank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Report {
    host: String,
    histogram: BTreeMap<u32, u32>,
}

gatherable!(serialized: Report);

fn report(rank: i32) -> Report {
    let mut rng = seeded_rng(rank as usize);
    let mut histogram = BTreeMap::new();

    for _ in 0..(10 * (rank + 1)) {
        *histogram.entry(rng.gen_range(0..8)).or_insert(0) += 1;
    }

    Report {
        host: format!("node-{rank}"),
        histogram,
    }
}

pub fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let universe = mpi::initialize().unwrap();
    let comm = universe.world();

    let collectives = Collectives::with_codec(
        MpiGroup::new(&comm),
        bempp_gather::BincodeCodec,
        GatherConfig::from_env(),
    );

    let rank = collectives.rank();
    let root = 0;

    let local = [report(rank), report(rank + 100)];

    if rank == root {
        let mut gathered = Vec::new();
        collectives
            .gather_slice_to_vec(&local, &mut gathered, root)
            .unwrap();

        for (other, chunk) in gathered.chunks(2).enumerate() {
            let other = other as i32;
            assert_eq!(chunk, &[report(other), report(other + 100)]);
        }

        println!("Gathered {} reports.", gathered.len());
    } else {
        collectives.gather_slice_into(&local, root).unwrap();
    }
}
