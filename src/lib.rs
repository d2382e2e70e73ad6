//! Rank ordered gather of fixed-layout and serializable values
#![cfg_attr(feature = "strict", deny(warnings), deny(unused_crate_dependencies))]
#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod gather;
pub mod group;
pub mod tools;
pub mod types;

pub use codec::{BincodeCodec, Codec};
pub use config::GatherConfig;
pub use error::{GatherError, Result, TransportError};
pub use gather::{gather_to_root, Collectives, Gatherable};
pub use group::{LocalGroup, MpiGroup, ProcessGroup};
