//! Crate wide constants.

/// Default timeout in milliseconds for in-process exchanges.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Environment variable overriding the in-process exchange timeout.
pub const ENV_TIMEOUT_MS: &str = "BEMPP_GATHER_TIMEOUT_MS";

/// Environment variable overriding the largest encoded chunk per rank.
pub const ENV_MAX_CHUNK_BYTES: &str = "BEMPP_GATHER_MAX_CHUNK_BYTES";

/// Largest byte count a single rank may contribute to a variable size exchange.
pub const MAX_CHUNK_BYTES: usize = i32::MAX as usize;
