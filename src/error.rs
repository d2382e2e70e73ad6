//! Error types.

use crate::types::{CollectiveTag, Count, Rank};

/// Result type of all gather operations.
pub type Result<T> = std::result::Result<T, GatherError>;

/// Failure reported by a process group transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Waiting for a peer exceeded the configured timeout.
    #[error("{operation} {tag} timed out after {timeout_ms}ms waiting for rank {peer}")]
    Timeout {
        /// Name of the exchange.
        operation: &'static str,
        /// Tag of the exchange.
        tag: CollectiveTag,
        /// Rank that did not deliver.
        peer: Rank,
        /// The timeout that expired.
        timeout_ms: u64,
    },

    /// A peer contributed values of a different type.
    #[error("{operation} {tag}: rank {peer} sent a different datatype")]
    DatatypeMismatch {
        /// Name of the exchange.
        operation: &'static str,
        /// Tag of the exchange.
        tag: CollectiveTag,
        /// Rank that sent the mismatching values.
        peer: Rank,
    },

    /// A peer contributed a different number of elements than expected.
    #[error("{operation} {tag}: rank {peer} sent {actual} elements, expected {expected}")]
    CountMismatch {
        /// Name of the exchange.
        operation: &'static str,
        /// Tag of the exchange.
        tag: CollectiveTag,
        /// Rank that sent the wrong count.
        peer: Rank,
        /// Count expected by the root.
        expected: Count,
        /// Count actually received.
        actual: Count,
    },
}

/// Errors raised by a gather call.
#[derive(Debug, thiserror::Error)]
pub enum GatherError {
    /// One of the exchanges failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A local value could not be encoded.
    #[error("encoding value {index} failed: {reason}")]
    Encode {
        /// Position of the value in the local chunk.
        index: usize,
        /// Message of the codec.
        reason: String,
    },

    /// The bytes received from a rank could not be decoded.
    #[error("decoding values from rank {rank} failed: {reason}")]
    Decode {
        /// Rank whose region failed to decode.
        rank: Rank,
        /// Message of the codec or the bounds check.
        reason: String,
    },

    /// The encoded local chunk does not fit into a transport count.
    #[error("encoded chunk of {bytes} bytes exceeds the transport limit of {limit} bytes")]
    ChunkTooLarge {
        /// Length of the encoded chunk.
        bytes: usize,
        /// Largest supported length.
        limit: usize,
    },
}
