//! Encoding of values that have no fixed binary layout.

use serde::{de::DeserializeOwned, Serialize};

/// Error message of a codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CodecError(pub String);

/// Converts values to and from a byte stream.
///
/// Values must be decoded in exactly the order they were appended.
pub trait Codec {
    /// Append the encoding of `value` to `stream`.
    fn encode<T: Serialize>(&self, value: &T, stream: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decode the value starting at byte `position` of `stream`.
    ///
    /// Returns the value and the position just past its encoding.
    fn decode<T: DeserializeOwned>(
        &self,
        stream: &[u8],
        position: usize,
    ) -> Result<(T, usize), CodecError>;
}

/// The default codec, using bincode's standard configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T, stream: &mut Vec<u8>) -> Result<(), CodecError> {
        bincode::serde::encode_into_std_write(value, stream, bincode::config::standard())
            .map(|_| ())
            .map_err(|e| CodecError(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(
        &self,
        stream: &[u8],
        position: usize,
    ) -> Result<(T, usize), CodecError> {
        let Some(remainder) = stream.get(position..) else {
            return Err(CodecError(format!(
                "position {position} is past the end of a {} byte stream",
                stream.len()
            )));
        };

        let (value, read) =
            bincode::serde::decode_from_slice::<T, _>(remainder, bincode::config::standard())
                .map_err(|e| CodecError(e.to_string()))?;

        Ok((value, position + read))
    }
}
