//! Gather of values that need to be encoded.
//!
//! Each rank encodes its values back to back into one byte stream. The
//! stream lengths are gathered first, which gives the root the layout of
//! the receive buffer. The streams themselves follow in a varcount gather.
//! The root then decodes every foreign stream and copies its own values
//! directly, they never pass through the codec on the root.

use itertools::Itertools;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    codec::Codec,
    constants::MAX_CHUNK_BYTES,
    error::{GatherError, Result},
    gather::{Collectives, Fixed, GatherStrategy},
    group::{ProcessGroup, RecvPartition},
    tools::{displacements, total_count},
    types::{Count, Rank},
};

/// Strategy for values without a fixed layout. Values travel encoded.
#[derive(Debug, Clone, Copy)]
pub struct Serialized;

/// The streams of all ranks as received by the root.
struct Received {
    buffer: Vec<u8>,
    sizes: Vec<Count>,
    offsets: Vec<Count>,
}

impl Received {
    fn region(&self, rank: Rank) -> &[u8] {
        let start = self.offsets[rank as usize] as usize;
        let end = start + self.sizes[rank as usize] as usize;
        &self.buffer[start..end]
    }
}

/// Encode `local` into a single stream.
fn encode_chunk<T: Serialize, C: Codec>(codec: &C, local: &[T], limit: usize) -> Result<Vec<u8>> {
    let mut stream = Vec::new();

    for (index, value) in local.iter().enumerate() {
        codec
            .encode(value, &mut stream)
            .map_err(|e| GatherError::Encode {
                index,
                reason: e.0,
            })?;
    }

    if stream.len() > limit {
        return Err(GatherError::ChunkTooLarge {
            bytes: stream.len(),
            limit,
        });
    }

    Ok(stream)
}

/// Decode exactly `n` values from the region of rank `src`.
///
/// The region must be consumed completely.
fn decode_chunk<T, C, F>(codec: &C, region: &[u8], n: usize, src: Rank, mut emit: F) -> Result<()>
where
    T: DeserializeOwned,
    C: Codec,
    F: FnMut(usize, T),
{
    let mut position = 0;

    for index in 0..n {
        let (value, next) = codec
            .decode::<T>(region, position)
            .map_err(|e| GatherError::Decode {
                rank: src,
                reason: e.0,
            })?;

        if next < position || next > region.len() {
            return Err(GatherError::Decode {
                rank: src,
                reason: format!(
                    "value {index} claims bytes {position}..{next} of a {} byte region",
                    region.len()
                ),
            });
        }

        emit(index, value);
        position = next;
    }

    if position != region.len() {
        return Err(GatherError::Decode {
            rank: src,
            reason: format!("{} trailing bytes after {n} values", region.len() - position),
        });
    }

    tracing::trace!(rank = src, bytes = region.len(), n, "decoded chunk");

    Ok(())
}

/// Length of the concatenated streams, at most `limit` bytes.
fn receive_len(sizes: &[Count], limit: usize) -> Result<usize> {
    let total = total_count(&sizes.iter().map(|&s| i64::from(s)).collect_vec());

    match usize::try_from(total) {
        Ok(bytes) if bytes <= limit => Ok(bytes),
        _ => Err(GatherError::ChunkTooLarge {
            bytes: total.max(0) as usize,
            limit,
        }),
    }
}

/// Encode the local values and move all streams to the root.
///
/// Returns the received streams on the root and `None` elsewhere.
fn exchange<T, G, C>(
    collectives: &Collectives<G, C>,
    local: &[T],
    root: Rank,
) -> Result<Option<Received>>
where
    T: Serialize,
    G: ProcessGroup,
    C: Codec,
{
    let group = collectives.group();
    let limit = collectives.config().max_chunk_bytes.min(MAX_CHUNK_BYTES);

    let stream = encode_chunk(collectives.codec(), local, limit)?;
    let len = stream.len() as Count;

    tracing::debug!(
        rank = group.rank(),
        root,
        n = local.len(),
        bytes = stream.len(),
        "serialized gather"
    );

    if group.rank() != root {
        <Fixed as GatherStrategy<Count>>::gather_send(collectives, &[len], root)?;
        group.variable_size_exchange(group.next_tag(), &stream, None, root)?;
        return Ok(None);
    }

    // We first gather the length of every stream. This is all the root needs
    // to lay out the receive buffer.

    let mut sizes: Vec<Count> = vec![0; group.size() as usize];
    <Fixed as GatherStrategy<Count>>::gather_root(collectives, &[len], &mut sizes, root)?;

    // The other ranks are already waiting in the byte exchange at this point.
    // Under MPI a failure here leaves them blocked, as does any root-side
    // error between the two exchanges.
    let total = receive_len(&sizes, MAX_CHUNK_BYTES)?;

    let offsets = displacements(&sizes);
    let mut buffer = vec![0_u8; total];

    group.variable_size_exchange(
        group.next_tag(),
        &stream,
        Some(RecvPartition {
            buffer: &mut buffer,
            sizes: &sizes,
            offsets: &offsets,
        }),
        root,
    )?;

    Ok(Some(Received {
        buffer,
        sizes,
        offsets,
    }))
}

/// Assemble the values of all ranks in rank order.
///
/// The root's own values are cloned from `local`, all other regions decoded.
fn assemble<T, C>(codec: &C, local: &[T], received: &Received, root: Rank) -> Result<Vec<T>>
where
    T: DeserializeOwned + Clone,
    C: Codec,
{
    let n = local.len();
    let mut gathered = Vec::with_capacity(received.sizes.len() * n);

    for src in 0..received.sizes.len() as Rank {
        if src == root {
            gathered.extend_from_slice(local);
        } else {
            decode_chunk(codec, received.region(src), n, src, |_, value| {
                gathered.push(value)
            })?;
        }
    }

    Ok(gathered)
}

impl<T: Serialize + DeserializeOwned + Clone> GatherStrategy<T> for Serialized {
    const FIXED_LAYOUT: bool = false;

    fn gather_root<G: ProcessGroup, C: Codec>(
        collectives: &Collectives<G, C>,
        local: &[T],
        out: &mut [T],
        root: Rank,
    ) -> Result<()> {
        let Some(received) = exchange(collectives, local, root)? else {
            return Ok(());
        };

        let gathered = assemble(collectives.codec(), local, &received, root)?;
        for (slot, value) in out.iter_mut().zip(gathered) {
            *slot = value;
        }

        Ok(())
    }

    fn gather_send<G: ProcessGroup, C: Codec>(
        collectives: &Collectives<G, C>,
        local: &[T],
        root: Rank,
    ) -> Result<()> {
        exchange(collectives, local, root)?;
        Ok(())
    }

    fn gather_root_vec<G: ProcessGroup, C: Codec>(
        collectives: &Collectives<G, C>,
        local: &[T],
        out: &mut Vec<T>,
        root: Rank,
    ) -> Result<()> {
        let Some(received) = exchange(collectives, local, root)? else {
            return Ok(());
        };

        *out = assemble(collectives.codec(), local, &received, root)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        codec::{BincodeCodec, Codec},
        error::GatherError,
    };

    use super::{decode_chunk, encode_chunk, receive_len};

    #[test]
    fn test_chunk_roundtrip() {
        let values = vec![String::new(), "a".repeat(300), String::from("gather")];

        let stream = encode_chunk(&BincodeCodec, &values, usize::MAX).unwrap();

        let mut decoded = vec![String::new(); 3];
        decode_chunk::<String, _, _>(&BincodeCodec, &stream, 3, 4, |i, v| decoded[i] = v).unwrap();

        assert_eq!(decoded, values);
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut stream = encode_chunk(&BincodeCodec, &[1_u16, 2], usize::MAX).unwrap();
        BincodeCodec.encode(&3_u16, &mut stream).unwrap();

        let result = decode_chunk::<u16, _, _>(&BincodeCodec, &stream, 2, 1, |_, _| {});

        assert!(matches!(result, Err(GatherError::Decode { rank: 1, .. })));
    }

    #[test]
    fn test_short_region_is_rejected() {
        let stream = encode_chunk(&BincodeCodec, &[7_u64, 8], usize::MAX).unwrap();

        let result = decode_chunk::<u64, _, _>(&BincodeCodec, &stream[..1], 2, 0, |_, _| {});

        assert!(matches!(result, Err(GatherError::Decode { rank: 0, .. })));
    }

    #[test]
    fn test_receive_len_is_bounded() {
        assert_eq!(receive_len(&[3, 0, 4], 7).unwrap(), 7);

        let result = receive_len(&[3, 0, 4], 6);

        assert!(matches!(
            result,
            Err(GatherError::ChunkTooLarge { bytes: 7, limit: 6 })
        ));
    }
}
