//! The Bao verified-streaming tree construction built directly on top of
//! [`crate::blake3`]'s compression and chunk primitives.

pub mod group;
pub mod parallel;
pub mod partial;
pub mod slice;
pub mod tree;

pub use group::{count_groups, decode_iroh, encode_iroh, group_proofs, outboard_size_iroh, ChunkGroupLog};
pub use parallel::{encode_parallel, ParallelConfig};
pub use partial::{ExportedState, GroupRecord, PartialBao};
pub use slice::{decode_slice, slice};
pub use tree::{decode, encode, BaoDecoder, BaoEncoder};

use crate::blake3::compress::CHUNK_LEN;
use crate::error::{Error, Result};

/// Length, in bytes, of the serialized header that prefixes every Bao
/// encoding: the little-endian content length.
pub const HEADER_LEN: usize = 8;

/// Size, in bytes, of a serialized parent node (two concatenated 32-byte
/// chaining values).
pub const PARENT_SIZE: usize = 64;

/// Largest power of two less than or equal to `n`. `n` must be >= 1.
fn largest_power_of_two(n: u64) -> u64 {
    debug_assert!(n >= 1);
    1u64 << (63 - n.leading_zeros())
}

/// Byte length of the left subtree of a node covering `content_len` bytes,
/// where `content_len` is known to span more than one chunk (or chunk
/// group, when `unit` is a group size rather than [`CHUNK_LEN`]).
///
/// This is the single recursive split rule shared by encode, decode, and
/// slice — both the whole-chunk Bao tree and the Iroh chunk-group variant
/// call it with a different `unit`.
pub fn left_len_with_unit(content_len: u64, unit: u64) -> u64 {
    debug_assert!(content_len > unit, "left_len requires more than one unit");
    let full_units = (content_len - 1) / unit;
    largest_power_of_two(full_units) * unit
}

/// [`left_len_with_unit`] specialized to whole 1024-byte chunks.
pub fn left_len(content_len: u64) -> u64 {
    left_len_with_unit(content_len, CHUNK_LEN as u64)
}

/// Number of chunks needed to cover `content_len` bytes (at least 1, even
/// for empty content).
pub fn count_chunks(content_len: u64) -> u64 {
    if content_len == 0 {
        1
    } else {
        content_len.div_ceil(CHUNK_LEN as u64)
    }
}

pub(crate) fn parse_header(encoded: &[u8]) -> Result<(u64, &[u8])> {
    if encoded.len() < HEADER_LEN {
        return Err(Error::MalformedInput(
            "encoding shorter than the 8-byte length header".into(),
        ));
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&encoded[..HEADER_LEN]);
    Ok((u64::from_le_bytes(len_bytes), &encoded[HEADER_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_len_matches_known_values() {
        assert_eq!(left_len(1025), 1024);
        assert_eq!(left_len(2048), 1024);
        assert_eq!(left_len(2049), 2048);
        assert_eq!(left_len(3072), 2048);
        assert_eq!(left_len(1024 * 1024 + 1), 1024 * 1024);
    }

    #[test]
    fn count_chunks_handles_empty_and_boundary() {
        assert_eq!(count_chunks(0), 1);
        assert_eq!(count_chunks(1), 1);
        assert_eq!(count_chunks(1024), 1);
        assert_eq!(count_chunks(1025), 2);
    }
}
