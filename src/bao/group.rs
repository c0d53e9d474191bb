//! The Iroh-compatible chunk-group variant (C6): identical tree discipline
//! to [`super::tree`], except the serialized tree's leaves are groups of
//! `2^g` consecutive chunks rather than individual chunks. Internal parent
//! nodes *within* a group are never materialized on the wire — a group's
//! leaf chaining value is simply the ordinary Bao subtree root CV of its
//! bytes, computed by [`super::tree::encode_into`] with a throwaway output
//! buffer.
//!
//! For any `g`, the root CV this module produces equals the root CV
//! [`super::tree::encode`] produces for the same bytes; only the wire
//! encoding's granularity (and therefore its size) differs.

use tracing::instrument;

use crate::blake3::chunk::{hash_chunk, parent_output};
use crate::blake3::compress::{bytes_to_cv, cv_to_bytes, CHUNK_LEN, IV, ROOT};
use crate::blake3::hasher::Hash;
use crate::constant_time::ct_eq;
use crate::error::{Error, Result};

use super::tree::encode_into;
use super::{count_chunks, left_len_with_unit, parse_header, HEADER_LEN, PARENT_SIZE};

/// The Iroh `chunk_group_log` parameter: group size is `2^g` chunks. Not
/// part of the wire format — deployments must agree on it out of band,
/// mirroring the reference `bao-tree` crate's `BlockSize`
/// (`examples/jefferyq2-bao-tree/src/tree.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkGroupLog(u8);

/// Largest supported `chunk_group_log`: a group of `2^16` chunks is 64 MiB,
/// already impractically large for a single leaf.
pub const MAX_CHUNK_GROUP_LOG: u8 = 16;

impl ChunkGroupLog {
    /// `g = 4` (16 KiB groups), the default used when a deployment doesn't
    /// otherwise specify one.
    pub const DEFAULT: ChunkGroupLog = ChunkGroupLog(4);

    pub fn new(g: u8) -> Result<Self> {
        if g > MAX_CHUNK_GROUP_LOG {
            return Err(Error::Config(format!(
                "chunk_group_log {g} exceeds the maximum of {MAX_CHUNK_GROUP_LOG}"
            )));
        }
        Ok(Self(g))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Group size in chunks: `2^g`.
    pub fn group_chunks(self) -> u64 {
        1u64 << self.0
    }

    /// Group size in bytes: `2^g * 1024`.
    pub fn group_len(self) -> u64 {
        (CHUNK_LEN as u64) << self.0
    }
}

impl Default for ChunkGroupLog {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Number of groups needed to cover `content_len` bytes (at least 1, even
/// for empty content) at the given group size.
pub fn count_groups(content_len: u64, g: ChunkGroupLog) -> u64 {
    if content_len == 0 {
        1
    } else {
        content_len.div_ceil(g.group_len())
    }
}

/// `8 + (count_groups(L, g) - 1) * 64`: the outboard encoding size for
/// content of length `L` at chunk-group log `g`.
pub fn outboard_size_iroh(content_len: u64, g: ChunkGroupLog) -> u64 {
    HEADER_LEN as u64 + (count_groups(content_len, g) - 1) * PARENT_SIZE as u64
}

/// Encodes `content` using the Iroh chunk-group tree shape and returns
/// `(encoded, root_hash)`. `root_hash` is identical to what
/// [`super::tree::encode`] would produce for the same bytes, for any `g`.
#[instrument(skip(content), fields(len = content.len(), outboard, g = g.get()))]
pub fn encode_iroh(content: &[u8], outboard: bool, g: ChunkGroupLog) -> (Vec<u8>, Hash) {
    let mut out = Vec::with_capacity(HEADER_LEN + 256);
    out.extend_from_slice(&(content.len() as u64).to_le_bytes());

    let root_cv = if content.is_empty() {
        hash_chunk(&[], IV, 0, 0).root_chaining_value()
    } else {
        encode_group_into(content, 0, true, outboard, g.group_len(), &mut out)
    };

    (out, Hash::from(cv_to_bytes(root_cv)))
}

fn encode_group_into(
    content: &[u8],
    chunk_counter: u64,
    is_root: bool,
    outboard: bool,
    group_len: u64,
    out: &mut Vec<u8>,
) -> [u32; 8] {
    if content.len() as u64 <= group_len {
        // Leaf: an ordinary Bao subtree, but only its root CV is kept —
        // its internal parent nodes never reach the wire.
        let mut scratch = Vec::new();
        let cv = encode_into(content, chunk_counter, is_root, true, &mut scratch);
        if !outboard {
            out.extend_from_slice(content);
        }
        cv
    } else {
        let split = left_len_with_unit(content.len() as u64, group_len) as usize;
        let (left, right) = content.split_at(split);
        let left_chunks = count_chunks(split as u64);

        let parent_pos = out.len();
        out.extend_from_slice(&[0u8; PARENT_SIZE]);

        let left_cv = encode_group_into(left, chunk_counter, false, outboard, group_len, out);
        let right_cv = encode_group_into(
            right,
            chunk_counter + left_chunks,
            false,
            outboard,
            group_len,
            out,
        );

        out[parent_pos..parent_pos + 32].copy_from_slice(&cv_to_bytes(left_cv));
        out[parent_pos + 32..parent_pos + PARENT_SIZE].copy_from_slice(&cv_to_bytes(right_cv));

        let flags = if is_root { ROOT } else { 0 };
        parent_output(left_cv, right_cv, IV, flags).chaining_value()
    }
}

/// The chaining value of the subtree covering `content`, computed the same
/// way a group leaf's CV is computed (internal parent nodes discarded).
/// Used both by [`encode_group_into`]'s leaves and by [`group_proofs`] to
/// recompute a sibling's CV without re-walking the whole tree.
fn subtree_cv(content: &[u8], chunk_counter: u64, is_root: bool) -> [u32; 8] {
    let mut scratch = Vec::new();
    encode_into(content, chunk_counter, is_root, true, &mut scratch)
}

/// Computes the root hash and, for every group in pre-order (left to
/// right, matching group index order), the ordered root-to-leaf list of
/// sibling chaining values needed to authenticate it. This is the
/// producer-side counterpart to [`crate::bao::partial::PartialBao`]'s
/// `add_group_with_proof`: a sender walks `content` once to hand out a
/// proof alongside each group it pushes to a receiver.
pub fn group_proofs(content: &[u8], g: ChunkGroupLog) -> (Hash, Vec<Vec<Hash>>) {
    if content.is_empty() {
        let cv = hash_chunk(&[], IV, 0, 0).root_chaining_value();
        return (Hash::from(cv_to_bytes(cv)), vec![Vec::new()]);
    }

    let mut proofs = Vec::new();
    let mut ancestors = Vec::new();
    let root_cv = collect_proofs(content, 0, true, g.group_len(), &mut ancestors, &mut proofs);
    (Hash::from(cv_to_bytes(root_cv)), proofs)
}

fn collect_proofs(
    content: &[u8],
    chunk_counter: u64,
    is_root: bool,
    group_len: u64,
    ancestors: &mut Vec<[u32; 8]>,
    out: &mut Vec<Vec<Hash>>,
) -> [u32; 8] {
    if content.len() as u64 <= group_len {
        out.push(ancestors.iter().map(|cv| Hash::from(cv_to_bytes(*cv))).collect());
        return subtree_cv(content, chunk_counter, is_root);
    }

    let split = left_len_with_unit(content.len() as u64, group_len) as usize;
    let (left, right) = content.split_at(split);
    let left_chunks = count_chunks(split as u64);

    let right_cv = subtree_cv(right, chunk_counter + left_chunks, false);
    ancestors.push(right_cv);
    let left_cv = collect_proofs(left, chunk_counter, false, group_len, ancestors, out);
    ancestors.pop();

    ancestors.push(left_cv);
    let right_cv_recomputed =
        collect_proofs(right, chunk_counter + left_chunks, false, group_len, ancestors, out);
    ancestors.pop();
    debug_assert_eq!(right_cv, right_cv_recomputed);

    let flags = if is_root { ROOT } else { 0 };
    parent_output(left_cv, right_cv, IV, flags).chaining_value()
}

struct PendingGroup {
    content_len: u64,
    chunk_counter: u64,
    is_root: bool,
    expected_cv: [u32; 8],
}

/// Decodes and verifies an Iroh chunk-group encoding against `root_hash`.
/// `g` must match the value `encoded` was produced with; there is no way
/// to recover it from the stream itself.
#[instrument(skip(encoded, outboard_content), fields(encoded_len = encoded.len(), g = g.get()))]
pub fn decode_iroh(
    encoded: &[u8],
    root_hash: &Hash,
    g: ChunkGroupLog,
    outboard_content: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let (content_len, mut rest) = parse_header(encoded)?;

    if content_len == 0 {
        let cv = hash_chunk(&[], IV, 0, 0).root_chaining_value();
        if !ct_eq(&cv_to_bytes(cv), root_hash.as_bytes()) {
            return Err(Error::VerificationFailed);
        }
        return Ok(Vec::new());
    }

    let group_len = g.group_len();
    let mut out = Vec::with_capacity(content_len as usize);
    let mut stack = vec![PendingGroup {
        content_len,
        chunk_counter: 0,
        is_root: true,
        expected_cv: bytes_to_cv(root_hash.as_bytes()),
    }];

    while let Some(node) = stack.pop() {
        if node.content_len <= group_len {
            let n = node.content_len as usize;
            let group_bytes: Vec<u8> = match outboard_content {
                Some(content) => {
                    let start = out.len();
                    let end = start + n;
                    content
                        .get(start..end)
                        .ok_or_else(|| {
                            Error::MalformedInput(
                                "outboard content shorter than declared length".into(),
                            )
                        })?
                        .to_vec()
                }
                None => {
                    if rest.len() < n {
                        return Err(Error::MalformedInput("truncated group data".into()));
                    }
                    let bytes = rest[..n].to_vec();
                    rest = &rest[n..];
                    bytes
                }
            };

            let mut scratch = Vec::new();
            let cv = encode_into(
                &group_bytes,
                node.chunk_counter,
                node.is_root,
                true,
                &mut scratch,
            );
            if !ct_eq(&cv_to_bytes(cv), &cv_to_bytes(node.expected_cv)) {
                return Err(Error::VerificationFailed);
            }
            out.extend_from_slice(&group_bytes);
        } else {
            if rest.len() < PARENT_SIZE {
                return Err(Error::MalformedInput("truncated parent node".into()));
            }
            let mut left_bytes = [0u8; 32];
            let mut right_bytes = [0u8; 32];
            left_bytes.copy_from_slice(&rest[..32]);
            right_bytes.copy_from_slice(&rest[32..64]);
            rest = &rest[PARENT_SIZE..];

            let left_cv = bytes_to_cv(&left_bytes);
            let right_cv = bytes_to_cv(&right_bytes);
            let flags = if node.is_root { ROOT } else { 0 };
            let computed = parent_output(left_cv, right_cv, IV, flags).chaining_value();
            if !ct_eq(&cv_to_bytes(computed), &cv_to_bytes(node.expected_cv)) {
                return Err(Error::VerificationFailed);
            }

            let split = left_len_with_unit(node.content_len, group_len);
            let left_chunks = count_chunks(split);

            stack.push(PendingGroup {
                content_len: node.content_len - split,
                chunk_counter: node.chunk_counter + left_chunks,
                is_root: false,
                expected_cv: right_cv,
            });
            stack.push(PendingGroup {
                content_len: split,
                chunk_counter: node.chunk_counter,
                is_root: false,
                expected_cv: left_cv,
            });
        }
    }

    Ok(out)
}
