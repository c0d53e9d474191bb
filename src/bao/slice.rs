//! Bao slice extraction and slice verification (C5): given an already
//! encoded stream, pull out (or verify) exactly the parent nodes and
//! chunks needed to authenticate a contiguous byte range, without
//! re-hashing subtrees that fall entirely outside it.

use tracing::instrument;

use crate::blake3::chunk::{hash_chunk, parent_output};
use crate::blake3::compress::{bytes_to_cv, cv_to_bytes, CHUNK_LEN, IV, ROOT};
use crate::blake3::hasher::Hash;
use crate::constant_time::ct_eq;
use crate::error::{Error, Result};

use super::{count_chunks, left_len, parse_header, HEADER_LEN, PARENT_SIZE};

/// Clamps a requested `(start, len)` range to the normalization rule shared
/// by [`slice`] and [`decode_slice`]: a zero length is treated as one byte,
/// and a start past the end of the content is pulled back onto the final
/// chunk.
fn normalize_range(content_len: u64, start: u64, len: u64) -> (u64, u64) {
    if content_len == 0 {
        return (0, 0);
    }
    let effective_len = len.max(1);
    if start >= content_len {
        return (content_len - 1, content_len);
    }
    let range_end = (start + effective_len).min(content_len);
    (start, range_end.max(start + 1).min(content_len))
}

/// Number of bytes a subtree covering `content_len` bytes contributes to
/// the encoded byte stream: its internal parent nodes, plus (for
/// combined-form encodings) its chunk bytes.
fn encoded_subtree_len(content_len: u64, outboard: bool) -> u64 {
    let chunks = count_chunks(content_len);
    let parents = chunks.saturating_sub(1);
    let data = if outboard { 0 } else { content_len };
    parents * PARENT_SIZE as u64 + data
}

/// Extracts a slice proof for `[start, start + len)` out of an already
/// encoded stream. The returned bytes are always in combined form (chunk
/// data included), even if `encoded` itself is outboard and the original
/// bytes are supplied separately via `outboard_content`.
#[instrument(skip(encoded, outboard_content), fields(start, len))]
pub fn slice(encoded: &[u8], start: u64, len: u64, outboard_content: Option<&[u8]>) -> Result<Vec<u8>> {
    let (content_len, rest) = parse_header(encoded)?;
    let mut out = Vec::with_capacity(HEADER_LEN + 256);
    out.extend_from_slice(&content_len.to_le_bytes());

    if content_len == 0 {
        return Ok(out);
    }

    let (range_start, range_end) = normalize_range(content_len, start, len);
    let mut cursor = rest;
    slice_node(
        content_len,
        0,
        &mut cursor,
        outboard_content,
        range_start,
        range_end,
        &mut out,
    )?;
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn slice_node(
    content_len: u64,
    abs_offset: u64,
    rest: &mut &[u8],
    outboard_content: Option<&[u8]>,
    range_start: u64,
    range_end: u64,
    out: &mut Vec<u8>,
) -> Result<()> {
    let entirely_outside = abs_offset + content_len <= range_start || abs_offset >= range_end;

    if content_len <= CHUNK_LEN as u64 {
        let n = content_len as usize;
        if entirely_outside {
            if outboard_content.is_none() {
                advance(rest, n)?;
            }
            return Ok(());
        }
        match outboard_content {
            Some(content) => {
                let start = abs_offset as usize;
                let bytes = content.get(start..start + n).ok_or_else(|| {
                    Error::MalformedInput("outboard content shorter than declared length".into())
                })?;
                out.extend_from_slice(bytes);
            }
            None => {
                let bytes = take(rest, n)?;
                out.extend_from_slice(bytes);
            }
        }
        return Ok(());
    }

    if entirely_outside {
        let skip = encoded_subtree_len(content_len, outboard_content.is_some()) as usize;
        advance(rest, skip)?;
        return Ok(());
    }

    let parent_bytes = take(rest, PARENT_SIZE)?;
    out.extend_from_slice(parent_bytes);

    let split = left_len(content_len);
    slice_node(
        split,
        abs_offset,
        rest,
        outboard_content,
        range_start,
        range_end,
        out,
    )?;
    slice_node(
        content_len - split,
        abs_offset + split,
        rest,
        outboard_content,
        range_start,
        range_end,
        out,
    )?;
    Ok(())
}

fn take<'a>(rest: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if rest.len() < n {
        return Err(Error::MalformedInput("truncated slice stream".into()));
    }
    let (taken, remainder) = rest.split_at(n);
    *rest = remainder;
    Ok(taken)
}

fn advance(rest: &mut &[u8], n: usize) -> Result<()> {
    take(rest, n).map(|_| ())
}

/// One node pending verification while walking a slice, carrying the
/// absolute content offset of its subtree so overlap with the requested
/// range can be determined without re-deriving it from chunk counters.
struct PendingNode {
    content_len: u64,
    abs_offset: u64,
    chunk_counter: u64,
    is_root: bool,
    expected_cv: [u32; 8],
}

/// Verifies a slice produced by [`slice`] against `root_hash` and returns
/// exactly the content bytes of `[start, start + len)` (after the same
/// normalization `slice` applies). Any chaining-value mismatch along the
/// path fails with [`Error::VerificationFailed`].
#[instrument(skip(slice_bytes), fields(slice_len = slice_bytes.len(), start, len))]
pub fn decode_slice(slice_bytes: &[u8], root_hash: &Hash, start: u64, len: u64) -> Result<Vec<u8>> {
    let (content_len, rest) = parse_header(slice_bytes)?;

    if content_len == 0 {
        let cv = hash_chunk(&[], IV, 0, 0).root_chaining_value();
        if !ct_eq(&cv_to_bytes(cv), root_hash.as_bytes()) {
            return Err(Error::VerificationFailed);
        }
        return Ok(Vec::new());
    }

    let (range_start, range_end) = normalize_range(content_len, start, len);
    let mut cursor = rest;
    let mut out = Vec::with_capacity((range_end - range_start) as usize);
    let mut stack = vec![PendingNode {
        content_len,
        abs_offset: 0,
        chunk_counter: 0,
        is_root: true,
        expected_cv: bytes_to_cv(root_hash.as_bytes()),
    }];

    // Depth-first, left-before-right, matching the pre-order the slice was
    // written in; a plain stack would visit right-before-left, so children
    // are pushed in reverse.
    while let Some(node) = stack.pop() {
        let entirely_outside =
            node.abs_offset + node.content_len <= range_start || node.abs_offset >= range_end;
        if entirely_outside {
            continue;
        }

        if node.content_len <= CHUNK_LEN as u64 {
            let n = node.content_len as usize;
            let chunk_bytes = take(&mut cursor, n)?;
            let output = hash_chunk(chunk_bytes, IV, node.chunk_counter, 0);
            let cv = if node.is_root {
                output.root_chaining_value()
            } else {
                output.chaining_value()
            };
            if !ct_eq(&cv_to_bytes(cv), &cv_to_bytes(node.expected_cv)) {
                return Err(Error::VerificationFailed);
            }

            let overlap_start = range_start.max(node.abs_offset) - node.abs_offset;
            let overlap_end = range_end.min(node.abs_offset + node.content_len) - node.abs_offset;
            out.extend_from_slice(&chunk_bytes[overlap_start as usize..overlap_end as usize]);
        } else {
            let parent_bytes = take(&mut cursor, PARENT_SIZE)?;
            let mut left_bytes = [0u8; 32];
            let mut right_bytes = [0u8; 32];
            left_bytes.copy_from_slice(&parent_bytes[..32]);
            right_bytes.copy_from_slice(&parent_bytes[32..]);

            let left_cv = bytes_to_cv(&left_bytes);
            let right_cv = bytes_to_cv(&right_bytes);
            let flags = if node.is_root { ROOT } else { 0 };
            let computed = parent_output(left_cv, right_cv, IV, flags).chaining_value();
            if !ct_eq(&cv_to_bytes(computed), &cv_to_bytes(node.expected_cv)) {
                return Err(Error::VerificationFailed);
            }

            let split = left_len(node.content_len);
            let left_chunks = count_chunks(split);
            stack.push(PendingNode {
                content_len: node.content_len - split,
                abs_offset: node.abs_offset + split,
                chunk_counter: node.chunk_counter + left_chunks,
                is_root: false,
                expected_cv: right_cv,
            });
            stack.push(PendingNode {
                content_len: split,
                abs_offset: node.abs_offset,
                chunk_counter: node.chunk_counter,
                is_root: false,
                expected_cv: left_cv,
            });
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bao::tree::encode;

    fn test_input(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn slice_of_full_range_matches_original() {
        let content = test_input(50_000);
        let (encoded, root_hash) = encode(&content, false);
        let sliced = slice(&encoded, 0, content.len() as u64, None).unwrap();
        let decoded = decode_slice(&sliced, &root_hash, 0, content.len() as u64).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn slice_of_middle_range() {
        let content = test_input(50_000);
        let (encoded, root_hash) = encode(&content, false);
        let sliced = slice(&encoded, 1024, 512, None).unwrap();
        let decoded = decode_slice(&sliced, &root_hash, 1024, 512).unwrap();
        assert_eq!(decoded, content[1024..1536]);
    }

    #[test]
    fn slice_spanning_chunk_boundary() {
        let content = test_input(50_000);
        let (encoded, root_hash) = encode(&content, false);
        let sliced = slice(&encoded, 1000, 100, None).unwrap();
        let decoded = decode_slice(&sliced, &root_hash, 1000, 100).unwrap();
        assert_eq!(decoded, content[1000..1100]);
    }

    #[test]
    fn slice_is_much_smaller_than_full_encoding() {
        let content = test_input(1_000_000);
        let (encoded, _) = encode(&content, false);
        let sliced = slice(&encoded, 1024, 512, None).unwrap();
        assert!(sliced.len() < encoded.len() / 4);
    }

    #[test]
    fn corrupting_slice_byte_fails_verification() {
        let content = test_input(50_000);
        let (encoded, root_hash) = encode(&content, false);
        let mut sliced = slice(&encoded, 1024, 512, None).unwrap();
        let last = sliced.len() - 1;
        sliced[last] ^= 0xFF;
        assert!(matches!(
            decode_slice(&sliced, &root_hash, 1024, 512),
            Err(Error::VerificationFailed)
        ));
    }

    #[test]
    fn zero_length_request_is_treated_as_one_byte() {
        let content = test_input(2000);
        let (encoded, root_hash) = encode(&content, false);
        let sliced = slice(&encoded, 500, 0, None).unwrap();
        let decoded = decode_slice(&sliced, &root_hash, 500, 0).unwrap();
        assert_eq!(decoded, content[500..501]);
    }

    #[test]
    fn start_past_content_len_clamps_to_final_chunk() {
        let content = test_input(2000);
        let (encoded, root_hash) = encode(&content, false);
        let sliced = slice(&encoded, 5000, 10, None).unwrap();
        let decoded = decode_slice(&sliced, &root_hash, 5000, 10).unwrap();
        assert_eq!(decoded, content[1999..2000]);
    }

    #[test]
    fn outboard_slice_round_trips() {
        let content = test_input(50_000);
        let (encoded, root_hash) = encode(&content, true);
        let sliced = slice(&encoded, 20_000, 1000, Some(&content)).unwrap();
        let decoded = decode_slice(&sliced, &root_hash, 20_000, 1000).unwrap();
        assert_eq!(decoded, content[20_000..21_000]);
    }
}
