//! Whole-content Bao encoding and decoding: the ordinary (chunk-granularity)
//! tree codec, C4 of this crate's design.

use bytes::Bytes;
use tracing::instrument;

use crate::blake3::chunk::{hash_chunk, parent_output};
use crate::blake3::compress::{bytes_to_cv, cv_to_bytes, IV, ROOT};
use crate::blake3::hasher::Hash;
use crate::constant_time::ct_eq;
use crate::error::{Error, Result};

use super::{count_chunks, left_len, parse_header, HEADER_LEN, PARENT_SIZE};

/// Encodes `content` as a Bao tree and returns `(encoded, root_hash)`.
///
/// When `outboard` is `true`, the returned bytes contain only the length
/// header and parent nodes; chunk bytes are omitted and must be supplied
/// separately (as `content` itself) to [`decode`].
#[instrument(skip(content), fields(len = content.len(), outboard))]
pub fn encode(content: &[u8], outboard: bool) -> (Vec<u8>, Hash) {
    let mut out = Vec::with_capacity(HEADER_LEN + estimate_encoded_len(content.len(), outboard));
    out.extend_from_slice(&(content.len() as u64).to_le_bytes());

    let root_cv = if content.is_empty() {
        hash_chunk(&[], IV, 0, 0).root_chaining_value()
    } else {
        encode_into(content, 0, true, outboard, &mut out)
    };

    (out, Hash::from(cv_to_bytes(root_cv)))
}

fn estimate_encoded_len(content_len: usize, outboard: bool) -> usize {
    let chunks = count_chunks(content_len as u64);
    let parents = chunks.saturating_sub(1) as usize;
    let data = if outboard { 0 } else { content_len };
    parents * PARENT_SIZE + data
}

/// Writes the pre-order encoding of `content` into `out`, returning the
/// subtree's chaining value. `content.len()` must be >= 1.
///
/// Exposed at `pub(crate)` visibility so the Iroh chunk-group variant
/// ([`super::group`]) can reuse it unchanged to compute a group's leaf
/// chaining value: a group is just an ordinary Bao subtree whose internal
/// parent nodes are never materialized on the wire.
pub(crate) fn encode_into(content: &[u8], chunk_counter: u64, is_root: bool, outboard: bool, out: &mut Vec<u8>) -> [u32; 8] {
    if content.len() <= crate::blake3::compress::CHUNK_LEN {
        let output = hash_chunk(content, IV, chunk_counter, 0);
        if !outboard {
            out.extend_from_slice(content);
        }
        if is_root {
            output.root_chaining_value()
        } else {
            output.chaining_value()
        }
    } else {
        let split = left_len(content.len() as u64) as usize;
        let (left, right) = content.split_at(split);
        let left_chunks = count_chunks(split as u64);

        // Reserve space for the parent node; its two chaining values are
        // only known once both children have been hashed, so we patch
        // this placeholder in afterward rather than buffering children
        // separately.
        let parent_pos = out.len();
        out.extend_from_slice(&[0u8; PARENT_SIZE]);

        let left_cv = encode_into(left, chunk_counter, false, outboard, out);
        let right_cv = encode_into(right, chunk_counter + left_chunks, false, outboard, out);

        out[parent_pos..parent_pos + 32].copy_from_slice(&cv_to_bytes(left_cv));
        out[parent_pos + 32..parent_pos + PARENT_SIZE].copy_from_slice(&cv_to_bytes(right_cv));

        let flags = if is_root { ROOT } else { 0 };
        parent_output(left_cv, right_cv, IV, flags).chaining_value()
    }
}

/// One node still to be read and verified, processed in pre-order (parents
/// before their children; left before right).
struct PendingNode {
    content_len: u64,
    chunk_counter: u64,
    is_root: bool,
    expected_cv: [u32; 8],
}

/// Decodes and verifies a Bao encoding against `root_hash`, returning the
/// original content bytes.
///
/// `outboard_content`, when present, supplies the chunk bytes out of band
/// (the case where `encoded` was produced with `outboard: true`); `encoded`
/// is then expected to hold only the header and parent nodes.
#[instrument(skip(encoded, outboard_content), fields(encoded_len = encoded.len()))]
pub fn decode(encoded: &[u8], root_hash: &Hash, outboard_content: Option<&[u8]>) -> Result<Vec<u8>> {
    let (content_len, mut rest) = parse_header(encoded)?;

    if content_len == 0 {
        let cv = hash_chunk(&[], IV, 0, 0).root_chaining_value();
        if !ct_eq(&cv_to_bytes(cv), root_hash.as_bytes()) {
            return Err(Error::VerificationFailed);
        }
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(content_len as usize);
    let mut stack = vec![PendingNode {
        content_len,
        chunk_counter: 0,
        is_root: true,
        expected_cv: bytes_to_cv(root_hash.as_bytes()),
    }];

    while let Some(node) = stack.pop() {
        if node.content_len <= crate::blake3::compress::CHUNK_LEN as u64 {
            let n = node.content_len as usize;
            let chunk_bytes: Vec<u8> = match outboard_content {
                Some(content) => {
                    let start = out.len();
                    let end = start + n;
                    content
                        .get(start..end)
                        .ok_or_else(|| {
                            Error::MalformedInput("outboard content shorter than declared length".into())
                        })?
                        .to_vec()
                }
                None => {
                    if rest.len() < n {
                        return Err(Error::MalformedInput("truncated chunk data".into()));
                    }
                    let bytes = rest[..n].to_vec();
                    rest = &rest[n..];
                    bytes
                }
            };

            let output = hash_chunk(&chunk_bytes, IV, node.chunk_counter, 0);
            let cv = if node.is_root {
                output.root_chaining_value()
            } else {
                output.chaining_value()
            };
            if !ct_eq(&cv_to_bytes(cv), &cv_to_bytes(node.expected_cv)) {
                return Err(Error::VerificationFailed);
            }
            out.extend_from_slice(&chunk_bytes);
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

            let split = left_len(node.content_len);
            let left_chunks = count_chunks(split);

            stack.push(PendingNode {
                content_len: node.content_len - split,
                chunk_counter: node.chunk_counter + left_chunks,
                is_root: false,
                expected_cv: right_cv,
            });
            stack.push(PendingNode {
                content_len: split,
                chunk_counter: node.chunk_counter,
                is_root: false,
                expected_cv: left_cv,
            });
        }
    }

    Ok(out)
}

/// An incremental encoder: accepts content in arbitrary-sized `update()`
/// calls and computes the Bao tree on `finalize()`.
///
/// Chunks are kept as the caller handed them in (no copy on `update`) and
/// only concatenated once, lazily, in `finalize()`.
#[derive(Default)]
pub struct BaoEncoder {
    chunks: Vec<Bytes>,
}

impl BaoEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: impl Into<Bytes>) {
        self.chunks.push(bytes.into());
    }

    pub fn finalize(&self, outboard: bool) -> (Vec<u8>, Hash) {
        let content: Vec<u8> = self.chunks.iter().flat_map(|c| c.iter().copied()).collect();
        encode(&content, outboard)
    }
}

/// An incremental decoder: accepts the encoded stream in arbitrary-sized
/// `update()` calls and verifies/reconstructs the content on `finalize()`.
///
/// Bytes are never handed back to the caller until the whole stream has
/// been verified — there is no partial-trust release path.
#[derive(Default)]
pub struct BaoDecoder {
    chunks: Vec<Bytes>,
}

impl BaoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: impl Into<Bytes>) {
        self.chunks.push(bytes.into());
    }

    pub fn finalize(&self, root_hash: &Hash, outboard_content: Option<&[u8]>) -> Result<Vec<u8>> {
        let encoded: Vec<u8> = self.chunks.iter().flat_map(|c| c.iter().copied()).collect();
        decode(&encoded, root_hash, outboard_content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blake3::hasher::hash;

    fn test_input(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn empty_content_round_trips() {
        let (encoded, root_hash) = encode(&[], false);
        assert_eq!(encoded, 0u64.to_le_bytes());
        let decoded = decode(&encoded, &root_hash, None).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn small_content_round_trips_combined() {
        let content = b"hello world".to_vec();
        let (encoded, root_hash) = encode(&content, false);
        assert_eq!(&encoded[..8], &11u64.to_le_bytes());
        assert_eq!(&encoded[8..], content.as_slice());
        let decoded = decode(&encoded, &root_hash, None).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn multi_chunk_content_round_trips() {
        for n in [1023, 1024, 1025, 2048, 3072, 50_000] {
            let content = test_input(n);
            let (encoded, root_hash) = encode(&content, false);
            let decoded = decode(&encoded, &root_hash, None).unwrap();
            assert_eq!(decoded, content, "n={n}");
        }
    }

    #[test]
    fn two_chunk_outboard_size_is_header_plus_one_parent() {
        let content = test_input(2048);
        let (encoded, _) = encode(&content, true);
        assert_eq!(encoded.len(), 8 + 64);
    }

    #[test]
    fn outboard_round_trips() {
        let content = test_input(50_000);
        let (encoded, root_hash) = encode(&content, true);
        let decoded = decode(&encoded, &root_hash, Some(&content)).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn root_hash_equals_plain_blake3() {
        for n in [0usize, 500, 1024, 16384, 17408] {
            let content = test_input(n);
            let (_, root_hash) = encode(&content, false);
            assert_eq!(root_hash, hash(&content));
        }
    }

    #[test_log::test]
    fn corrupted_chunk_fails_verification() {
        let content = test_input(5000);
        let (mut encoded, root_hash) = encode(&content, false);
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert!(matches!(
            decode(&encoded, &root_hash, None),
            Err(Error::VerificationFailed)
        ));
    }

    #[test]
    fn corrupted_parent_fails_verification() {
        let content = test_input(5000);
        let (mut encoded, root_hash) = encode(&content, false);
        encoded[8] ^= 0xFF;
        assert!(matches!(
            decode(&encoded, &root_hash, None),
            Err(Error::VerificationFailed)
        ));
    }

    #[test]
    fn streaming_encoder_decoder_round_trip() {
        let content = test_input(10_000);
        let mut encoder = BaoEncoder::new();
        encoder.update(Bytes::copy_from_slice(&content[..3000]));
        encoder.update(Bytes::copy_from_slice(&content[3000..]));
        let (encoded, root_hash) = encoder.finalize(false);

        let mut decoder = BaoDecoder::new();
        decoder.update(Bytes::copy_from_slice(&encoded[..100]));
        decoder.update(Bytes::copy_from_slice(&encoded[100..]));
        let decoded = decoder.finalize(&root_hash, None).unwrap();
        assert_eq!(decoded, content);
    }
}
