//! The incremental tree hasher: absorbs bytes chunk by chunk, maintains the
//! subtree merge stack, and finalizes to a root hash or an extendable output
//! stream.

use crate::error::{Error, Result};

use super::chunk::{parent_cv, parent_output, ChunkState, Output};
use super::compress::{
    words_from_little_endian_bytes, CHUNK_LEN, DERIVE_KEY_CONTEXT, DERIVE_KEY_MATERIAL, IV,
    KEYED_HASH, KEY_LEN, OUT_LEN, ROOT,
};

/// How a [`Hasher`] derives its initial key words and mode flags.
#[derive(Clone)]
pub enum Mode {
    Hash,
    Keyed([u8; KEY_LEN]),
    DeriveKey(String),
}

/// A 32-byte BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash([u8; OUT_LEN]);

impl Hash {
    pub fn as_bytes(&self) -> &[u8; OUT_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::MalformedInput(format!("invalid hex hash: {e}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != OUT_LEN {
            return Err(Error::MalformedInput(format!(
                "hash must be {OUT_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; OUT_LEN];
        out.copy_from_slice(bytes);
        Ok(Hash(out))
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; OUT_LEN]> for Hash {
    fn from(bytes: [u8; OUT_LEN]) -> Self {
        Hash(bytes)
    }
}

impl serde::Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

fn key_bytes_to_words(key: &[u8; KEY_LEN]) -> [u32; 8] {
    let mut words = [0u32; 8];
    words_from_little_endian_bytes(key, &mut words);
    words
}

/// Maximum tree depth: enough subtree levels to cover 2^64 chunks.
const MAX_STACK_DEPTH: usize = 54;

/// The incremental BLAKE3 tree hasher.
pub struct Hasher {
    chunk_state: ChunkState,
    key_words: [u32; 8],
    cv_stack: [[u32; 8]; MAX_STACK_DEPTH],
    cv_stack_len: u8,
    flags: u32,
}

impl Hasher {
    fn new_internal(key_words: [u32; 8], flags: u32) -> Self {
        Self {
            chunk_state: ChunkState::new(key_words, 0, flags),
            key_words,
            cv_stack: [[0; 8]; MAX_STACK_DEPTH],
            cv_stack_len: 0,
            flags,
        }
    }

    /// Plain, unkeyed hashing.
    pub fn new() -> Self {
        Self::new_internal(IV, 0)
    }

    /// Keyed hashing (MAC-like use).
    pub fn new_keyed(key: &[u8; KEY_LEN]) -> Self {
        Self::new_internal(key_bytes_to_words(key), KEYED_HASH)
    }

    /// Key derivation: `context` identifies the application and protocol
    /// version; the returned hasher absorbs key material and its output is
    /// the derived key.
    pub fn new_derive_key(context: &str) -> Self {
        let mut context_hasher = Self::new_internal(IV, DERIVE_KEY_CONTEXT);
        context_hasher.update(context.as_bytes());
        let context_key_words = context_hasher.finalize_key_words();
        Self::new_internal(context_key_words, DERIVE_KEY_MATERIAL)
    }

    /// Constructs from an explicit [`Mode`] value.
    pub fn new_with_mode(mode: Mode) -> Self {
        match mode {
            Mode::Hash => Self::new(),
            Mode::Keyed(key) => Self::new_keyed(&key),
            Mode::DeriveKey(ctx) => Self::new_derive_key(&ctx),
        }
    }

    fn push_stack(&mut self, cv: [u32; 8]) {
        self.cv_stack[self.cv_stack_len as usize] = cv;
        self.cv_stack_len += 1;
    }

    fn pop_stack(&mut self) -> [u32; 8] {
        self.cv_stack_len -= 1;
        self.cv_stack[self.cv_stack_len as usize]
    }

    fn add_chunk_chaining_value(&mut self, mut new_cv: [u32; 8], mut total_chunks: u64) {
        // Merge upward for every trailing zero bit of the post-absorption
        // chunk count — equivalently, while the stack holds a sibling at
        // the same level.
        while total_chunks & 1 == 0 {
            new_cv = parent_cv(self.pop_stack(), new_cv, self.key_words, self.flags);
            total_chunks >>= 1;
        }
        self.push_stack(new_cv);
    }

    pub fn update(&mut self, mut input: &[u8]) {
        while !input.is_empty() {
            if self.chunk_state.len() == CHUNK_LEN {
                let chunk_cv = self.chunk_state.output().chaining_value();
                let total_chunks = self.chunk_state.chunk_counter + 1;
                self.add_chunk_chaining_value(chunk_cv, total_chunks);
                self.chunk_state = ChunkState::new(self.key_words, total_chunks, self.flags);
            }

            let want = CHUNK_LEN - self.chunk_state.len();
            let take = want.min(input.len());
            self.chunk_state.update(&input[..take]);
            input = &input[take..];
        }
    }

    fn final_output(&self) -> Output {
        // Pop-and-merge the remaining stack into a single Output, applying
        // ROOT only to the very last merge (or to the chunk itself, if the
        // whole input was a single chunk).
        let mut output = self.chunk_state.output();
        let mut parent_nodes_remaining = self.cv_stack_len as usize;
        while parent_nodes_remaining > 0 {
            parent_nodes_remaining -= 1;
            output = parent_output(
                self.cv_stack[parent_nodes_remaining],
                output.chaining_value(),
                self.key_words,
                self.flags,
            );
        }
        output
    }

    fn finalize_key_words(&self) -> [u32; 8] {
        self.final_output().chaining_value()
    }

    /// Returns the 32-byte digest.
    pub fn finalize(&self) -> Hash {
        Hash(self.final_output().root_output_bytes_32())
    }

    /// Fills an arbitrary-length XOF output buffer.
    pub fn finalize_xof(&self, output_len: usize) -> Result<Vec<u8>> {
        if output_len == 0 {
            return Err(Error::Config("xof output length must be >= 1".into()));
        }
        let mut out = vec![0u8; output_len];
        self.final_output().root_output_bytes(0, &mut out);
        Ok(out)
    }

    /// Returns an incremental reader over the root XOF stream, mirroring the
    /// official BLAKE3 API's `OutputReader`.
    pub fn output_reader(&self) -> OutputReader {
        OutputReader {
            output: self.final_output(),
            position_within_block: 0,
            block_counter: 0,
        }
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    fn root_output_bytes_32(&self) -> [u8; OUT_LEN] {
        let mut out = [0u8; OUT_LEN];
        let words = super::compress::compress(
            &self.input_chaining_value,
            &self.block_words,
            0,
            self.block_len,
            self.flags | ROOT,
        );
        for (i, word) in words[..8].iter().enumerate() {
            out[4 * i..4 * i + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }
}

/// An infinite, counter-indexed stream of XOF bytes read incrementally from
/// a finalized tree hasher's root output.
pub struct OutputReader {
    output: Output,
    position_within_block: usize,
    block_counter: u64,
}

impl OutputReader {
    const BLOCK_BYTES: usize = 2 * super::compress::OUT_LEN;

    /// Fills `buf` entirely, advancing the internal cursor.
    pub fn fill(&mut self, mut buf: &mut [u8]) {
        while !buf.is_empty() {
            let mut block = [0u8; Self::BLOCK_BYTES];
            self.output
                .root_output_bytes(self.block_counter, &mut block[..Self::BLOCK_BYTES]);
            let available = &block[self.position_within_block..];
            let take = available.len().min(buf.len());
            buf[..take].copy_from_slice(&available[..take]);
            buf = &mut buf[take..];
            self.position_within_block += take;
            if self.position_within_block == Self::BLOCK_BYTES {
                self.position_within_block = 0;
                self.block_counter += 1;
            }
        }
    }
}

/// Computes `BLAKE3(input)` in one call.
pub fn hash(input: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(input);
    hasher.finalize()
}

/// Computes keyed BLAKE3 over `input`.
pub fn keyed_hash(key: &[u8; KEY_LEN], input: &[u8]) -> Hash {
    let mut hasher = Hasher::new_keyed(key);
    hasher.update(input);
    hasher.finalize()
}

/// Derives a 32-byte key from `context` and `key_material`.
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; KEY_LEN] {
    let mut hasher = Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_input(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn empty_input_matches_reference_vector() {
        let digest = hash(&[]).to_hex();
        assert_eq!(
            digest,
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn one_byte_matches_reference_vector() {
        let digest = hash(&test_input(1)).to_hex();
        assert_eq!(
            digest,
            "2d3adedff11b61f14c886e35afa036736dcd87a74d27b5c1510225d0f592e213"
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        let input = test_input(5000);
        let one_shot = hash(&input);

        for split in [0, 1, 64, 1023, 1024, 1025, 4096] {
            if split > input.len() {
                continue;
            }
            let mut hasher = Hasher::new();
            hasher.update(&input[..split]);
            hasher.update(&input[split..]);
            assert_eq!(hasher.finalize(), one_shot, "split at {split}");
        }
    }

    #[test]
    fn chunk_boundary_inputs_are_consistent() {
        for n in [0usize, 1, 1023, 1024, 1025, 2048, 3072] {
            let input = test_input(n);
            let mut hasher = Hasher::new();
            hasher.update(&input);
            let direct = hash(&input);
            assert_eq!(hasher.finalize(), direct, "n={n}");
        }
    }

    #[test]
    fn keyed_hash_differs_from_plain_hash() {
        let key = [7u8; KEY_LEN];
        let input = test_input(128);
        assert_ne!(keyed_hash(&key, &input), hash(&input));
    }

    #[test]
    fn derive_key_is_deterministic_and_distinct_from_keyed_hash() {
        let ctx = "BLAKE3 2019-12-27 16:29:52 test vectors context";
        let material = vec![0u8; 32];
        let derived_a = derive_key(ctx, &material);
        let derived_b = derive_key(ctx, &material);
        assert_eq!(derived_a, derived_b);

        let ctx_hash = hash(ctx.as_bytes());
        let via_keyed = keyed_hash(ctx_hash.as_bytes(), &material);
        assert_ne!(derived_a, *via_keyed.as_bytes());
    }

    #[test]
    fn xof_reader_matches_finalize_xof() {
        let mut hasher = Hasher::new();
        hasher.update(b"extendable output");
        let bulk = hasher.finalize_xof(200).unwrap();

        let mut reader = hasher.output_reader();
        let mut incremental = vec![0u8; 200];
        reader.fill(&mut incremental[..37]);
        reader.fill(&mut incremental[37..]);
        assert_eq!(bulk, incremental);
    }

    #[test]
    fn zero_length_xof_is_a_config_error() {
        let hasher = Hasher::new();
        assert!(hasher.finalize_xof(0).is_err());
    }
}
