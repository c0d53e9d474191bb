//! The BLAKE3 compression function.

pub const OUT_LEN: usize = 32;
pub const KEY_LEN: usize = 32;
pub const BLOCK_LEN: usize = 64;
pub const CHUNK_LEN: usize = 1024;

pub const CHUNK_START: u32 = 1 << 0;
pub const CHUNK_END: u32 = 1 << 1;
pub const PARENT: u32 = 1 << 2;
pub const ROOT: u32 = 1 << 3;
pub const KEYED_HASH: u32 = 1 << 4;
pub const DERIVE_KEY_CONTEXT: u32 = 1 << 5;
pub const DERIVE_KEY_MATERIAL: u32 = 1 << 6;

pub const IV: [u32; 8] = [
    0x6A09E667, 0xBB67AE85, 0x3C6EF372, 0xA54FF53A, 0x510E527F, 0x9B05688C, 0x1F83D9AB, 0x5BE0CD19,
];

const MSG_PERMUTATION: [usize; 16] = [2, 6, 3, 10, 7, 0, 4, 13, 1, 11, 12, 5, 9, 14, 15, 8];

fn g(state: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize, mx: u32, my: u32) {
    state[a] = state[a].wrapping_add(state[b]).wrapping_add(mx);
    state[d] = (state[d] ^ state[a]).rotate_right(16);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_right(12);
    state[a] = state[a].wrapping_add(state[b]).wrapping_add(my);
    state[d] = (state[d] ^ state[a]).rotate_right(8);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_right(7);
}

fn round(state: &mut [u32; 16], m: &[u32; 16]) {
    // Mix the columns.
    g(state, 0, 4, 8, 12, m[0], m[1]);
    g(state, 1, 5, 9, 13, m[2], m[3]);
    g(state, 2, 6, 10, 14, m[4], m[5]);
    g(state, 3, 7, 11, 15, m[6], m[7]);
    // Mix the diagonals.
    g(state, 0, 5, 10, 15, m[8], m[9]);
    g(state, 1, 6, 11, 12, m[10], m[11]);
    g(state, 2, 7, 8, 13, m[12], m[13]);
    g(state, 3, 4, 9, 14, m[14], m[15]);
}

fn permute(m: &mut [u32; 16]) {
    let mut permuted = [0; 16];
    for i in 0..16 {
        permuted[i] = m[MSG_PERMUTATION[i]];
    }
    *m = permuted;
}

/// Runs the seven-round compression function and returns the full 16-word
/// post-mix state (not yet XOR-folded into a chaining value).
pub fn compress(
    chaining_value: &[u32; 8],
    block_words: &[u32; 16],
    counter: u64,
    block_len: u32,
    flags: u32,
) -> [u32; 16] {
    let counter_low = counter as u32;
    let counter_high = (counter >> 32) as u32;
    #[rustfmt::skip]
    let mut state = [
        chaining_value[0], chaining_value[1], chaining_value[2], chaining_value[3],
        chaining_value[4], chaining_value[5], chaining_value[6], chaining_value[7],
        IV[0], IV[1], IV[2], IV[3],
        counter_low, counter_high, block_len, flags,
    ];
    let mut block = *block_words;

    round(&mut state, &block);
    permute(&mut block);
    round(&mut state, &block);
    permute(&mut block);
    round(&mut state, &block);
    permute(&mut block);
    round(&mut state, &block);
    permute(&mut block);
    round(&mut state, &block);
    permute(&mut block);
    round(&mut state, &block);
    permute(&mut block);
    round(&mut state, &block);

    for i in 0..8 {
        state[i] ^= state[i + 8];
        state[i + 8] ^= chaining_value[i];
    }
    state
}

pub fn first_8_words(state: [u32; 16]) -> [u32; 8] {
    state[..8].try_into().unwrap()
}

/// Converts an 8-word chaining value to its little-endian byte form (the
/// shape used on the wire and as a `blake3::Hash`'s bytes).
pub fn cv_to_bytes(cv: [u32; 8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, word) in cv.iter().enumerate() {
        out[4 * i..4 * i + 4].copy_from_slice(&word.to_le_bytes());
    }
    out
}

/// Inverse of [`cv_to_bytes`].
pub fn bytes_to_cv(bytes: &[u8; 32]) -> [u32; 8] {
    let mut words = [0u32; 8];
    words_from_little_endian_bytes(bytes, &mut words);
    words
}

pub fn words_from_little_endian_bytes(bytes: &[u8], words: &mut [u32]) {
    debug_assert_eq!(bytes.len(), 4 * words.len());
    for (i, word) in words.iter_mut().enumerate() {
        let mut chunk = [0u8; 4];
        chunk.copy_from_slice(&bytes[4 * i..4 * i + 4]);
        *word = u32::from_le_bytes(chunk);
    }
}

/// A single [`Compressor`] call is equivalent to `K` independent calls to
/// [`compress`] for the same `K`-sized batch of inputs. A batched
/// implementation (e.g. SIMD lanes of width 2/4/8/16) may be substituted for
/// [`ScalarCompressor`] without changing any observable output, since every
/// caller only ever relies on this equivalence law.
pub trait Compressor {
    fn compress_one(
        &self,
        chaining_value: &[u32; 8],
        block_words: &[u32; 16],
        counter: u64,
        block_len: u32,
        flags: u32,
    ) -> [u32; 16] {
        compress(chaining_value, block_words, counter, block_len, flags)
    }

    /// Compresses `inputs.len()` independent blocks. The default
    /// implementation simply loops; a SIMD backend would instead process
    /// several lanes per instruction while preserving the same outputs.
    fn compress_many(&self, inputs: &[CompressInput]) -> Vec<[u32; 16]> {
        inputs
            .iter()
            .map(|input| {
                self.compress_one(
                    &input.chaining_value,
                    &input.block_words,
                    input.counter,
                    input.block_len,
                    input.flags,
                )
            })
            .collect()
    }
}

/// One independent compression call, as passed to [`Compressor::compress_many`].
#[derive(Clone, Copy)]
pub struct CompressInput {
    pub chaining_value: [u32; 8],
    pub block_words: [u32; 16],
    pub counter: u64,
    pub block_len: u32,
    pub flags: u32,
}

/// The reference scalar implementation. This is the only [`Compressor`]
/// shipped in this crate; it exists so the batched-equivalence contract has
/// a concrete, always-correct default to fall back to.
#[derive(Default, Clone, Copy)]
pub struct ScalarCompressor;

impl Compressor for ScalarCompressor {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_many_matches_scalar_loop() {
        let compressor = ScalarCompressor;
        let inputs = vec![
            CompressInput {
                chaining_value: IV,
                block_words: [0; 16],
                counter: 0,
                block_len: 0,
                flags: CHUNK_START | CHUNK_END | ROOT,
            },
            CompressInput {
                chaining_value: IV,
                block_words: [1; 16],
                counter: 7,
                block_len: 64,
                flags: PARENT,
            },
        ];
        let batched = compressor.compress_many(&inputs);
        for (input, expected) in inputs.iter().zip(batched.iter()) {
            let scalar = compress(
                &input.chaining_value,
                &input.block_words,
                input.counter,
                input.block_len,
                input.flags,
            );
            assert_eq!(&scalar, expected);
        }
    }
}
