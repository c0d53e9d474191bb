//! Chunk-level hashing: streams up to [`CHUNK_LEN`] bytes through
//! [`compress`] block by block and produces either a non-root chaining
//! value or, for the lone chunk of a short input, a root XOF stream.

use super::compress::{
    compress, first_8_words, words_from_little_endian_bytes, BLOCK_LEN, CHUNK_END, CHUNK_LEN,
    CHUNK_START, OUT_LEN, ROOT,
};

/// The output of a finalized chunk or parent node: everything needed to
/// derive either its 32-byte chaining value or a longer XOF stream.
#[derive(Clone)]
pub struct Output {
    pub input_chaining_value: [u32; 8],
    pub block_words: [u32; 16],
    pub counter: u64,
    pub block_len: u32,
    pub flags: u32,
}

impl Output {
    pub fn chaining_value(&self) -> [u32; 8] {
        self.chaining_value_with_flags(0)
    }

    /// Chaining value as if `extra_flags` were additionally set — used by
    /// Bao to compute root chaining values without re-finalizing the node.
    pub fn chaining_value_with_flags(&self, extra_flags: u32) -> [u32; 8] {
        let state = compress(
            &self.input_chaining_value,
            &self.block_words,
            self.counter,
            self.block_len,
            self.flags | extra_flags,
        );
        first_8_words(state)
    }

    /// The chaining value this node would have if it were the root of the
    /// whole tree.
    pub fn root_chaining_value(&self) -> [u32; 8] {
        self.chaining_value_with_flags(ROOT)
    }

    /// Fills `out_slice` with root output bytes starting at the
    /// `2 * OUT_LEN`-byte block indexed by `start_block`, re-compressing
    /// with an incrementing counter for every block requested. Callers that
    /// want bytes `[0, n)` pass `start_block = 0`; an incremental reader
    /// resuming mid-stream passes its current block index instead.
    pub fn root_output_bytes(&self, start_block: u64, out_slice: &mut [u8]) {
        for (offset, out_block) in out_slice.chunks_mut(2 * OUT_LEN).enumerate() {
            let counter = start_block + offset as u64;
            let words = compress(
                &self.input_chaining_value,
                &self.block_words,
                counter,
                self.block_len,
                self.flags | ROOT,
            );
            for (word, out_word) in words.iter().zip(out_block.chunks_mut(4)) {
                let bytes = word.to_le_bytes();
                out_word.copy_from_slice(&bytes[..out_word.len()]);
            }
        }
    }
}

/// Accumulates up to 1024 bytes of chunk input, compressing each completed
/// 64-byte block as soon as it is known not to be the chunk's last.
pub struct ChunkState {
    pub chaining_value: [u32; 8],
    pub chunk_counter: u64,
    block: [u8; BLOCK_LEN],
    block_len: u8,
    blocks_compressed: u8,
    pub flags: u32,
}

impl ChunkState {
    pub fn new(key_words: [u32; 8], chunk_counter: u64, flags: u32) -> Self {
        Self {
            chaining_value: key_words,
            chunk_counter,
            block: [0; BLOCK_LEN],
            block_len: 0,
            blocks_compressed: 0,
            flags,
        }
    }

    pub fn len(&self) -> usize {
        BLOCK_LEN * self.blocks_compressed as usize + self.block_len as usize
    }

    fn start_flag(&self) -> u32 {
        if self.blocks_compressed == 0 {
            CHUNK_START
        } else {
            0
        }
    }

    pub fn update(&mut self, mut input: &[u8]) {
        while !input.is_empty() {
            if self.block_len as usize == BLOCK_LEN {
                let mut block_words = [0u32; 16];
                words_from_little_endian_bytes(&self.block, &mut block_words);
                let out = compress(
                    &self.chaining_value,
                    &block_words,
                    self.chunk_counter,
                    BLOCK_LEN as u32,
                    self.flags | self.start_flag(),
                );
                self.chaining_value = first_8_words(out);
                self.blocks_compressed += 1;
                self.block = [0; BLOCK_LEN];
                self.block_len = 0;
            }

            let want = BLOCK_LEN - self.block_len as usize;
            let take = want.min(input.len());
            self.block[self.block_len as usize..self.block_len as usize + take]
                .copy_from_slice(&input[..take]);
            self.block_len += take as u8;
            input = &input[take..];
        }
    }

    pub fn output(&self) -> Output {
        let mut block_words = [0u32; 16];
        words_from_little_endian_bytes(&self.block, &mut block_words);
        Output {
            input_chaining_value: self.chaining_value,
            block_words,
            counter: self.chunk_counter,
            block_len: self.block_len as u32,
            flags: self.flags | self.start_flag() | CHUNK_END,
        }
    }
}

pub fn parent_output(
    left_child_cv: [u32; 8],
    right_child_cv: [u32; 8],
    key_words: [u32; 8],
    flags: u32,
) -> Output {
    let mut block_words = [0u32; 16];
    block_words[..8].copy_from_slice(&left_child_cv);
    block_words[8..].copy_from_slice(&right_child_cv);
    Output {
        input_chaining_value: key_words,
        block_words,
        counter: 0,
        block_len: BLOCK_LEN as u32,
        flags: super::compress::PARENT | flags,
    }
}

pub fn parent_cv(
    left_child_cv: [u32; 8],
    right_child_cv: [u32; 8],
    key_words: [u32; 8],
    flags: u32,
) -> [u32; 8] {
    parent_output(left_child_cv, right_child_cv, key_words, flags).chaining_value()
}

/// Hashes a single chunk (at most [`CHUNK_LEN`] bytes) and returns its
/// `Output`, ready for either non-root chaining-value extraction or, if this
/// is the only chunk in the whole input, root XOF extraction.
pub fn hash_chunk(input: &[u8], key_words: [u32; 8], chunk_counter: u64, flags: u32) -> Output {
    debug_assert!(input.len() <= CHUNK_LEN);
    let mut state = ChunkState::new(key_words, chunk_counter, flags);
    state.update(input);
    state.output()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blake3::compress::IV;

    #[test]
    fn empty_chunk_len_is_zero() {
        let state = ChunkState::new(IV, 0, 0);
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn chunk_state_accumulates_across_updates() {
        let mut state = ChunkState::new(IV, 0, 0);
        state.update(&[1; 100]);
        state.update(&[2; 50]);
        assert_eq!(state.len(), 150);
    }
}
