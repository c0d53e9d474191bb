//! BLAKE3 compression, chunk hashing, and the incremental tree hasher.
//!
//! This module is a from-scratch port of the BLAKE3 reference algorithm: a
//! 7-round ARX compression function (`compress`), a chunk-level state
//! machine that buffers input into 64-byte blocks (`chunk`), and a tree
//! hasher that merges chunk chaining values along a fixed-capacity subtree
//! stack (`hasher`). Bao (see [`crate::bao`]) calls directly into `compress`
//! and `chunk` for its own leaf/parent chaining values rather than going
//! through the tree hasher, since its tree shape differs once a variant
//! (e.g. chunk groups) is in play.

pub mod chunk;
pub mod compress;
pub mod hasher;

pub use compress::{Compressor, ScalarCompressor, CHUNK_LEN, KEY_LEN, OUT_LEN};
pub use hasher::{derive_key, hash, keyed_hash, Hash, Hasher, Mode, OutputReader};
