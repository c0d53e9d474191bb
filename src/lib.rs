//! # bao3
//!
//! BLAKE3 cryptographic hashing together with the Bao verified-streaming
//! construction built on top of it.
//!
//! - [`blake3`] — the compression primitive, chunk hasher, and incremental
//!   tree hasher (hash / keyed / key-derivation modes, XOF output).
//! - [`bao`] — the Bao tree codec: whole-content encode/decode
//!   ([`bao::tree`]), range slicing with inclusion proofs
//!   ([`bao::slice`]), the Iroh-compatible chunk-group variant
//!   ([`bao::group`]), a partial/out-of-order receiver
//!   ([`bao::partial`]), and a parallel encoder
//!   ([`bao::parallel`]).
//! - [`hash_sequence`] — a small ordered-digest-list value type.
//!
//! ## Example
//!
//! ```
//! let (encoded, root_hash) = bao3::bao::encode(b"hello world", false);
//! let decoded = bao3::bao::decode(&encoded, &root_hash, None).unwrap();
//! assert_eq!(decoded, b"hello world");
//! assert_eq!(root_hash, bao3::blake3::hash(b"hello world"));
//! ```

pub mod bao;
pub mod blake3;
pub mod constant_time;
pub mod error;
pub mod hash_sequence;

pub use error::{Error, Result};
