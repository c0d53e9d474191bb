//! Property tests for the algebraic laws a correct Bao/BLAKE3 implementation
//! must satisfy, regardless of which concrete bytes are fed in.

use proptest::prelude::*;

use bao3::bao::group::{count_groups, ChunkGroupLog};
use bao3::bao::{decode, decode_iroh, decode_slice, encode, encode_iroh, slice};
use bao3::blake3::{hash, Hasher};

/// Bounds test inputs to a handful of chunks so the suite stays fast while
/// still crossing several chunk and parent-merge boundaries.
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..6_000)
}

proptest! {
    #[test]
    fn streaming_equals_one_shot_for_any_split(content in content_strategy(), split in 0usize..6_000) {
        let split = split.min(content.len());
        let mut hasher = Hasher::new();
        hasher.update(&content[..split]);
        hasher.update(&content[split..]);
        prop_assert_eq!(hasher.finalize(), hash(&content));
    }

    #[test]
    fn bao_round_trip_combined(content in content_strategy()) {
        let (encoded, root_hash) = encode(&content, false);
        let decoded = decode(&encoded, &root_hash, None).unwrap();
        prop_assert_eq!(decoded, content);
    }

    #[test]
    fn bao_round_trip_outboard(content in content_strategy()) {
        let (encoded, root_hash) = encode(&content, true);
        let decoded = decode(&encoded, &root_hash, Some(&content)).unwrap();
        prop_assert_eq!(decoded, content);
    }

    #[test]
    fn bao_root_hash_equals_plain_blake3(content in content_strategy()) {
        let (_, root_hash) = encode(&content, false);
        prop_assert_eq!(root_hash, hash(&content));
    }

    #[test]
    fn slice_round_trip_for_any_range(
        content in prop::collection::vec(any::<u8>(), 1..6_000),
        start in 0u64..6_000,
        len in 0u64..2_000,
    ) {
        let (encoded, root_hash) = encode(&content, false);
        let sliced = slice(&encoded, start, len, None).unwrap();
        let decoded = decode_slice(&sliced, &root_hash, start, len).unwrap();

        let content_len = content.len() as u64;
        let clamped_start = start.min(content_len.saturating_sub(1));
        let effective_len = len.max(1);
        let end = (clamped_start + effective_len).min(content_len).max(clamped_start + 1).min(content_len);
        prop_assert_eq!(decoded, content[clamped_start as usize..end as usize].to_vec());
    }

    #[test]
    fn iroh_root_hash_matches_plain_bao_for_any_g(content in content_strategy(), g in 0u8..6) {
        let log = ChunkGroupLog::new(g).unwrap();
        let (_, iroh_root) = encode_iroh(&content, false, log);
        let (_, plain_root) = encode(&content, false);
        prop_assert_eq!(iroh_root, plain_root);
    }

    #[test]
    fn iroh_round_trips_for_any_g(content in content_strategy(), g in 0u8..6) {
        let log = ChunkGroupLog::new(g).unwrap();
        let (encoded, root_hash) = encode_iroh(&content, false, log);
        let decoded = decode_iroh(&encoded, &root_hash, log, None).unwrap();
        prop_assert_eq!(decoded, content);
    }

    #[test]
    fn iroh_group_count_is_at_least_one(content in content_strategy(), g in 0u8..6) {
        let log = ChunkGroupLog::new(g).unwrap();
        prop_assert!(count_groups(content.len() as u64, log) >= 1);
    }
}
