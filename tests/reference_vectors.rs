//! Parameterized reference-vector tests against the official BLAKE3 test
//! vectors (`input_n[i] = i mod 251`).

use rstest::rstest;

use bao3::bao;
use bao3::blake3::hash;

fn test_input(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8).collect()
}

#[rstest]
#[case(0, "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262")]
#[case(1, "2d3adedff11b61f14c886e35afa036736dcd87a74d27b5c1510225d0f592e213")]
#[case(1024, "42214739f095a406f3fc83deb889744ac00df831c10daa55189b5d121c855af7")]
#[case(1025, "d00278ae47eb27b34faecf67b4fe263f82d5412916c1ffd97c8cb7fb814b8444")]
#[case(102400, "bc3e3d41a1146b069abffad3c0d44860cf664390afce4d9661f7902e7943e085")]
fn blake3_matches_official_vector(#[case] n: usize, #[case] expected_hex: &str) {
    let digest = hash(&test_input(n));
    assert_eq!(digest.to_hex(), expected_hex, "n={n}");
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(63)]
#[case(64)]
#[case(65)]
#[case(127)]
#[case(128)]
#[case(1023)]
#[case(1024)]
#[case(1025)]
#[case(2048)]
#[case(3072)]
#[case(4096)]
#[case(8192)]
#[case(16384)]
#[case(102400)]
fn bao_root_hash_matches_plain_blake3_at_every_boundary(#[case] n: usize) {
    let content = test_input(n);
    let (_, root_hash) = bao::encode(&content, false);
    assert_eq!(root_hash, hash(&content), "n={n}");
}
