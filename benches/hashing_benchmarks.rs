//! Benchmarks for bao3

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bao3::bao::{decode, encode};
use bao3::blake3::hash;

fn bench_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("hashing");

    for size in [1024, 64 * 1024, 1024 * 1024].iter() {
        let data = vec![0u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("blake3", size), &data, |b, data| {
            b.iter(|| hash(data))
        });
    }

    group.finish();
}

fn bench_bao(c: &mut Criterion) {
    let mut group = c.benchmark_group("bao");

    for size in [64 * 1024, 1024 * 1024, 10 * 1024 * 1024].iter() {
        let data = vec![0u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &data, |b, data| {
            b.iter(|| encode(data, false))
        });

        let (encoded, root_hash) = encode(&data, false);
        group.bench_with_input(
            BenchmarkId::new("decode", size),
            &(&encoded, &root_hash),
            |b, (encoded, root_hash)| b.iter(|| decode(encoded, root_hash, None).unwrap()),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_hashing, bench_bao);
criterion_main!(benches);
