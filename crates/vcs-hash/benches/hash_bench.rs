use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use vcs_hash::zlib::{self, Compression};
use vcs_hash::{HashAlgorithm, Hasher};

fn object_hashing(c: &mut Criterion) {
    let data = vec![0x5au8; 1024 * 1024];
    let mut group = c.benchmark_group("hash_object");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for algo in [HashAlgorithm::Sha1, HashAlgorithm::Sha256] {
        group.bench_function(algo.name(), |b| {
            b.iter(|| Hasher::hash_object(algo, "blob", black_box(&data)))
        });
    }
    group.finish();
}

fn zlib_roundtrip(c: &mut Criterion) {
    let text: Vec<u8> = (0..20_000)
        .flat_map(|i| format!("line {i} of some source file\n").into_bytes())
        .collect();
    let packed = zlib::compress(&text, Compression::default()).unwrap();

    let mut group = c.benchmark_group("zlib");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("compress", |b| {
        b.iter(|| zlib::compress(black_box(&text), Compression::default()))
    });
    group.bench_function("decompress", |b| b.iter(|| zlib::decompress(black_box(&packed))));
    group.finish();
}

criterion_group!(benches, object_hashing, zlib_roundtrip);
criterion_main!(benches);
