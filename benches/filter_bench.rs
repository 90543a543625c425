//! SIEVE - Performance Benchmarks
//! Measures throughput of filter operations using Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sieve::config::FilterParams;
use sieve::filter::bitmap::MemoryBitmap;
use sieve::filter::bloom::BitVector;
use sieve::filter::local::LocalFilter;
use sieve::filter::shared::SharedFilter;
use sieve::{FilterIdentity, MembershipFilter};

fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://site.example/page/{:06}", i)).collect()
}

fn bench_bit_vector(c: &mut Criterion) {
    let mut group = c.benchmark_group("bit_vector");
    let params = FilterParams::new(10_000, 0.001);
    let items = urls(1000);

    group.bench_function("insert_1000", |b| {
        b.iter(|| {
            let mut bv = BitVector::try_new(&params).unwrap();
            for item in &items {
                bv.insert(black_box(item.as_bytes()));
            }
        });
    });

    group.bench_function("lookup_hit", |b| {
        let mut bv = BitVector::try_new(&params).unwrap();
        for item in &items {
            bv.insert(item.as_bytes());
        }
        b.iter(|| black_box(bv.may_contain(b"https://site.example/page/000500")));
    });

    group.bench_function("lookup_miss", |b| {
        let mut bv = BitVector::try_new(&params).unwrap();
        for item in &items {
            bv.insert(item.as_bytes());
        }
        b.iter(|| black_box(bv.may_contain(b"https://elsewhere.example/")));
    });

    group.finish();
}

fn bench_local_persist(c: &mut Criterion) {
    let mut group = c.benchmark_group("local");

    for capacity in [10_000, 100_000, 1_000_000].iter() {
        group.bench_with_input(
            BenchmarkId::new("persist", capacity),
            capacity,
            |b, &capacity| {
                let dir = tempfile::tempdir().unwrap();
                let mut filter = LocalFilter::open(
                    FilterIdentity::new("bench").unwrap(),
                    FilterParams::new(capacity, 0.001),
                    dir.path(),
                )
                .unwrap();
                filter.add_all(urls(1000)).unwrap();
                b.iter(|| filter.persist().unwrap());
            },
        );
    }

    group.finish();
}

fn bench_shared_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared_memory");
    let items = urls(1000);

    for batch in [1usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("add_all", batch), batch, |b, &batch| {
            b.iter(|| {
                let mut filter = SharedFilter::with_store(
                    FilterIdentity::new("bench").unwrap(),
                    FilterParams::new(10_000, 0.001),
                    MemoryBitmap::new(),
                )
                .unwrap();
                for chunk in items.chunks(batch) {
                    black_box(filter.add_all(chunk).unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_bit_vector, bench_local_persist, bench_shared_memory);
criterion_main!(benches);
