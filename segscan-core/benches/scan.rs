//! Scan path benchmarks
//!
//! Run with: cargo bench -p segscan-core --bench scan

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use segscan_core::structures::{PackedBits, bitpack_write};
use segscan_core::{
    AggregationFunction, AggregationService, BitmapCombiner, DocId, OwnedBytes, RoaringBitmap,
    ScanConfig, Segment,
};

fn bench_unpack(c: &mut Criterion) {
    let mut group = c.benchmark_group("unpack");
    let count = 100_000usize;
    for bits in [3u8, 9, 17] {
        let mut rng = StdRng::seed_from_u64(bits as u64);
        let max = (1u32 << bits) - 1;
        let values: Vec<u32> = (0..count).map(|_| rng.gen_range(0..=max)).collect();
        let mut packed = Vec::new();
        bitpack_write(&values, bits, &mut packed);
        let reader = PackedBits::open(OwnedBytes::new(packed), bits, count).unwrap();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("get", bits), &reader, |b, reader| {
            b.iter(|| {
                let mut acc = 0u64;
                for i in 0..reader.len() {
                    acc += reader.get(i) as u64;
                }
                black_box(acc)
            })
        });
        group.bench_with_input(BenchmarkId::new("read_range", bits), &reader, |b, reader| {
            let mut out = Vec::with_capacity(count);
            b.iter(|| {
                out.clear();
                reader.read_range_into(0, reader.len(), &mut out);
                black_box(out.len())
            })
        });
    }
    group.finish();
}

fn sparse_bitmaps(n: usize, per_bitmap: usize, max_doc: u32) -> Vec<Arc<RoaringBitmap>> {
    let mut rng = StdRng::seed_from_u64(n as u64);
    (0..n)
        .map(|_| {
            Arc::new(
                (0..per_bitmap)
                    .map(|_| rng.gen_range(0..max_doc))
                    .collect::<RoaringBitmap>(),
            )
        })
        .collect()
}

fn bench_union(c: &mut Criterion) {
    let mut group = c.benchmark_group("union");
    for n in [4usize, 64, 512] {
        let bitmaps = sparse_bitmaps(n, 200, 1_000_000);
        group.bench_with_input(BenchmarkId::new("tree", n), &bitmaps, |b, bitmaps| {
            b.iter(|| BitmapCombiner::union(black_box(bitmaps)))
        });
        group.bench_with_input(BenchmarkId::new("sequential", n), &bitmaps, |b, bitmaps| {
            b.iter(|| {
                bitmaps
                    .iter()
                    .fold(RoaringBitmap::new(), |acc, bm| acc.or(bm))
            })
        });
    }
    group.finish();
}

struct Count;

impl AggregationFunction for Count {
    type Output = usize;

    fn name(&self) -> &str {
        "count"
    }

    fn aggregate(&self, doc_ids: &[DocId], _segment: &Segment) -> segscan_core::Result<usize> {
        Ok(doc_ids.len())
    }
}

fn bench_batching(c: &mut Criterion) {
    let segment = Segment::new("bench", 1_000_000, ScanConfig::default());
    let mut group = c.benchmark_group("aggregation");
    for batch_size in [512usize, 5000, 65_536] {
        group.throughput(Throughput::Elements(1_000_000));
        group.bench_with_input(
            BenchmarkId::new("pull", batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    let functions: Vec<Box<dyn AggregationFunction<Output = usize>>> =
                        vec![Box::new(Count)];
                    let mut service =
                        AggregationService::with_batch_size(functions, batch_size).unwrap();
                    service
                        .aggregate_on_segment(0..1_000_000, &segment)
                        .unwrap();
                    black_box(service.flush_count())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_unpack, bench_union, bench_batching);
criterion_main!(benches);
