//! Benchmarks for row normalization and local persistence.
//!
//! Run with: cargo bench -p vector-export

#![allow(clippy::pedantic)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tempfile::TempDir;

use vector_export::config::OutputOptions;
use vector_export::normalize::{Normalizer, RawRecord};
use vector_export::schema::{Backend, CollectionDescriptor, CollectionInfo, Metadata, SparseValues};
use vector_export::{LocalSink, RowLayout, RowSink};

fn raw_records(count: usize, dimension: usize, sparse: bool) -> Vec<RawRecord> {
    (0..count)
        .map(|i| RawRecord {
            id: format!("doc-{i}"),
            vector: (0..dimension).map(|d| (i + d) as f32 * 0.001).collect(),
            sparse: sparse.then(|| SparseValues::from([(i as u32, 0.5), (i as u32 + 7, 0.25)])),
            metadata: Metadata::from([
                ("doc_id".to_string(), json!(format!("doc-{i}"))),
                ("title".to_string(), json!(format!("Document {i}"))),
                ("tags".to_string(), json!(["a", "b"])),
            ]),
            references: Vec::new(),
        })
        .collect()
}

/// Normalization of one page at common embedding sizes.
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_page");
    for dimension in [384, 768, 1536] {
        let info = CollectionInfo {
            dimension: Some(dimension),
            ..Default::default()
        };
        let normalizer = Normalizer::new(&info, RowLayout::default());
        let page = raw_records(100, dimension, false);

        group.throughput(Throughput::Elements(page.len() as u64));
        group.bench_with_input(BenchmarkId::new("dimension", dimension), &page, |b, page| {
            b.iter(|| {
                for raw in page.iter().cloned() {
                    black_box(normalizer.normalize(raw).unwrap());
                }
            })
        });
    }
    group.finish();
}

/// Appending and finalizing a collection through the local sink.
fn bench_sink(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_sink");
    group.sample_size(10);

    for (label, sparse) in [("dense", false), ("hybrid", true)] {
        let info = CollectionInfo {
            dimension: Some(384),
            sparse,
            ..Default::default()
        };
        let layout = RowLayout {
            sparse_values: sparse,
            cross_references: false,
        };
        let normalizer = Normalizer::new(&info, layout);
        let rows: Vec<_> = raw_records(2_000, 384, sparse)
            .into_iter()
            .map(|raw| normalizer.normalize(raw).unwrap())
            .collect();

        group.throughput(Throughput::Elements(rows.len() as u64));
        group.bench_with_input(BenchmarkId::new("export_2000", label), &rows, |b, rows| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let output = OutputOptions {
                    dir: dir.path().to_path_buf(),
                    batch_size: 500,
                    ..Default::default()
                };
                let mut sink = LocalSink::open(&output, Backend::Qdrant, "bench").unwrap();
                let collection = CollectionDescriptor::qdrant("bench");
                sink.begin(&collection, layout).unwrap();
                sink.append(rows.clone()).unwrap();
                black_box(sink.finalize(&collection).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_sink);
criterion_main!(benches);
