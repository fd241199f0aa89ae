use std::io::Cursor;

use annbench::codec::{encode_id_record, encode_vector_record, GroundTruthReader, VectorReader};
use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use futures::StreamExt;

const NUM_RECORDS: usize = 10_000;
const DIMENSION: usize = 128;
const NEIGHBORS: usize = 100;

fn vector_file() -> Vec<u8> {
    let mut rng = fastrand::Rng::with_seed(1);
    let mut buf = BytesMut::new();
    for _ in 0..NUM_RECORDS {
        let vector: Vec<f32> = (0..DIMENSION).map(|_| rng.f32()).collect();
        encode_vector_record(&mut buf, &vector).unwrap();
    }
    buf.to_vec()
}

fn ground_truth_file() -> Vec<u8> {
    let mut rng = fastrand::Rng::with_seed(2);
    let mut buf = BytesMut::new();
    for _ in 0..NUM_RECORDS {
        let ids: Vec<u64> = (0..NEIGHBORS).map(|_| rng.u64(0..1_000_000)).collect();
        encode_id_record(&mut buf, &ids).unwrap();
    }
    buf.to_vec()
}

pub fn benchmark(c: &mut Criterion) {
    let runner = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create runtime");

    let vectors = vector_file();
    let truth = ground_truth_file();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(vectors.len() as u64));
    group.bench_function("vector records", |b| {
        b.to_async(&runner).iter(|| async {
            let mut reader = VectorReader::new(Cursor::new(vectors.as_slice()));
            let mut count = 0;
            while reader.next_vector().await.unwrap().is_some() {
                count += 1;
            }
            assert_eq!(count, NUM_RECORDS);
        });
    });

    group.bench_function("vector stream", |b| {
        b.to_async(&runner).iter(|| async {
            let stream = VectorReader::new(Cursor::new(vectors.as_slice())).into_stream();
            let count = stream.filter(|item| futures::future::ready(item.is_ok())).count().await;
            assert_eq!(count, NUM_RECORDS);
        });
    });

    group.throughput(Throughput::Bytes(truth.len() as u64));
    group.bench_function("ground truth records", |b| {
        b.to_async(&runner).iter(|| async {
            let mut reader = GroundTruthReader::new(Cursor::new(truth.as_slice()));
            while reader.next_set().await.unwrap().is_some() {}
            assert_eq!(reader.records_read(), NUM_RECORDS as u64);
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
