//! Benchmarks for the stream codec.
//!
//! # Targets
//!
//! | Operation | Target |
//! |-----------|--------|
//! | encode flat record | < 2μs |
//! | decode flat record | < 4μs |
//! | encode 400-node shared graph | < 1ms |
//! | primitive array throughput | > 500 MB/s |
//!
//! # Usage
//!
//! ```bash
//! cargo bench -p object-graph-stream --bench codec_bench
//! ```

use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use object_graph_core::{
    ArrayValue, PrimKind, RecordValue, TypeDescriptor, TypeRegistration, TypeRegistry, Value,
};
use object_graph_stream::{Decoder, Encoder};

const SEED: u64 = 42;

fn sample_descriptor() -> Arc<TypeDescriptor> {
    TypeDescriptor::builder("bench.Sample")
        .prim_field("id", PrimKind::I64)
        .prim_field("score", PrimKind::F64)
        .prim_field("grade", PrimKind::I32)
        .ref_field("label")
        .build()
        .unwrap()
}

fn link_descriptor() -> Arc<TypeDescriptor> {
    TypeDescriptor::builder("bench.Link")
        .prim_field("id", PrimKind::I64)
        .ref_field("next")
        .ref_field("tag")
        .build()
        .unwrap()
}

fn registry_for(desc: &Arc<TypeDescriptor>) -> Arc<TypeRegistry> {
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register(TypeRegistration::new(Arc::clone(desc)))
        .unwrap();
    registry
}

fn make_record(desc: &Arc<TypeDescriptor>, rng: &mut StdRng) -> Value {
    let value = Value::record(Arc::clone(desc));
    if let Value::Record(rc) = &value {
        let mut rec = rc.borrow_mut();
        rec.set("id", Value::from(rng.gen::<i64>())).unwrap();
        rec.set("score", Value::from(rng.gen::<f64>())).unwrap();
        rec.set("grade", Value::from(rng.gen_range(0..100i32)))
            .unwrap();
        rec.set("label", Value::str(format!("sample-{}", rng.gen::<u16>())))
            .unwrap();
    }
    value
}

/// A ring of `len` records where every node also shares one tag string.
fn make_ring(desc: &Arc<TypeDescriptor>, len: usize, rng: &mut StdRng) -> Value {
    let shared_tag = Value::str("ring-tag");
    let nodes: Vec<(Value, Rc<RefCell<RecordValue>>)> = (0..len)
        .map(|_| {
            let value = Value::record(Arc::clone(desc));
            let rc = match &value {
                Value::Record(rc) => Rc::clone(rc),
                _ => unreachable!(),
            };
            rc.borrow_mut()
                .set("id", Value::from(rng.gen::<i64>()))
                .unwrap();
            rc.borrow_mut().set("tag", shared_tag.clone()).unwrap();
            (value, rc)
        })
        .collect();
    for i in 0..len {
        let next = nodes[(i + 1) % len].0.clone();
        nodes[i].1.borrow_mut().set("next", next).unwrap();
    }
    nodes[0].0.clone()
}

fn encode_to_vec(registry: &Arc<TypeRegistry>, roots: &[Value]) -> Vec<u8> {
    let mut encoder = Encoder::new(Vec::new(), Arc::clone(registry)).unwrap();
    for root in roots {
        encoder.write_value(root).unwrap();
    }
    encoder.finish().unwrap()
}

fn bench_encode_records(c: &mut Criterion) {
    let desc = sample_descriptor();
    let registry = registry_for(&desc);
    let mut rng = StdRng::seed_from_u64(SEED);

    let mut group = c.benchmark_group("codec/encode_records");
    for count in [10usize, 100, 1000] {
        let roots: Vec<Value> = (0..count).map(|_| make_record(&desc, &mut rng)).collect();
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &roots, |b, roots| {
            b.iter(|| {
                let mut encoder =
                    Encoder::new(Vec::with_capacity(64 * count), Arc::clone(&registry)).unwrap();
                for root in roots {
                    encoder.write_value(root).unwrap();
                }
                black_box(encoder.finish().unwrap())
            });
        });
    }
    group.finish();
}

fn bench_decode_records(c: &mut Criterion) {
    let desc = sample_descriptor();
    let registry = registry_for(&desc);
    let mut rng = StdRng::seed_from_u64(SEED);

    let mut group = c.benchmark_group("codec/decode_records");
    for count in [10usize, 100, 1000] {
        let roots: Vec<Value> = (0..count).map(|_| make_record(&desc, &mut rng)).collect();
        let bytes = encode_to_vec(&registry, &roots);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &bytes, |b, bytes| {
            b.iter(|| {
                let mut decoder =
                    Decoder::new(Cursor::new(bytes.as_slice()), Arc::clone(&registry)).unwrap();
                for _ in 0..count {
                    black_box(decoder.read_value().unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_shared_graph(c: &mut Criterion) {
    let desc = link_descriptor();
    let registry = registry_for(&desc);
    let mut rng = StdRng::seed_from_u64(SEED);

    let mut group = c.benchmark_group("codec/shared_graph");
    // Rings recurse one level per node; stay under the default depth cap.
    for len in [100usize, 400] {
        let ring = make_ring(&desc, len, &mut rng);
        let bytes = encode_to_vec(&registry, std::slice::from_ref(&ring));
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("encode", len), &ring, |b, ring| {
            b.iter(|| {
                let mut encoder = Encoder::new(Vec::new(), Arc::clone(&registry)).unwrap();
                encoder.write_value(ring).unwrap();
                black_box(encoder.finish().unwrap())
            });
        });
        group.bench_with_input(BenchmarkId::new("decode", len), &bytes, |b, bytes| {
            b.iter(|| {
                let mut decoder =
                    Decoder::new(Cursor::new(bytes.as_slice()), Arc::clone(&registry)).unwrap();
                black_box(decoder.read_value().unwrap());
            });
        });
    }
    group.finish();
}

fn bench_primitive_arrays(c: &mut Criterion) {
    let registry = Arc::new(TypeRegistry::new());
    let mut rng = StdRng::seed_from_u64(SEED);

    let mut group = c.benchmark_group("codec/prim_arrays");
    for len in [1_000usize, 10_000] {
        let values: Vec<i64> = (0..len).map(|_| rng.gen()).collect();
        let array = Value::array(ArrayValue::I64(values));
        let bytes = encode_to_vec(&registry, std::slice::from_ref(&array));
        group.throughput(Throughput::Bytes((len * 8) as u64));
        group.bench_with_input(BenchmarkId::new("encode", len), &array, |b, array| {
            b.iter(|| {
                let mut encoder = Encoder::new(Vec::new(), Arc::clone(&registry)).unwrap();
                encoder.write_value(array).unwrap();
                black_box(encoder.finish().unwrap())
            });
        });
        group.bench_with_input(BenchmarkId::new("decode", len), &bytes, |b, bytes| {
            b.iter(|| {
                let mut decoder =
                    Decoder::new(Cursor::new(bytes.as_slice()), Arc::clone(&registry)).unwrap();
                black_box(decoder.read_value().unwrap());
            });
        });
    }
    group.finish();
}

fn bench_string_pool(c: &mut Criterion) {
    let registry = Arc::new(TypeRegistry::new());
    let mut rng = StdRng::seed_from_u64(SEED);

    // After the first pass through the pool every write is a back reference.
    let pool: Vec<Value> = (0..50)
        .map(|i| Value::str(format!("pooled-string-{i}-{}", rng.gen::<u32>())))
        .collect();
    let roots: Vec<Value> = (0..1000).map(|i| pool[i % pool.len()].clone()).collect();
    let bytes = encode_to_vec(&registry, &roots);

    let mut group = c.benchmark_group("codec/string_pool");
    group.throughput(Throughput::Elements(roots.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| {
            let mut encoder = Encoder::new(Vec::new(), Arc::clone(&registry)).unwrap();
            for root in &roots {
                encoder.write_value(root).unwrap();
            }
            black_box(encoder.finish().unwrap())
        });
    });
    group.bench_function("decode", |b| {
        b.iter(|| {
            let mut decoder =
                Decoder::new(Cursor::new(bytes.as_slice()), Arc::clone(&registry)).unwrap();
            for _ in 0..roots.len() {
                black_box(decoder.read_value().unwrap());
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_encode_records,
    bench_decode_records,
    bench_shared_graph,
    bench_primitive_arrays,
    bench_string_pool
);
criterion_main!(benches);
