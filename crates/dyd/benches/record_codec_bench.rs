//! 🏎️ Record codec benchmarks: how fast can a row become a line and back?
//!
//! Every exported record goes through `encode_record` once and every restored one
//! through `decode_record` once, so these two are the per-record floor of a run.

use std::collections::BTreeMap;
use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use dyd::record::{AttributeValue, Record, decode_record, encode_record};

fn a_typical_order(i: usize) -> Record {
    let address: BTreeMap<String, AttributeValue> = [
        ("street".to_string(), AttributeValue::S("742 Evergreen Terrace".into())),
        ("zip".to_string(), AttributeValue::S("02134".into())),
    ]
    .into_iter()
    .collect();
    Record::new()
        .with("pk", AttributeValue::S(format!("order#{i:08}")))
        .with("total", AttributeValue::N("1234.56".into()))
        .with("paid", AttributeValue::Bool(true))
        .with("coupon", AttributeValue::Null(true))
        .with("address", AttributeValue::M(address))
        .with("tags", AttributeValue::Ss(vec!["gift".into(), "express".into()]))
        .with("thumbnail", AttributeValue::B(vec![0xAB; 256]))
        .with(
            "lines",
            AttributeValue::L((0..5).map(|n| AttributeValue::N(n.to_string())).collect()),
        )
}

fn encode(c: &mut Criterion) {
    let records: Vec<Record> = (0..1_000).map(a_typical_order).collect();
    let mut group = c.benchmark_group("record_codec");
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("encode_1k", |b| {
        b.iter(|| {
            for record in &records {
                black_box(encode_record(black_box(record)).expect("encodes"));
            }
        })
    });

    let lines: Vec<String> = records
        .iter()
        .map(|r| encode_record(r).expect("encodes"))
        .collect();
    group.bench_function("decode_1k", |b| {
        b.iter(|| {
            for line in &lines {
                black_box(decode_record(black_box(line.as_bytes())).expect("decodes"));
            }
        })
    });
    group.finish();
}

criterion_group!(benches, encode);
criterion_main!(benches);
