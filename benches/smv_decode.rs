use std::collections::HashSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rgoose::control_block::{ControlBlock, ControlBlockKind};
use rgoose::sv::{encode_sv_pdu, parse_sv_pdu};

fn sample_cb() -> ControlBlock {
    ControlBlock {
        host_ied: "IED1".into(),
        kind: ControlBlockKind::Smv,
        multicast_ip: "224.0.0.20".into(),
        app_id: 0x4000,
        vlan_id: None,
        cb_name: "IED1/LLN0.msvcb01".into(),
        dat_set_name: None,
        dat_set_members: vec![],
        subscribers: HashSet::from(["IED2".to_string()]),
    }
}

fn sample_pdu() -> Vec<u8> {
    let cb = sample_cb();
    let samples: [f32; 16] = std::array::from_fn(|i| 10000.0 + i as f32 * 100.0);
    encode_sv_pdu(&cb, 0x1234, &samples, [0; 8])
}

fn benchmark_sv_decode(c: &mut Criterion) {
    let pdu = sample_pdu();
    c.bench_function("sv_pdu_decode", |b| {
        b.iter(|| parse_sv_pdu(black_box(&pdu)).unwrap());
    });
}

fn benchmark_sv_encode(c: &mut Criterion) {
    let cb = sample_cb();
    let samples: [f32; 16] = std::array::from_fn(|i| 10000.0 + i as f32 * 100.0);
    c.bench_function("sv_pdu_encode", |b| {
        b.iter(|| encode_sv_pdu(black_box(&cb), black_box(0x1234), black_box(&samples), [0; 8]));
    });
}

fn benchmark_throughput(c: &mut Criterion) {
    let pdu = sample_pdu();
    let mut group = c.benchmark_group("sv_throughput");
    for rate_khz in [4, 8, 16].iter() {
        group.bench_with_input(BenchmarkId::new("decode_rate_kHz", rate_khz), rate_khz, |b, _| {
            b.iter(|| parse_sv_pdu(black_box(&pdu)).unwrap());
        });
        group.throughput(criterion::Throughput::Elements(*rate_khz as u64 * 1000));
    }
    group.finish();
}

criterion_group!(benches, benchmark_sv_decode, benchmark_sv_encode, benchmark_throughput);
criterion_main!(benches);
