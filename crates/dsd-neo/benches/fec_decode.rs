// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FEC decode throughput: the per-burst cost ceiling for real-time decode.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dsd_neo::fec::{bptc, rs, trellis34, GOLAY_24_12};

fn bench_golay24(c: &mut Criterion) {
    let clean = GOLAY_24_12.encode(0xABC);
    c.bench_function("golay24_decode_2err", |b| {
        b.iter(|| {
            let mut cw = black_box(clean ^ 0b101);
            GOLAY_24_12.decode(&mut cw)
        })
    });
}

fn bench_bptc196(c: &mut Criterion) {
    let mut payload = [0u8; 96];
    for (i, p) in payload.iter_mut().enumerate() {
        *p = (i % 2) as u8;
    }
    let mut block = bptc::encode_196(&payload);
    block[17] ^= 1;
    c.bench_function("bptc196_decode_1err", |b| {
        b.iter(|| bptc::decode_196(black_box(&block)))
    });
}

fn bench_rs63(c: &mut Criterion) {
    let msg = [0x15u8; 35];
    let mut cw = [0u8; 63];
    cw[..35].copy_from_slice(&msg);
    let parity = rs::encode(&msg, 28);
    cw[35..].copy_from_slice(&parity);
    cw[10] ^= 0x20;
    cw[40] ^= 0x11;
    c.bench_function("rs63_35_decode_2err", |b| {
        b.iter(|| {
            let mut x = black_box(cw);
            rs::rs_63_35(&mut x, &[])
        })
    });
}

fn bench_trellis34(c: &mut Criterion) {
    let payload = [0x5Au8; 18];
    let dibits = trellis34::encode(&payload);
    c.bench_function("trellis34_decode", |b| {
        b.iter(|| trellis34::decode(black_box(&dibits), None))
    });
}

criterion_group!(benches, bench_golay24, bench_bptc196, bench_rs63, bench_trellis34);
criterion_main!(benches);
