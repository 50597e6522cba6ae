// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LRRP end-to-end: DMR data bursts through the decoder into the LRRP file.

use dsd_neo::config::EnvSwitches;
use dsd_neo::fec::{bptc, trellis34, GOLAY_20_8};
use dsd_neo::io::NullTuner;
use dsd_neo::proto::dmr::data::build_confirmed_block;
use dsd_neo::runtime::{Decoder, DecoderHooks};
use dsd_neo::state::Options;
use dsd_neo::telemetry::SnapshotHub;
use std::sync::Arc;

fn dmr_data_sync() -> Vec<u8> {
    "313333111331131131331131".bytes().map(|b| b - b'0').collect()
}

fn slot_type_dibits(dtype: u8) -> Vec<u8> {
    let cw = GOLAY_20_8.encode(u32::from(dtype & 0xF));
    (0..10).rev().map(|i| ((cw >> (2 * i)) & 3) as u8).collect()
}

/// Data header burst announcing `blocks` rate-3/4 blocks to follow.
fn header_burst(blocks: u8) -> Vec<u8> {
    let mut p96 = [0u8; 96];
    // blocks-to-follow in the low nibble of the first octet
    for i in 0..4 {
        p96[4 + i] = (blocks >> (3 - i)) & 1;
    }
    let bits = bptc::encode_196(&p96);
    let mut out = dmr_data_sync();
    out.extend(slot_type_dibits(6)); // data header
    for i in 0..98 {
        out.push((bits[2 * i] << 1) | bits[2 * i + 1]);
    }
    out
}

/// Rate-3/4 confirmed block burst.
fn block_burst(dbsn: u8, data: &[u8; 16]) -> Vec<u8> {
    let payload = build_confirmed_block(dbsn, data);
    let dibits98 = trellis34::encode(&payload);
    let mut out = dmr_data_sync();
    out.extend(slot_type_dibits(7)); // rate 3/4 data
    out.extend_from_slice(&dibits98);
    out
}

/// Wrap an LRRP message in IPv4 (with options, IHL=6) + UDP.
fn ip_udp(lrrp: &[u8]) -> Vec<u8> {
    let ihl = 6usize;
    let ip_header = ihl * 4;
    let udp_len = 8 + lrrp.len();
    let mut pkt = vec![0u8; ip_header];
    pkt[0] = 0x40 | ihl as u8;
    pkt[9] = 17;
    pkt.extend_from_slice(&4001u16.to_be_bytes());
    pkt.extend_from_slice(&4001u16.to_be_bytes());
    pkt.extend_from_slice(&(udp_len as u16).to_be_bytes());
    pkt.extend_from_slice(&[0, 0]);
    pkt.extend_from_slice(lrrp);
    pkt
}

/// LRRP message: timestamp (possibly bogus) + POINT_2D + SPEED + HEADING.
fn lrrp_msg(bogus_year: bool) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(0x34); // TIMESTAMP
    if bogus_year {
        body.extend_from_slice(&[0x19, 0x49, 0x07, 0x15, 0x12]);
    } else {
        body.extend_from_slice(&[0x20, 0x26, 0x08, 0x01, 0x09]);
    }
    body.push(0x66); // POINT_2D
    body.extend_from_slice(&0x2000_0000i32.to_be_bytes()); // 11.25 deg
    body.extend_from_slice(&0x4000_0000i32.to_be_bytes()); // 45 deg
    body.push(0x6C); // SPEED, 1000 cm/s
    body.extend_from_slice(&1000u16.to_be_bytes());
    body.push(0x56); // HEADING, 90 deg
    body.push(45);
    let mut msg = vec![0x0D, body.len() as u8];
    msg.extend(body);
    msg
}

fn run_stream(lrrp_path: &std::path::Path, bogus_year: bool) {
    let opts = Options {
        lrrp_file: Some(lrrp_path.to_path_buf()),
        ..Options::default()
    };
    let mut d = Decoder::new(
        opts,
        EnvSwitches {
            cc_cache: false,
            ..EnvSwitches::all_enabled()
        },
        DecoderHooks {
            tuner: Box::new(NullTuner),
            vocoder: None,
            snapshots: Arc::new(SnapshotHub::new()),
            metrics: None,
        },
    );
    d.state.slots[0].src = 222;

    let packet = ip_udp(&lrrp_msg(bogus_year));
    let blocks = packet.len().div_ceil(16);
    let mut stream = header_burst(blocks as u8);
    for (i, chunk) in packet.chunks(16).enumerate() {
        let mut data = [0u8; 16];
        data[..chunk.len()].copy_from_slice(chunk);
        stream.extend(block_burst(i as u8, &data));
    }
    d.process_dibits(&stream);
}

#[test]
fn lrrp_report_written_with_ip_options() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("lrrp.txt");
    run_stream(&path, false);
    let text = std::fs::read_to_string(&path).expect("lrrp file");
    assert!(text.contains("2026-08-01 09:00:00"), "{}", text);
    assert!(text.contains("222"), "source id present: {}", text);
    assert!(text.contains("11.25"), "{}", text);
    assert!(text.contains("45.0"), "{}", text);
}

#[test]
fn bogus_year_never_reaches_lrrp_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("lrrp.txt");
    run_stream(&path, true);
    let text = std::fs::read_to_string(&path).expect("lrrp file");
    assert!(!text.contains("1949"), "{}", text);
    assert!(!text.is_empty(), "report still written with system time");
}
