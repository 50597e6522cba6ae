// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! dsd-replay: run captured symbol files through the decoder core.
//!
//! Replays a dibit capture (one symbol per byte at 4800 sym/s) through the
//! same slicer/sync/dispatch path the live demod uses, printing the event
//! stream. Useful for regression captures and protocol debugging without
//! a tuner attached.

use clap::Parser;
use dsd_neo::config::EnvSwitches;
use dsd_neo::io::{BasebandSource, NullTuner};
use dsd_neo::logging::{init_logger, ConsoleOutput, LogLevel};
use dsd_neo::runtime::{Decoder, DecoderHooks};
use dsd_neo::state::Options;
use dsd_neo::telemetry::{EventRecord, SnapshotHub};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "dsd-replay", about = "Replay a symbol capture through the decoder")]
struct Args {
    /// Symbol capture file (dibits, one per byte).
    capture: std::path::PathBuf,

    /// Verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Enable trunk following.
    #[arg(long)]
    trunk: bool,

    /// Follow DMR Tier III instead of P25.
    #[arg(long)]
    dmr_t3: bool,

    /// Treat the polarity as inverted.
    #[arg(long)]
    inverted: bool,
}

/// Normalize historical long options onto the short-option grammar: known
/// `--name value` pairs and boolean longs are rewritten; anything unknown
/// is preserved untouched for the short parser.
fn compact_argv(args: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(a) = iter.next() {
        match a.as_str() {
            "--verbosity" => {
                // historical spelling took a numeric argument
                if let Some(v) = iter.next() {
                    let n: usize = v.parse().unwrap_or(1);
                    for _ in 0..n.min(4) {
                        out.push("-v".to_string());
                    }
                }
            }
            "--tier3" => out.push("--dmr-t3".to_string()),
            other => out.push(other.to_string()),
        }
    }
    out
}

fn main() {
    let argv = compact_argv(std::env::args().collect());
    let args = Args::parse_from(argv);

    init_logger(
        Arc::new(ConsoleOutput::new()),
        LogLevel::from_verbosity(args.verbose),
    );

    let opts = Options {
        verbose: args.verbose,
        inverted: args.inverted,
        trunk_enable: args.trunk,
        p25_trunk: !args.dmr_t3,
        ..Options::default()
    };

    let hub = Arc::new(SnapshotHub::new());
    let mut decoder = Decoder::new(
        opts,
        EnvSwitches::from_env(),
        DecoderHooks {
            tuner: Box::new(NullTuner),
            vocoder: None,
            snapshots: hub.clone(),
            metrics: None,
        },
    );

    let mut source = match BasebandSource::open_capture(&args.capture) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cannot open {}: {}", args.capture.display(), e);
            std::process::exit(1);
        }
    };

    let mut printed = 0usize;
    loop {
        match source.read_chunk(4096) {
            Ok(dsd_neo::io::source::SourceChunk::Dibits(d)) if !d.is_empty() => {
                decoder.process_dibits(&d);
                let snap = hub.load();
                for slot in &snap.events {
                    for rec in slot.iter().skip(printed.min(slot.len())) {
                        println!("{}", EventRecord::compact(&rec.canonical()));
                    }
                    printed = printed.max(slot.len());
                }
            }
            Ok(dsd_neo::io::source::SourceChunk::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("read failed: {}", e);
                break;
            }
        }
    }

    let snap = hub.load();
    eprintln!(
        "done: {} tunes, {} releases, BER {:.4}",
        snap.tunes, snap.releases, snap.p1_ber
    );
}
