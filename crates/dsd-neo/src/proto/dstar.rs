// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! D-STAR frame handler.
//!
//! The 660-bit radio header is convolutionally coded (rate 1/2, K=5,
//! generators 0x19/0x17), scrambled with a fixed PN sequence and block
//! interleaved. Both the scrambler (XOR) and the interleaver (index
//! bit-reversal inside a power-of-two block) are involutions, so the same
//! routine encodes and decodes. The decoded header carries four 8-byte
//! callsign fields and closes with CRC-16/X.25.
//!
//! Voice frames are 72-bit AMBE plus a 24-bit slow-data word.

use super::{DibitFeed, FrameCtx, FrameHandler, FrameOutcome};
use crate::fec::crc::crc16_x25;
use crate::fec::viterbi::DSTAR_HEADER;
use crate::sync::SyncType;
use crate::telemetry::EventRecord;
use crate::{debug, info};

/// Decoded header length in bits (41 bytes + 2 pad).
pub const HEADER_BITS: usize = 330;
/// Coded header length in bits: rate 1/2 over the header plus K-1 flush.
pub const CODED_BITS: usize = 2 * (HEADER_BITS + 4);

/// PN scrambler: XOR with a fixed x^7 + x^4 + 1 sequence. Involutive.
pub fn scramble(bits: &mut [u8]) {
    let mut reg: u8 = 0x7F;
    for b in bits.iter_mut() {
        let out = ((reg >> 6) ^ (reg >> 3)) & 1;
        reg = (reg << 1) | out;
        *b ^= out;
    }
}

/// Block interleaver: bit-reversed index inside 512-bit blocks, identity on
/// the tail. Self-inverse because bit reversal is.
pub fn interleave(bits: &mut [u8]) {
    const BLOCK: usize = 512;
    const WIDTH: u32 = 9;
    let full = bits.len() / BLOCK * BLOCK;
    for base in (0..full).step_by(BLOCK) {
        for i in 0..BLOCK {
            let j = (i as u32).reverse_bits() >> (32 - WIDTH);
            let j = j as usize;
            if i < j {
                bits.swap(base + i, base + j);
            }
        }
    }
}

/// Decoded radio header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioHeader {
    pub flags: [u8; 3],
    pub rpt2: String,
    pub rpt1: String,
    pub urcall: String,
    pub mycall: String,
    pub crc_ok: bool,
}

/// Decode 330 header bits into fields.
pub fn parse_header(bits: &[u8]) -> RadioHeader {
    let mut bytes = [0u8; 41];
    for (i, &b) in bits.iter().take(328).enumerate() {
        if b != 0 {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    let field = |start: usize| -> String {
        bytes[start..start + 8]
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect::<String>()
            .trim_end()
            .to_string()
    };
    let rx_crc = (u16::from(bytes[40]) << 8) | u16::from(bytes[39]);
    RadioHeader {
        flags: [bytes[0], bytes[1], bytes[2]],
        rpt2: field(3),
        rpt1: field(11),
        urcall: field(19),
        mycall: field(27),
        crc_ok: crc16_x25(&bytes[..39]) == rx_crc,
    }
}

/// Build 330 header bits (tests, loopback).
pub fn build_header(flags: [u8; 3], rpt2: &str, rpt1: &str, ur: &str, my: &str) -> Vec<u8> {
    let mut bytes = [b' '; 41];
    bytes[0..3].copy_from_slice(&flags);
    for (dst, src) in [(3usize, rpt2), (11, rpt1), (19, ur), (27, my)] {
        for (i, b) in src.bytes().take(8).enumerate() {
            bytes[dst + i] = b;
        }
    }
    let crc = crc16_x25(&bytes[..39]);
    bytes[39] = crc as u8;
    bytes[40] = (crc >> 8) as u8;
    let mut bits = vec![0u8; HEADER_BITS];
    for (i, b) in bits.iter_mut().take(328).enumerate() {
        *b = (bytes[i / 8] >> (7 - (i % 8))) & 1;
    }
    bits
}

/// D-STAR handler.
pub struct DstarHandler {
    last_header: Option<RadioHeader>,
}

impl DstarHandler {
    pub fn new() -> Self {
        Self { last_header: None }
    }

    fn handle_header(&mut self, ctx: &mut FrameCtx<'_>, feed: &mut dyn DibitFeed) -> FrameOutcome {
        let mut coded = Vec::with_capacity(CODED_BITS);
        for _ in 0..CODED_BITS / 2 {
            let d = feed.next_dibit();
            coded.push(d >> 1);
            coded.push(d & 1);
        }
        interleave(&mut coded);
        scramble(&mut coded);
        let decoded = DSTAR_HEADER.decode(&coded, HEADER_BITS);
        let header = parse_header(&decoded);
        if header.crc_ok {
            info!("D-STAR header MY={} UR={}", header.mycall, header.urcall);
            ctx.state.events[0].push(EventRecord {
                proto: "DSTAR",
                flags: "CLEAR".into(),
                tx: "TX BEGIN".into(),
                annotations: vec![format!("MY {} UR {}", header.mycall, header.urcall)],
                ..EventRecord::default()
            });
            self.last_header = Some(header);
            FrameOutcome::Signaling
        } else {
            ctx.state.counters.update_voice_ema(true);
            FrameOutcome::Drop
        }
    }

    fn handle_voice(&mut self, ctx: &mut FrameCtx<'_>, feed: &mut dyn DibitFeed) -> FrameOutcome {
        // 72-bit AMBE frame + 24-bit slow data
        let (dibits, _) = feed.read_dibits(48);
        if dibits.len() < 48 {
            return FrameOutcome::Drop;
        }
        if let Some(voc) = ctx.vocoder.as_deref_mut() {
            let mut ambe = [0u8; 49];
            for (i, b) in ambe.iter_mut().enumerate() {
                let d = dibits[i / 2];
                *b = if i % 2 == 0 { d >> 1 } else { d & 1 };
            }
            if let Some(frame) = voc.process_mbe_frame(None, Some(&ambe), None) {
                ctx.state.slots[0].jitter.push(&frame);
            }
        }
        ctx.sm.voice_sync(&mut ctx.state.slots, 0);
        FrameOutcome::Voice
    }
}

impl Default for DstarHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for DstarHandler {
    fn matches(&self, synctype: SyncType) -> bool {
        matches!(synctype, SyncType::DstarHd | SyncType::DstarSync)
    }

    fn handle_frame(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        match synctype {
            SyncType::DstarHd => self.handle_header(ctx, feed),
            SyncType::DstarSync => self.handle_voice(ctx, feed),
            other => {
                debug!("D-STAR unexpected sync {:?}", other);
                FrameOutcome::Drop
            }
        }
    }
}
