// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! M17 frame handler.
//!
//! The Link Setup Frame is 240 bits: destination (0..47), source (48..95),
//! the 16-bit type word (96..111: packet/stream bit, then `dt` ending at
//! bit 2, `et` from 3, `es` from 5, `cn` from 7, `rs` from 11), META/IV
//! (112..223) and CRC (224..239). `has_meta` is true when the first META
//! byte is nonzero. Stream frames carry Codec2 audio which the vocoder
//! interface does not cover; they surface as events only.

use super::{DibitFeed, FrameCtx, FrameHandler, FrameOutcome};
use crate::fec::crc::crc16_x25;
use crate::sync::SyncType;
use crate::telemetry::EventRecord;
use crate::{debug, info};

/// Base-40 M17 address alphabet.
const CHARSET: &[u8; 40] = b" ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-/.";

/// Decode a 48-bit base-40 address field.
pub fn decode_address(value: u64) -> String {
    match value {
        0 => "RESERVED".to_string(),
        0xFFFF_FFFF_FFFF => "BROADCAST".to_string(),
        mut v => {
            let mut out = String::new();
            while v > 0 {
                out.push(CHARSET[(v % 40) as usize] as char);
                v /= 40;
            }
            out
        }
    }
}

/// Packet payload protocol identifiers.
pub fn packet_protocol(id: u8) -> &'static str {
    match id {
        0x00 => "Raw",
        0x02 => "APRS",
        0x05 => "SMS",
        0x07 => "TLE",
        0x80 => "Meta Text",
        _ => "Unknown",
    }
}

/// Parsed Link Setup Frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lsf {
    pub dst: u64,
    pub src: u64,
    /// Packet (false) or stream (true).
    pub stream: bool,
    pub dt: u8,
    pub et: u8,
    pub es: u8,
    pub cn: u8,
    pub rs: u8,
    pub meta: [u8; 14],
    pub has_meta: bool,
    pub crc_ok: bool,
}

/// Parse 240 LSF bits.
pub fn parse_lsf(bits: &[u8]) -> Option<Lsf> {
    if bits.len() < 240 {
        return None;
    }
    let field = |start: usize, len: usize| -> u64 {
        bits[start..start + len]
            .iter()
            .fold(0u64, |acc, &b| (acc << 1) | u64::from(b))
    };
    let type_word = field(96, 16) as u16;
    let mut meta = [0u8; 14];
    for (i, m) in meta.iter_mut().enumerate() {
        *m = field(112 + i * 8, 8) as u8;
    }
    // CRC over the first 28 bytes
    let mut bytes = [0u8; 28];
    for (i, &b) in bits.iter().take(224).enumerate() {
        if b != 0 {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    let crc_ok = crc16_x25(&bytes) == field(224, 16) as u16;
    Some(Lsf {
        dst: field(0, 48),
        src: field(48, 48),
        stream: type_word & 1 != 0,
        dt: ((type_word >> 1) & 0x3) as u8,
        et: ((type_word >> 3) & 0x3) as u8,
        es: ((type_word >> 5) & 0x3) as u8,
        cn: ((type_word >> 7) & 0xF) as u8,
        rs: ((type_word >> 11) & 0x1F) as u8,
        has_meta: meta[0] != 0,
        meta,
        crc_ok,
    })
}

fn put_bits(bits: &mut [u8], start: usize, len: usize, v: u64) {
    for i in 0..len {
        bits[start + i] = ((v >> (len - 1 - i)) & 1) as u8;
    }
}

/// Build 240 LSF bits (tests, loopback).
pub fn build_lsf(dst: u64, src: u64, type_word: u16, meta: &[u8; 14]) -> Vec<u8> {
    let mut bits = vec![0u8; 240];
    put_bits(&mut bits, 0, 48, dst);
    put_bits(&mut bits, 48, 48, src);
    put_bits(&mut bits, 96, 16, u64::from(type_word));
    for (i, &m) in meta.iter().enumerate() {
        put_bits(&mut bits, 112 + i * 8, 8, u64::from(m));
    }
    let mut bytes = [0u8; 28];
    for (i, &b) in bits.iter().take(224).enumerate() {
        if b != 0 {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    let crc = crc16_x25(&bytes);
    put_bits(&mut bits, 224, 16, u64::from(crc));
    bits
}

/// M17 handler.
pub struct M17Handler;

impl M17Handler {
    pub fn new() -> Self {
        Self
    }

    fn handle_lsf(&mut self, ctx: &mut FrameCtx<'_>, feed: &mut dyn DibitFeed) -> FrameOutcome {
        let mut bits = Vec::with_capacity(240);
        for _ in 0..120 {
            let d = feed.next_dibit();
            bits.push(d >> 1);
            bits.push(d & 1);
        }
        let Some(lsf) = parse_lsf(&bits) else {
            return FrameOutcome::Drop;
        };
        if !lsf.crc_ok {
            ctx.state.counters.update_voice_ema(true);
            return FrameOutcome::Drop;
        }
        info!(
            "M17 LSF {} -> {} ({})",
            decode_address(lsf.src),
            decode_address(lsf.dst),
            if lsf.stream { "stream" } else { "packet" }
        );
        ctx.state.events[0].push(EventRecord {
            proto: "M17",
            flags: if lsf.et != 0 { "ENC".into() } else { "CLEAR".into() },
            tx: "TX BEGIN".into(),
            annotations: vec![format!(
                "{} > {}",
                decode_address(lsf.src),
                decode_address(lsf.dst)
            )],
            ..EventRecord::default()
        });
        FrameOutcome::Signaling
    }

    fn handle_packet(&mut self, ctx: &mut FrameCtx<'_>, feed: &mut dyn DibitFeed) -> FrameOutcome {
        // single packet chunk: 25 payload bytes + counter
        let (dibits, _) = feed.read_dibits(104);
        if dibits.len() < 104 {
            return FrameOutcome::Drop;
        }
        let mut bytes = [0u8; 26];
        for (i, chunk) in dibits.chunks(4).enumerate() {
            let mut v = 0u8;
            for d in chunk {
                v = (v << 2) | d;
            }
            bytes[i] = v;
        }
        let proto = bytes[0];
        debug!(
            "M17 packet proto 0x{:02X} ({})",
            proto,
            packet_protocol(proto)
        );
        ctx.state.events[0].push(EventRecord {
            proto: "M17",
            flags: "CLEAR".into(),
            tx: "PKT".into(),
            annotations: vec![packet_protocol(proto).to_string()],
            ..EventRecord::default()
        });
        FrameOutcome::Signaling
    }
}

impl Default for M17Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for M17Handler {
    fn matches(&self, synctype: SyncType) -> bool {
        synctype.protocol() == crate::sync::Protocol::M17
    }

    fn handle_frame(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        match synctype {
            SyncType::M17Lsf => self.handle_lsf(ctx, feed),
            SyncType::M17Pkt => self.handle_packet(ctx, feed),
            SyncType::M17Str | SyncType::M17Brt => {
                // Codec2 audio is outside the MBE vocoder interface; keep
                // the call alive for the event stream
                ctx.sm.voice_sync(&mut ctx.state.slots, 0);
                feed.read_dibits(96);
                FrameOutcome::Voice
            }
            _ => FrameOutcome::Drop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::test_support::CtxBundle;
    use crate::proto::VecFeed;

    #[test]
    fn test_lsf_field_layout() {
        // type word: stream, dt=2, et=1, es=3, cn=5, rs=9
        let tw: u16 = 1 | (2 << 1) | (1 << 3) | (3 << 5) | (5 << 7) | (9 << 11);
        let mut meta = [0u8; 14];
        meta[0] = 0xAA;
        let bits = build_lsf(0x1234_5678_9ABC, 0x0BAD_C0DE_0001, tw, &meta);
        let lsf = parse_lsf(&bits).expect("parse");
        assert!(lsf.crc_ok);
        assert_eq!(lsf.dst, 0x1234_5678_9ABC);
        assert_eq!(lsf.src, 0x0BAD_C0DE_0001);
        assert!(lsf.stream);
        assert_eq!(lsf.dt, 2);
        assert_eq!(lsf.et, 1);
        assert_eq!(lsf.es, 3);
        assert_eq!(lsf.cn, 5);
        assert_eq!(lsf.rs, 9);
        assert!(lsf.has_meta);
    }

    #[test]
    fn test_has_meta_keyed_on_first_byte() {
        let bits = build_lsf(1, 2, 0, &[0u8; 14]);
        assert!(!parse_lsf(&bits).expect("parse").has_meta);
        let mut meta = [0u8; 14];
        meta[0] = 1;
        let bits = build_lsf(1, 2, 0, &meta);
        assert!(parse_lsf(&bits).expect("parse").has_meta);
        // a nonzero later byte alone does not set the flag
        let mut meta = [0u8; 14];
        meta[5] = 9;
        let bits = build_lsf(1, 2, 0, &meta);
        assert!(!parse_lsf(&bits).expect("parse").has_meta);
    }

    #[test]
    fn test_packet_protocol_names() {
        assert_eq!(packet_protocol(0x00), "Raw");
        assert_eq!(packet_protocol(0x02), "APRS");
        assert_eq!(packet_protocol(0x05), "SMS");
        assert_eq!(packet_protocol(0x07), "TLE");
        assert_eq!(packet_protocol(0x80), "Meta Text");
        assert_eq!(packet_protocol(0x33), "Unknown");
    }

    #[test]
    fn test_lsf_through_handler() {
        let bits = build_lsf(0xFFFF_FFFF_FFFF, 12345, 0, &[0u8; 14]);
        let dibits: Vec<u8> = bits.chunks(2).map(|p| (p[0] << 1) | p[1]).collect();
        let mut b = CtxBundle::new();
        let mut h = M17Handler::new();
        let mut feed = VecFeed::from_dibits(&dibits);
        let out = h.handle_frame(&mut b.ctx(), SyncType::M17Lsf, &mut feed);
        assert_eq!(out, FrameOutcome::Signaling);
        let ev = b.state.events[0].latest().expect("event");
        assert!(ev.annotations[0].contains("BROADCAST"));
    }

    #[test]
    fn test_corrupt_lsf_dropped() {
        let mut bits = build_lsf(1, 2, 0, &[0u8; 14]);
        bits[60] ^= 1;
        let dibits: Vec<u8> = bits.chunks(2).map(|p| (p[0] << 1) | p[1]).collect();
        let mut b = CtxBundle::new();
        let mut h = M17Handler::new();
        let mut feed = VecFeed::from_dibits(&dibits);
        assert_eq!(
            h.handle_frame(&mut b.ctx(), SyncType::M17Lsf, &mut feed),
            FrameOutcome::Drop
        );
    }
}
