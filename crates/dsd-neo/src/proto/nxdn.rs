// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! NXDN and dPMR frame handlers.
//!
//! NXDN frames open with a LICH octet describing the channel content,
//! followed by SACCH signaling under Hamming(17,12) and AMBE voice. dPMR
//! shares the 4FSK layer; its frame sync number selects header,
//! payload or end frames, with QR(16,7,6) over the channel-control words.

use super::{DibitFeed, FrameCtx, FrameHandler, FrameOutcome};
use crate::audio::gate::gate_decision;
use crate::fec::{HAMMING_17_12, QR_16_7_6};
use crate::sync::SyncType;
use crate::telemetry::EventRecord;
use crate::{debug, info};

/// NXDN LICH channel types.
mod lich {
    pub const RCCH: u8 = 0;
    pub const RTCH: u8 = 1;
    pub const RDCH: u8 = 2;
}

/// NXDN handler.
pub struct NxdnHandler {
    /// SACCH fragments assemble across four frames.
    sacch: Vec<u16>,
}

impl NxdnHandler {
    pub fn new() -> Self {
        Self { sacch: Vec::new() }
    }

    /// Read one Hamming(17,12)-protected word.
    fn read_h17(feed: &mut dyn DibitFeed) -> Option<u16> {
        let mut cw = 0u32;
        for _ in 0..9 {
            cw = (cw << 2) | u32::from(feed.next_dibit());
        }
        cw >>= 1; // 18 dibit bits carry a 17-bit word
        HAMMING_17_12.decode(&mut cw).then(|| HAMMING_17_12.message(cw) as u16)
    }
}

impl Default for NxdnHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for NxdnHandler {
    fn matches(&self, synctype: SyncType) -> bool {
        synctype == SyncType::NxdnFsw
    }

    fn handle_frame(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        _synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        // LICH: 8 dibits, majority-protected pairs
        let (lich_d, _) = feed.read_dibits(8);
        if lich_d.len() < 8 {
            return FrameOutcome::Drop;
        }
        let mut lich = 0u8;
        for pair in lich_d.chunks(2) {
            lich = (lich << 1) | (pair[0] >> 1);
        }
        let ctype = lich >> 6;

        match ctype {
            c if c == lich::RCCH || c == lich::RDCH => {
                // control/data: two SACCH words
                for _ in 0..2 {
                    match Self::read_h17(feed) {
                        Some(w) => {
                            ctx.state.counters.sacch_ok += 1;
                            self.sacch.push(w);
                        }
                        None => {
                            ctx.state.counters.sacch_err += 1;
                        }
                    }
                }
                if self.sacch.len() >= 4 {
                    // assembled: first word carries the message type
                    let mtype = (self.sacch[0] >> 6) & 0x3F;
                    debug!("NXDN SACCH message type 0x{:02X}", mtype);
                    self.sacch.clear();
                }
                FrameOutcome::Signaling
            }
            c if c == lich::RTCH => {
                ctx.sm.voice_sync(&mut ctx.state.slots, 0);
                let tg = ctx.state.slots[0].tg;
                let allowed = gate_decision(ctx.opts, tg, 0).open()
                    && ctx.state.slots[0].alg_id == 0;
                ctx.state.slots[0].audio_allowed = allowed;
                // four AMBE half-frames
                for _ in 0..4 {
                    let (dibits, _) = feed.read_dibits(25);
                    if dibits.len() < 25 || !allowed {
                        continue;
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
                }
                FrameOutcome::Voice
            }
            other => {
                debug!("NXDN LICH type {} unhandled", other);
                FrameOutcome::Drop
            }
        }
    }
}

/// dPMR handler.
pub struct DpmrHandler {
    current_call: Option<(u32, u32)>,
}

impl DpmrHandler {
    pub fn new() -> Self {
        Self { current_call: None }
    }

    /// Read one QR(16,7,6)-protected channel-control word.
    fn read_cch(feed: &mut dyn DibitFeed) -> Option<u8> {
        let mut cw = 0u32;
        for _ in 0..8 {
            cw = (cw << 2) | u32::from(feed.next_dibit());
        }
        QR_16_7_6.decode(&mut cw).then(|| QR_16_7_6.message(cw) as u8)
    }
}

impl Default for DpmrHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for DpmrHandler {
    fn matches(&self, synctype: SyncType) -> bool {
        matches!(
            synctype,
            SyncType::Dpmr1 | SyncType::Dpmr2 | SyncType::Dpmr3 | SyncType::Dpmr4
        )
    }

    fn handle_frame(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        match synctype {
            SyncType::Dpmr1 => {
                // header frame: called/calling IDs in CCH words
                let hi = Self::read_cch(feed);
                let lo = Self::read_cch(feed);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    let dst = (u32::from(hi) << 7) | u32::from(lo);
                    self.current_call = Some((dst, 0));
                    info!("dPMR call header dst {}", dst);
                }
                FrameOutcome::Signaling
            }
            SyncType::Dpmr2 | SyncType::Dpmr3 => {
                ctx.sm.voice_sync(&mut ctx.state.slots, 0);
                feed.read_dibits(72);
                FrameOutcome::Voice
            }
            SyncType::Dpmr4 => {
                if let Some((dst, _)) = self.current_call.take() {
                    ctx.state.events[0].push(EventRecord {
                        proto: "DPMR",
                        target: dst,
                        flags: "CLEAR".into(),
                        tx: "TX END".into(),
                        ..EventRecord::default()
                    });
                }
                ctx.state.slots[0].burst = crate::state::DmrBurst::IDLE;
                FrameOutcome::Signaling
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

    fn h17_dibits(word: u16) -> Vec<u8> {
        let cw = HAMMING_17_12.encode(u32::from(word & 0xFFF)) << 1;
        (0..9).rev().map(|i| ((cw >> (2 * i)) & 3) as u8).collect()
    }

    #[test]
    fn test_nxdn_sacch_words_counted() {
        let mut b = CtxBundle::new();
        let mut h = NxdnHandler::new();
        let mut dibits = vec![0u8; 8]; // LICH type 0 (RCCH)
        dibits.extend(h17_dibits(0x123));
        dibits.extend(h17_dibits(0x456));
        let mut feed = VecFeed::from_dibits(&dibits);
        let out = h.handle_frame(&mut b.ctx(), SyncType::NxdnFsw, &mut feed);
        assert_eq!(out, FrameOutcome::Signaling);
        assert_eq!(b.state.counters.sacch_ok, 2);
        assert_eq!(b.state.counters.sacch_err, 0);
    }

    #[test]
    fn test_nxdn_corrupt_sacch_counted_as_error() {
        let mut b = CtxBundle::new();
        let mut h = NxdnHandler::new();
        let mut dibits = vec![0u8; 8];
        let mut bad = h17_dibits(0x123);
        // flip the two lowest codeword bits: that syndrome matches no
        // single-bit pattern, so the decode must report failure
        bad[8] ^= 2;
        bad[7] ^= 1;
        dibits.extend(bad);
        dibits.extend(h17_dibits(0x456));
        let mut feed = VecFeed::from_dibits(&dibits);
        h.handle_frame(&mut b.ctx(), SyncType::NxdnFsw, &mut feed);
        assert!(b.state.counters.sacch_err >= 1);
    }

    #[test]
    fn test_dpmr_header_then_end_emits_event() {
        let mut b = CtxBundle::new();
        let mut h = DpmrHandler::new();

        let cch = |v: u8| -> Vec<u8> {
            let cw = QR_16_7_6.encode(u32::from(v & 0x7F));
            (0..8).rev().map(|i| ((cw >> (2 * i)) & 3) as u8).collect()
        };
        let mut dibits = cch(0x05);
        dibits.extend(cch(0x21));
        let mut feed = VecFeed::from_dibits(&dibits);
        h.handle_frame(&mut b.ctx(), SyncType::Dpmr1, &mut feed);

        let mut feed = VecFeed::from_dibits(&[]);
        h.handle_frame(&mut b.ctx(), SyncType::Dpmr4, &mut feed);
        let ev = b.state.events[0].latest().expect("event");
        assert_eq!(ev.proto, "DPMR");
        assert_eq!(ev.target, (0x05 << 7) | 0x21);
    }
}
