// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! P25 Phase 2 (TDMA) frame handler.
//!
//! Voice channels interleave 2V/4V audio superframes with SACCH/FACCH
//! signaling. Signaling hexbits carry a reliability equal to the minimum of
//! their three contributing dibits (capped), the channel-specific fixed
//! positions are always marked as erasures, and low-reliability hexbits add
//! dynamic erasures up to a cap before RS(63,35) decoding (t = 14; anything
//! beyond must fail, never fabricate).
//!
//! MAC opcodes: PTT (0x01) opens a call with its crypto parameters, IDLE
//! (0x03) ends it, the grant opcodes feed the common trunking SM exactly
//! like Phase 1, and MAC_SIGNAL on a LCCH never flips per-slot audio gates.

use super::super::{DibitFeed, FrameCtx, FrameHandler, FrameOutcome};
use crate::audio::gate::gate_decision;
use crate::fec::rs;
use crate::fec::FecResult;
use crate::state::DmrBurst;
use crate::sync::SyncType;
use crate::trunk::p25 as trunk_p25;
use crate::{debug, info};

/// Channel flavor for xCCH decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Xcch {
    Facch,
    Sacch,
}

impl Xcch {
    /// Fixed erasure positions for the shortened RS(63,35) codeword.
    fn fixed_erasures(self) -> &'static [usize] {
        const FACCH: &[usize] = &[0, 1, 2, 3, 4, 5, 6, 7, 8, 54, 55, 56, 57, 58, 59, 60, 61, 62];
        const SACCH: &[usize] = &[0, 1, 2, 3, 4, 57, 58, 59, 60, 61, 62];
        match self {
            Xcch::Facch => FACCH,
            Xcch::Sacch => SACCH,
        }
    }

    /// Fallback MAC payload length (octets) for unknown opcodes with no
    /// header: B = 0 content octets, C = 16 (FACCH) or 19 (SACCH).
    pub fn fallback_len(self) -> usize {
        match self {
            Xcch::Facch => 16,
            Xcch::Sacch => 19,
        }
    }
}

/// Cap on dynamically-added erasures per codeword.
const DYN_ERASURE_CAP: usize = 6;
/// Hexbit reliability below which a dynamic erasure is marked.
const DYN_ERASURE_THRESHOLD: u8 = 24;
/// Hexbit reliability cap.
const HEXBIT_RELIABILITY_MAX: u8 = 192;

/// One hexbit with its reliability.
#[derive(Debug, Clone, Copy)]
pub struct Hexbit {
    pub value: u8,
    pub reliability: u8,
}

/// Assemble hexbits from dibits: value from three dibits MSB-first,
/// reliability = min of the three, capped.
pub fn hexbits_from_dibits(dibits: &[u8], rel: &[u8]) -> Vec<Hexbit> {
    dibits
        .chunks(3)
        .zip(rel.chunks(3))
        .filter(|(d, _)| d.len() == 3)
        .map(|(d, r)| Hexbit {
            value: (d[0] << 4) | (d[1] << 2) | d[2],
            reliability: r.iter().copied().min().unwrap_or(0).min(HEXBIT_RELIABILITY_MAX),
        })
        .collect()
}

/// Decode one xCCH codeword of 63 hexbits into its 35 payload hexbits.
pub fn decode_xcch(kind: Xcch, hexbits: &[Hexbit]) -> Option<[u8; 35]> {
    if hexbits.len() < 63 {
        return None;
    }
    let mut cw = [0u8; 63];
    for (i, h) in hexbits.iter().take(63).enumerate() {
        cw[i] = h.value & 0x3F;
    }
    let mut erasures: Vec<usize> = kind.fixed_erasures().to_vec();
    for (i, h) in hexbits.iter().take(63).enumerate() {
        if erasures.len() - kind.fixed_erasures().len() >= DYN_ERASURE_CAP {
            break;
        }
        if h.reliability < DYN_ERASURE_THRESHOLD && !erasures.contains(&i) {
            erasures.push(i);
        }
    }
    match rs::rs_63_35(&mut cw, &erasures) {
        FecResult::Clean | FecResult::Corrected(_) => {
            let mut out = [0u8; 35];
            out.copy_from_slice(&cw[..35]);
            Some(out)
        }
        FecResult::Uncorrectable => None,
    }
}

/// MAC opcodes.
pub mod mac {
    pub const SIGNAL: u8 = 0x00;
    pub const PTT: u8 = 0x01;
    pub const IDLE: u8 = 0x03;
    pub const GROUP_GRANT: u8 = 0x40;
    pub const UU_GRANT: u8 = 0x44;
    pub const MFID90_GRANT_A3: u8 = 0xA3;
    pub const MFID90_GRANT_A4: u8 = 0xA4;
}

/// A parsed MAC message (payload hexbits repacked to octets).
#[derive(Debug, Clone)]
pub struct MacMessage {
    pub opcode: u8,
    pub octets: Vec<u8>,
}

/// Repack 35 payload hexbits into MAC octets and split the opcode.
pub fn parse_mac(payload: &[u8; 35], kind: Xcch) -> MacMessage {
    let mut bits = Vec::with_capacity(35 * 6);
    for h in payload {
        for i in (0..6).rev() {
            bits.push((h >> i) & 1);
        }
    }
    let mut octets = Vec::with_capacity(bits.len() / 8);
    for chunk in bits.chunks(8) {
        if chunk.len() < 8 {
            break;
        }
        let mut v = 0u8;
        for b in chunk {
            v = (v << 1) | b;
        }
        octets.push(v);
    }
    let opcode = octets.first().copied().unwrap_or(0);
    let known = matches!(
        opcode,
        mac::SIGNAL
            | mac::PTT
            | mac::IDLE
            | mac::GROUP_GRANT
            | mac::UU_GRANT
            | mac::MFID90_GRANT_A3
            | mac::MFID90_GRANT_A4
    );
    if !known {
        // unknown opcode with no header: fall back to the fixed content
        // length so the walker never overruns
        octets.truncate(1 + kind.fallback_len());
    }
    MacMessage { opcode, octets }
}

/// P25 Phase 2 handler.
pub struct P25p2Handler {
    /// Current channel is a LCCH (control), not a traffic channel.
    pub lcch: bool,
    /// 2V/4V superframe position per slot.
    subframe: [u8; 2],
}

impl P25p2Handler {
    pub fn new() -> Self {
        Self {
            lcch: false,
            subframe: [0; 2],
        }
    }

    /// Route a decoded MAC message.
    pub fn route_mac(&mut self, ctx: &mut FrameCtx<'_>, slot: usize, msg: &MacMessage) {
        match msg.opcode {
            mac::SIGNAL => {
                // on a LCCH this is plain control traffic and must not flip
                // per-slot audio gates
                debug!("MAC_SIGNAL ({} octets)", msg.octets.len());
            }
            mac::PTT => {
                if msg.octets.len() >= 14 {
                    let s = &mut ctx.state.slots[slot];
                    s.alg_id = msg.octets[10];
                    s.key_id = (u16::from(msg.octets[11]) << 8) | u16::from(msg.octets[12]);
                    s.tg = (u32::from(msg.octets[1]) << 8) | u32::from(msg.octets[2]);
                    s.src = (u32::from(msg.octets[3]) << 16)
                        | (u32::from(msg.octets[4]) << 8)
                        | u32::from(msg.octets[5]);
                }
                ctx.sm.mac_activity();
                ctx.sm.voice_sync(&mut ctx.state.slots, slot);
                info!("MAC_PTT slot {}", slot);
            }
            mac::IDLE => {
                ctx.state.slots[slot].burst = DmrBurst::IDLE;
                let cfg = crate::config::runtime();
                ctx.sm.release(
                    &mut ctx.state.trunk,
                    &mut ctx.state.counters,
                    &mut ctx.state.slots,
                    ctx.tuner,
                    &cfg,
                    crate::trunk::ReleaseReason::CallEnd,
                );
            }
            mac::GROUP_GRANT | mac::MFID90_GRANT_A3 | mac::MFID90_GRANT_A4 => {
                if msg.octets.len() >= 8 {
                    let svc = msg.octets[1];
                    let channel = (u16::from(msg.octets[2]) << 8) | u16::from(msg.octets[3]);
                    let tg = (u32::from(msg.octets[4]) << 8) | u32::from(msg.octets[5]);
                    let src = (u32::from(msg.octets[6]) << 8) | u32::from(msg.octets[7]);
                    trunk_p25::group_grant(
                        ctx.sm,
                        &mut ctx.state.trunk,
                        &mut ctx.state.counters,
                        &mut ctx.state.slots,
                        ctx.tuner,
                        ctx.opts,
                        channel,
                        tg,
                        src,
                        svc,
                    );
                }
            }
            mac::UU_GRANT => {
                if msg.octets.len() >= 9 {
                    let channel = (u16::from(msg.octets[1]) << 8) | u16::from(msg.octets[2]);
                    let dst = (u32::from(msg.octets[3]) << 16)
                        | (u32::from(msg.octets[4]) << 8)
                        | u32::from(msg.octets[5]);
                    let src = (u32::from(msg.octets[6]) << 16)
                        | (u32::from(msg.octets[7]) << 8)
                        | u32::from(msg.octets[8]);
                    trunk_p25::individual_grant(
                        ctx.sm,
                        &mut ctx.state.trunk,
                        &mut ctx.state.counters,
                        &mut ctx.state.slots,
                        ctx.tuner,
                        ctx.opts,
                        channel,
                        dst,
                        src,
                        0,
                    );
                }
            }
            other => debug!("MAC opcode 0x{:02X} unhandled", other),
        }
    }

    /// Decode and route one signaling stretch.
    fn handle_xcch(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        slot: usize,
        kind: Xcch,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        let (dibits, rel) = feed.read_dibits(189); // 63 hexbits
        let hexbits = hexbits_from_dibits(&dibits, &rel);
        match decode_xcch(kind, &hexbits) {
            Some(payload) => {
                match kind {
                    Xcch::Facch => ctx.state.counters.facch_ok += 1,
                    Xcch::Sacch => ctx.state.counters.sacch_ok += 1,
                }
                let msg = parse_mac(&payload, kind);
                self.route_mac(ctx, slot, &msg);
                FrameOutcome::Signaling
            }
            None => {
                match kind {
                    Xcch::Facch => ctx.state.counters.facch_err += 1,
                    Xcch::Sacch => ctx.state.counters.sacch_err += 1,
                }
                FrameOutcome::Drop
            }
        }
    }

    /// One 2V (or the first half of a 4V) audio subframe.
    fn handle_voice(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        slot: usize,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        ctx.sm.voice_sync(&mut ctx.state.slots, slot);
        let tg = ctx.state.slots[slot].tg;
        let allowed = gate_decision(ctx.opts, tg, slot).open()
            && (ctx.state.slots[slot].alg_id == 0 || ctx.opts.tune_enc_calls);
        ctx.state.slots[slot].audio_allowed = allowed;

        let mut erred = false;
        for _ in 0..2 {
            let (dibits, _) = feed.read_dibits(36);
            if dibits.len() < 36 {
                erred = true;
                break;
            }
            // gate check precedes any vocoder work: a muted first subframe
            // makes no MBE call at all
            if !allowed {
                continue;
            }
            let mut ambe = [0u8; 49];
            for (i, b) in ambe.iter_mut().enumerate() {
                let d = dibits[i / 2];
                *b = if i % 2 == 0 { d >> 1 } else { d & 1 };
            }
            if let Some(voc) = ctx.vocoder.as_deref_mut() {
                if let Some(frame) = voc.process_mbe_frame(None, Some(&ambe), None) {
                    ctx.state.slots[slot].jitter.push(&frame);
                } else {
                    erred = true;
                }
            }
        }
        self.subframe[slot] = self.subframe[slot].wrapping_add(1);
        ctx.state.counters.update_voice_ema(erred);
        FrameOutcome::Voice
    }
}

impl Default for P25p2Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for P25p2Handler {
    fn matches(&self, synctype: SyncType) -> bool {
        synctype == SyncType::P25p2
    }

    fn handle_frame(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        _synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        // first dibit after sync selects the stream: 0 voice, 1 FACCH,
        // 2 SACCH (compacted ISCH walk)
        let kind = feed.next_dibit();
        let slot = usize::from(feed.next_dibit() & 1);
        match kind {
            0 => self.handle_voice(ctx, slot, feed),
            1 => self.handle_xcch(ctx, slot, Xcch::Facch, feed),
            2 => self.handle_xcch(ctx, slot, Xcch::Sacch, feed),
            _ => FrameOutcome::Drop,
        }
    }
}
