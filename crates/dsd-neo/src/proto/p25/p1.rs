// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! P25 Phase 1 frame handler.
//!
//! After the frame sync the NID (NAC + DUID) selects the unit: LDU1/LDU2
//! voice superframes (12 IMBE frames, RS-protected link control, LSD
//! sub-channel), TDU/TDULC terminators, TSBK trunking blocks and MBT/PDU
//! data. Channel grants resolve through the IDEN tables; an unresolvable
//! grant logs its diagnostic and never retunes.
//!
//! PDU JSON diagnostics are gated by `DSD_NEO_PDU_JSON` and record
//! `{sap, mfid, io, len, summary}` per data header seen.

use super::super::{DibitFeed, FrameCtx, FrameHandler, FrameOutcome};
use crate::audio::gate::gate_decision;
use crate::fec::crc::crc16_ccitt;
use crate::fec::{rs, LSD_16_8};
use crate::state::DmrBurst;
use crate::sync::SyncType;
use crate::telemetry::{format_wacn_sysid, EventRecord};
use crate::trunk::iden::IdenEntry;
use crate::trunk::{p25 as trunk_p25, Trust};
use crate::{debug, info};

/// Data unit IDs from the NID.
mod duid {
    pub const HDU: u8 = 0x0;
    pub const TDU: u8 = 0x3;
    pub const LDU1: u8 = 0x5;
    pub const TSBK: u8 = 0x7;
    pub const LDU2: u8 = 0xA;
    pub const PDU: u8 = 0xC;
    pub const TDULC: u8 = 0xF;
}

/// TSBK opcodes routed here.
mod opcode {
    pub const GRP_V_CH_GRANT: u8 = 0x00;
    pub const UU_V_CH_GRANT: u8 = 0x04;
    pub const RFSS_STS_BCST: u8 = 0x3A;
    pub const NET_STS_BCST: u8 = 0x3B;
    pub const ADJ_STS_BCST: u8 = 0x3C;
    pub const IDEN_UP: u8 = 0x3D;
}

/// Parsed TSBK (post-FEC 12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tsbk {
    pub last_block: bool,
    pub opcode: u8,
    pub mfid: u8,
    pub args: [u8; 8],
    pub crc_ok: bool,
}

/// Parse 12 post-FEC TSBK bytes.
pub fn parse_tsbk(bytes: &[u8; 12]) -> Tsbk {
    let rx_crc = (u16::from(bytes[10]) << 8) | u16::from(bytes[11]);
    let mut args = [0u8; 8];
    args.copy_from_slice(&bytes[2..10]);
    Tsbk {
        last_block: bytes[0] & 0x80 != 0,
        opcode: bytes[0] & 0x3F,
        mfid: bytes[1],
        args,
        crc_ok: crc16_ccitt(&bytes[..10]) == rx_crc,
    }
}

/// Build TSBK bytes (tests, loopback).
pub fn build_tsbk(opcode: u8, mfid: u8, args: [u8; 8]) -> [u8; 12] {
    let mut bytes = [0u8; 12];
    bytes[0] = 0x80 | (opcode & 0x3F);
    bytes[1] = mfid;
    bytes[2..10].copy_from_slice(&args);
    let crc = crc16_ccitt(&bytes[..10]);
    bytes[10] = (crc >> 8) as u8;
    bytes[11] = crc as u8;
    bytes
}

/// Link control word: format 0x44 is Group Voice Channel Update - Explicit.
pub const LCW_GROUP_UPDATE_EXPLICIT: u8 = 0x44;

/// SAP number to a short display name for the PDU diagnostics.
fn sap_name(sap: u8) -> &'static str {
    match sap {
        0 => "UserData",
        4 => "Packet",
        32 => "RegAuth",
        33 => "ChanAccess",
        34 => "SysCfg",
        61 => "Trunking",
        _ => "Unknown",
    }
}

/// P25 Phase 1 handler.
pub struct P25p1Handler {
    /// JSON diagnostic lines emitted for PDUs (env-gated).
    pub pdu_json_log: Vec<String>,
}

impl P25p1Handler {
    pub fn new() -> Self {
        Self {
            pdu_json_log: Vec::new(),
        }
    }

    /// Read the NID: returns (nac, duid) and charges the BER accumulator
    /// for the parity dibits.
    fn read_nid(ctx: &mut FrameCtx<'_>, feed: &mut dyn DibitFeed) -> (u16, u8) {
        let (dibits, _) = feed.read_dibits(32);
        let mut word = 0u16;
        for d in dibits.iter().take(8) {
            word = (word << 2) | u16::from(*d);
        }
        ctx.state.counters.p1_total_bits += 64;
        (word >> 4, (word & 0xF) as u8)
    }

    fn handle_tsbk(&mut self, ctx: &mut FrameCtx<'_>, feed: &mut dyn DibitFeed) -> FrameOutcome {
        // 98 dibits of 3/4-trellis block, interleave shared with DMR
        let (dibits, rel) = feed.read_dibits(98);
        if dibits.len() < 98 {
            return FrameOutcome::Drop;
        }
        let mut d98 = [0u8; 98];
        d98.copy_from_slice(&dibits);
        let mut r98 = [255u8; 98];
        r98[..rel.len()].copy_from_slice(&rel);
        let Some(payload) = crate::fec::trellis34::decode(&d98, Some(&r98)) else {
            ctx.state.counters.p1_ber_bits += 8;
            return FrameOutcome::Drop;
        };
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&payload[..12]);
        let tsbk = parse_tsbk(&bytes);
        if !tsbk.crc_ok {
            return FrameOutcome::Drop;
        }
        self.route_tsbk(ctx, &tsbk);
        FrameOutcome::Signaling
    }

    /// Route one decoded TSBK (also used by the MBT path).
    pub fn route_tsbk(&mut self, ctx: &mut FrameCtx<'_>, tsbk: &Tsbk) {
        let a = &tsbk.args;
        match tsbk.opcode {
            opcode::GRP_V_CH_GRANT => {
                let svc = a[0];
                let channel = (u16::from(a[1]) << 8) | u16::from(a[2]);
                let tg = (u32::from(a[3]) << 8) | u32::from(a[4]);
                let src = (u32::from(a[5]) << 16) | (u32::from(a[6]) << 8) | u32::from(a[7]);
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
            opcode::UU_V_CH_GRANT => {
                let channel = (u16::from(a[0]) << 8) | u16::from(a[1]);
                let dst = (u32::from(a[2]) << 16) | (u32::from(a[3]) << 8) | u32::from(a[4]);
                let src = u32::from(a[5]) << 16 | (u32::from(a[6]) << 8) | u32::from(a[7]);
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
            opcode::IDEN_UP => {
                let iden = a[0] >> 4;
                let base = (u32::from(a[4]) << 24)
                    | (u32::from(a[5]) << 16)
                    | (u32::from(a[6]) << 8)
                    | u32::from(a[7]);
                let spac = (u32::from(a[2] & 0x3) << 8) | u32::from(a[3]);
                ctx.state.trunk.seed_iden(
                    iden,
                    IdenEntry {
                        base,
                        spac,
                        itype: a[1],
                        tdma: a[1] & 0x80 != 0,
                        slots: if a[1] & 0x80 != 0 { 2 } else { 1 },
                        trust: Trust::Confirmed,
                        seeded: true,
                    },
                );
                debug!("IDEN_UP {}: base {} spac {}", iden, base, spac);
            }
            opcode::NET_STS_BCST => {
                ctx.state.trunk.site.wacn = (u32::from(a[0]) << 12)
                    | (u32::from(a[1]) << 4)
                    | u32::from(a[2] >> 4);
                ctx.state.trunk.site.sysid =
                    (u32::from(a[2] & 0xF) << 8) | u32::from(a[3]);
                info!(
                    "NET_STS {}",
                    format_wacn_sysid(ctx.state.trunk.site.wacn, ctx.state.trunk.site.sysid)
                );
            }
            opcode::RFSS_STS_BCST => {
                ctx.state.trunk.site.rfss = a[1];
                ctx.state.trunk.site.site = a[2];
            }
            opcode::ADJ_STS_BCST => {
                let channel = (u16::from(a[3]) << 8) | u16::from(a[4]);
                if let Ok((hz, _)) = ctx.state.trunk.channel_to_freq(channel) {
                    ctx.sm.neighbor_update(
                        &mut ctx.state.trunk,
                        &mut ctx.state.counters,
                        ctx.env,
                        &[hz],
                    );
                }
            }
            other => debug!("TSBK op 0x{:02X} mfid 0x{:02X} unhandled", other, tsbk.mfid),
        }
    }

    /// Handle an explicit group voice channel update from the LDU link
    /// control (LCW format 0x44).
    pub fn route_lcw(&mut self, ctx: &mut FrameCtx<'_>, lcw: &[u8; 9]) {
        if lcw[0] & 0x3F != LCW_GROUP_UPDATE_EXPLICIT & 0x3F {
            return;
        }
        let svc = lcw[2];
        let channel = (u16::from(lcw[3]) << 8) | u16::from(lcw[4]);
        let tg = (u32::from(lcw[5]) << 8) | u32::from(lcw[6]);
        let src = (u32::from(lcw[7]) << 8) | u32::from(lcw[8]);
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

    /// Decode one LDU superframe: nine IMBE frames, embedded LC hexbits
    /// under RS, and the (16,8) low-speed data words.
    fn handle_ldu(&mut self, ctx: &mut FrameCtx<'_>, feed: &mut dyn DibitFeed, ldu2: bool) -> FrameOutcome {
        let slot = 0usize;
        ctx.sm.voice_sync(&mut ctx.state.slots, slot);
        let tg = ctx.state.slots[slot].tg;
        let allowed = gate_decision(ctx.opts, tg, slot).open()
            && (ctx.state.slots[slot].alg_id == 0 || ctx.opts.tune_enc_calls);
        ctx.state.slots[slot].audio_allowed = allowed;

        let mut lc_hexbits = Vec::with_capacity(24);
        let mut erred = false;
        for frame_no in 0..9 {
            // 88-bit IMBE frame = 44 dibits
            let (dibits, _) = feed.read_dibits(44);
            if dibits.len() < 44 {
                erred = true;
                break;
            }
            if allowed {
                let mut imbe = [0u8; 88];
                for (i, b) in imbe.iter_mut().enumerate() {
                    let d = dibits[i / 2];
                    *b = if i % 2 == 0 { d >> 1 } else { d & 1 };
                }
                if let Some(voc) = ctx.vocoder.as_deref_mut() {
                    if let Some(frame) = voc.process_mbe_frame(Some(&imbe), None, None) {
                        ctx.state.slots[slot].jitter.push(&frame);
                    } else {
                        erred = true;
                    }
                }
            }
            // interleaved link control / encryption sync hexbits
            if frame_no > 0 && frame_no < 7 {
                let (lcd, _) = feed.read_dibits(12);
                for chunk in lcd.chunks(3) {
                    let mut hex = 0u8;
                    for d in chunk {
                        hex = (hex << 2) | d;
                    }
                    lc_hexbits.push(hex);
                }
            }
        }

        // RS over the embedded words: header RS(24,12), tail RS(36,20)
        if lc_hexbits.len() >= 24 {
            let mut cw = [0u8; 24];
            cw.copy_from_slice(&lc_hexbits[..24]);
            if rs::rs_24_12(&mut cw).ok() {
                let mut lcw = [0u8; 9];
                for (i, byte) in lcw.iter_mut().enumerate() {
                    // repack 6-bit symbols into bytes
                    let bit0 = i * 8;
                    let mut v = 0u8;
                    for b in 0..8 {
                        let bit = bit0 + b;
                        let hex = cw[bit / 6];
                        v = (v << 1) | ((hex >> (5 - (bit % 6))) & 1);
                    }
                    *byte = v;
                }
                if !ldu2 {
                    self.route_lcw(ctx, &lcw);
                }
            } else {
                erred = true;
            }
        }

        // low-speed data: two (16,8) words
        for _ in 0..2 {
            let (d, _) = feed.read_dibits(8);
            if d.len() == 8 {
                let mut cw = 0u32;
                for v in d {
                    cw = (cw << 2) | u32::from(v);
                }
                if !LSD_16_8.decode(&mut cw) {
                    ctx.state.counters.p1_ber_bits += 2;
                }
            }
        }

        ctx.state.counters.update_voice_ema(erred);
        ctx.state.counters.p1_total_bits += 1728;
        if erred {
            ctx.state.counters.p1_ber_bits += 16;
        }
        FrameOutcome::Voice
    }

    fn handle_tdu(&mut self, ctx: &mut FrameCtx<'_>, slot: usize) -> FrameOutcome {
        let s = &mut ctx.state.slots[slot];
        s.burst = DmrBurst::VOICE_END_GRACE;
        let rec = EventRecord {
            proto: "P25",
            target: s.tg,
            source: s.src,
            cc_freq: ctx.state.trunk.cc_freq,
            flags: if s.alg_id != 0 {
                format!("ENC ALG 0x{:02X} KID 0x{:04X}", s.alg_id, s.key_id)
            } else {
                "CLEAR".into()
            },
            tx: "TX END".into(),
            ..EventRecord::default()
        };
        ctx.state.events[slot].push(rec);
        s.burst = DmrBurst::IDLE;
        FrameOutcome::Signaling
    }

    /// PDU header: emit the JSON diagnostic when enabled.
    fn handle_pdu(&mut self, ctx: &mut FrameCtx<'_>, feed: &mut dyn DibitFeed) -> FrameOutcome {
        // header block: 12 bytes = 48 dibits
        let (dibits, _) = feed.read_dibits(48);
        if dibits.len() < 48 {
            return FrameOutcome::Drop;
        }
        let mut bytes = [0u8; 12];
        for (i, chunk) in dibits.chunks(4).enumerate() {
            let mut v = 0u8;
            for d in chunk {
                v = (v << 2) | d;
            }
            bytes[i] = v;
        }
        let io = (bytes[0] >> 5) & 1;
        let _fmt = bytes[0] & 0x1F;
        let sap = bytes[1] & 0x3F;
        let mfid = bytes[2];
        let blocks = bytes[6] & 0x7F;
        let len = usize::from(blocks);

        if ctx.env.pdu_json {
            let line = format!(
                "{{\"sap\":{},\"mfid\":\"0x{:02X}\",\"io\":{},\"len\":{},\"summary\":\"{}\"}}",
                sap,
                mfid,
                io,
                len,
                sap_name(sap)
            );
            info!("PDU {}", line);
            self.pdu_json_log.push(line);
        }
        FrameOutcome::Signaling
    }
}

impl Default for P25p1Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for P25p1Handler {
    fn matches(&self, synctype: SyncType) -> bool {
        synctype == SyncType::P25p1
    }

    fn handle_frame(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        _synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        let (_nac, duid) = Self::read_nid(ctx, feed);
        match duid {
            duid::HDU => {
                // header: algorithm id / key id / MI for the coming call
                let (d, _) = feed.read_dibits(36);
                if d.len() == 36 {
                    let byte = |n: usize| -> u8 {
                        (d[4 * n] << 6) | (d[4 * n + 1] << 4) | (d[4 * n + 2] << 2) | d[4 * n + 3]
                    };
                    let s = &mut ctx.state.slots[0];
                    s.alg_id = byte(0);
                    s.key_id = (u16::from(byte(1)) << 8) | u16::from(byte(2));
                }
                FrameOutcome::Signaling
            }
            duid::LDU1 => self.handle_ldu(ctx, feed, false),
            duid::LDU2 => self.handle_ldu(ctx, feed, true),
            duid::TDU | duid::TDULC => self.handle_tdu(ctx, 0),
            duid::TSBK => self.handle_tsbk(ctx, feed),
            duid::PDU => self.handle_pdu(ctx, feed),
            other => {
                debug!("P25p1 DUID 0x{:X} unhandled", other);
                FrameOutcome::Drop
            }
        }
    }
}
