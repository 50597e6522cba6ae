// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DMR frame handler.
//!
//! After a DMR sync the handler reads a slot-type word (Golay(20,8): color
//! code + data type) and a 98-dibit payload. Voice syncs carry three AMBE
//! subframes; data syncs carry BPTC(196,96) signaling or rate-3/4 data
//! blocks. The per-slot burst FSM keeps the historical small-integer
//! encoding (24 idle / 16 voice / 9 grace) that logs and displays key on.
//!
//! Tier III control (grants, C_MOVE, P_CLEAR, neighbor broadcasts) routes
//! into the trunking state machine when DMR trunk following is enabled.

pub mod alias;
pub mod csbk;
pub mod data;
pub mod lc;

use super::{DibitFeed, FrameCtx, FrameHandler, FrameOutcome};
use crate::audio::gate::gate_decision;
use crate::fec::{bptc, trellis34, GOLAY_20_8};
use crate::state::DmrBurst;
use crate::sync::SyncType;
use crate::telemetry::{lrrp, EventRecord};
use crate::trunk::dmr_t3;
use crate::{debug, info, warn};

/// Data type nibble from the slot-type word.
mod data_type {
    pub const VOICE_LC_HEADER: u8 = 1;
    pub const TERMINATOR_LC: u8 = 2;
    pub const CSBK: u8 = 3;
    pub const DATA_HEADER: u8 = 6;
    pub const RATE_34_DATA: u8 = 7;
}

/// Multi-block data assembly toward an LRRP payload.
#[derive(Debug, Default)]
struct DataAssembler {
    expected: usize,
    bytes: Vec<u8>,
}

impl DataAssembler {
    fn start(&mut self, blocks: usize) {
        self.expected = blocks;
        self.bytes.clear();
    }

    fn push(&mut self, block: &[u8; 16]) -> bool {
        if self.expected == 0 {
            return false;
        }
        self.bytes.extend_from_slice(block);
        self.bytes.len() >= self.expected * 16
    }

    fn take(&mut self) -> Vec<u8> {
        self.expected = 0;
        std::mem::take(&mut self.bytes)
    }
}

/// DMR frame state machine.
pub struct DmrHandler {
    alias: [alias::AliasAssembler; 2],
    mi: [lc::MiAssembler; 2],
    data: [DataAssembler; 2],
}

impl DmrHandler {
    pub fn new() -> Self {
        Self {
            alias: [alias::AliasAssembler::default(), alias::AliasAssembler::default()],
            mi: [lc::MiAssembler::default(), lc::MiAssembler::default()],
            data: [DataAssembler::default(), DataAssembler::default()],
        }
    }

    fn slot_for(synctype: SyncType) -> usize {
        match synctype {
            SyncType::DmrTs2Voice | SyncType::DmrTs2Data => 1,
            _ => 0,
        }
    }

    /// Read and decode the slot-type word. `None` on FEC failure.
    fn read_slot_type(feed: &mut dyn DibitFeed) -> Option<(u8, u8)> {
        let mut cw = 0u32;
        for _ in 0..10 {
            cw = (cw << 2) | u32::from(feed.next_dibit());
        }
        if !GOLAY_20_8.decode(&mut cw) {
            return None;
        }
        let msg = GOLAY_20_8.message(cw) as u8;
        Some((msg >> 4, msg & 0xF)) // (color code, data type)
    }

    /// Read the 98-dibit burst payload as 196 bits.
    fn read_payload_bits(feed: &mut dyn DibitFeed) -> ([u8; 196], [u8; 98]) {
        let mut bits = [0u8; 196];
        let mut rel = [0u8; 98];
        for i in 0..98 {
            let s = feed.next_symbol();
            let (d, r) = s.map(|s| (s.dibit, s.reliability)).unwrap_or((0, 0));
            bits[2 * i] = d >> 1;
            bits[2 * i + 1] = d & 1;
            rel[i] = r;
        }
        (bits, rel)
    }

    fn handle_voice(&mut self, ctx: &mut FrameCtx<'_>, slot: usize, feed: &mut dyn DibitFeed) -> FrameOutcome {
        ctx.sm.voice_sync(&mut ctx.state.slots, slot);

        let (tg, alg_id) = {
            let s = &ctx.state.slots[slot];
            (s.tg, s.alg_id)
        };
        let gate = gate_decision(ctx.opts, tg, slot);
        let allowed = gate.open() && (alg_id == 0 || ctx.opts.tune_enc_calls);
        ctx.state.slots[slot].audio_allowed = allowed;

        // three AMBE subframes of 32 dibits each, remainder is embedded
        let mut erred = false;
        for _ in 0..3 {
            let (dibits, _) = feed.read_dibits(32);
            if dibits.len() < 32 {
                erred = true;
                break;
            }
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
        feed.read_dibits(2); // embedded remainder
        ctx.state.counters.update_voice_ema(erred);
        FrameOutcome::Voice
    }

    fn handle_full_lc(&mut self, ctx: &mut FrameCtx<'_>, slot: usize, bits196: &[u8; 196], terminator: bool) -> FrameOutcome {
        let Some(payload) = bptc::decode_196(bits196) else {
            ctx.state.counters.update_voice_ema(true);
            return FrameOutcome::Drop;
        };
        // BPTC yields 96 bits; the LC occupies the first 72, the rest is CRC
        let mut lc_bits = [0u8; 72];
        lc_bits.copy_from_slice(&payload[..72]);
        let full = lc::parse_full_lc(&lc_bits);

        match full.flco {
            lc::flco::GROUP_VOICE | lc::flco::UNIT_VOICE => {
                let s = &mut ctx.state.slots[slot];
                s.tg = full.tg;
                s.src = full.src;
                if terminator {
                    s.burst = DmrBurst::VOICE_END_GRACE;
                    let rec = EventRecord {
                        proto: "DMR",
                        target: full.tg,
                        source: full.src,
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
                } else {
                    s.burst = DmrBurst::SIGNALING;
                    info!("DMR slot {} LC TG {} SRC {}", slot, full.tg, full.src);
                }
            }
            lc::flco::TALKER_ALIAS_HDR => {
                self.alias[slot].add_header(full.so, lc::alias_payload(&lc_bits));
                self.try_finish_alias(ctx, slot);
            }
            lc::flco::TALKER_ALIAS_BLK1 | lc::flco::TALKER_ALIAS_BLK2
            | lc::flco::TALKER_ALIAS_BLK3 => {
                let n = usize::from(full.flco - lc::flco::TALKER_ALIAS_HDR);
                self.alias[slot].add_block(n, &lc_bits[16..]);
                self.try_finish_alias(ctx, slot);
            }
            other => {
                debug!("DMR slot {} FLCO 0x{:02X} unhandled", slot, other);
            }
        }
        FrameOutcome::Signaling
    }

    fn try_finish_alias(&mut self, ctx: &mut FrameCtx<'_>, slot: usize) {
        if let Some(text) = self.alias[slot].decode() {
            if text.is_empty() {
                return;
            }
            let tg = ctx.state.slots[slot].tg;
            // capacity-guarded: a full group table refuses new entries and
            // never mutates neighboring storage
            if !ctx.opts.upsert_group(tg, &text, "A") {
                warn!("group table full; talker alias for TG {} not stored", tg);
            }
            self.alias[slot].reset();
        }
    }

    fn handle_csbk(&mut self, ctx: &mut FrameCtx<'_>, bits196: &[u8; 196]) -> FrameOutcome {
        let Some(payload) = bptc::decode_196(bits196) else {
            return FrameOutcome::Drop;
        };
        let mut bits = [0u8; 96];
        bits.copy_from_slice(&payload);
        let csbk = csbk::parse_csbk(&bits);
        if !csbk.crc_ok {
            return FrameOutcome::Drop;
        }

        let t3_active = ctx.opts.trunk_enable && !ctx.opts.p25_trunk;
        match csbk.opcode {
            csbk::opcode::TV_GRANT | csbk::opcode::PV_GRANT if t3_active => {
                let (lpcn, tg, src) = csbk::grant_fields(csbk.payload);
                let policy = crate::trunk::p25::policy_from_opts(ctx.opts);
                dmr_t3::group_grant(
                    ctx.sm,
                    &mut ctx.state.trunk,
                    &mut ctx.state.counters,
                    &mut ctx.state.slots,
                    ctx.tuner,
                    &policy,
                    ctx.env,
                    lpcn,
                    tg,
                    src,
                    crate::trunk::SvcBits::default(),
                    ctx.opts.samples_per_symbol,
                );
            }
            csbk::opcode::C_MOVE if t3_active => {
                let (apcn, rx_int, rx_step, first, slot) = csbk::c_move_fields(csbk.payload);
                let plan = dmr_t3::ChannelPlan {
                    rx_int_mhz: rx_int,
                    rx_step,
                    first_apcn: first,
                };
                dmr_t3::c_move(
                    ctx.sm,
                    &mut ctx.state.trunk,
                    &mut ctx.state.counters,
                    &mut ctx.state.slots,
                    ctx.tuner,
                    &plan,
                    apcn,
                    slot,
                    ctx.opts.samples_per_symbol,
                );
            }
            csbk::opcode::P_CLEAR if t3_active => {
                let cfg = crate::config::runtime();
                dmr_t3::p_clear(
                    ctx.sm,
                    &mut ctx.state.trunk,
                    &mut ctx.state.counters,
                    &mut ctx.state.slots,
                    ctx.tuner,
                    &cfg,
                );
            }
            csbk::opcode::C_BCAST if t3_active => {
                let freqs: Vec<u64> = csbk::bcast_neighbors(csbk.payload)
                    .iter()
                    .filter(|&&l| l != 0)
                    .map(|&l| dmr_t3::lpcn_to_freq(ctx.env, ctx.state.trunk.cc_freq, l).0)
                    .collect();
                ctx.sm.neighbor_update(
                    &mut ctx.state.trunk,
                    &mut ctx.state.counters,
                    ctx.env,
                    &freqs,
                );
            }
            other => {
                debug!("DMR CSBK opcode 0x{:02X} FID 0x{:02X}", other, csbk.fid);
            }
        }
        FrameOutcome::Signaling
    }

    fn handle_data(&mut self, ctx: &mut FrameCtx<'_>, slot: usize, bits196: &[u8; 196], rel: &[u8; 98], header: bool) -> FrameOutcome {
        if header {
            let Some(payload) = bptc::decode_196(bits196) else {
                return FrameOutcome::Drop;
            };
            // blocks-to-follow lives in the header's low nibble of byte 0
            let mut b0 = 0u8;
            for i in 0..8 {
                b0 = (b0 << 1) | payload[i];
            }
            self.data[slot].start(usize::from(b0 & 0xF));
            return FrameOutcome::Signaling;
        }

        // rate 3/4 confirmed block
        let mut dibits = [0u8; 98];
        for i in 0..98 {
            dibits[i] = (bits196[2 * i] << 1) | bits196[2 * i + 1];
        }
        let Some(payload) = trellis34::decode(&dibits, Some(rel)) else {
            ctx.state.counters.update_voice_ema(true);
            return FrameOutcome::Drop;
        };
        let block = data::parse_confirmed_block(&payload);
        if !block.crc_ok {
            return FrameOutcome::Drop;
        }
        if self.data[slot].push(&block.data) {
            let bytes = self.data[slot].take();
            if let Some(report) = lrrp::parse_lrrp_udp(&bytes, ctx.opts.speed_unit) {
                info!(
                    "LRRP slot {}: {:.5},{:.5} {}",
                    slot, report.lat, report.lon, report.timestamp
                );
                if let Some(path) = &ctx.opts.lrrp_file {
                    let line = format!(
                        "{} {} {:.6} {:.6}\n",
                        report.timestamp, ctx.state.slots[slot].src, report.lat, report.lon
                    );
                    if let Err(e) = append_file(path, &line) {
                        warn!("lrrp file write failed: {}", e);
                    }
                }
            }
        }
        FrameOutcome::Signaling
    }
}

fn append_file(path: &std::path::Path, line: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(line.as_bytes())
}

impl Default for DmrHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for DmrHandler {
    fn matches(&self, synctype: SyncType) -> bool {
        synctype.protocol() == crate::sync::Protocol::Dmr
    }

    fn handle_frame(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        let slot = Self::slot_for(synctype);

        if synctype.is_voice_sync() {
            // voice bursts skip the slot-type word
            return self.handle_voice(ctx, slot, feed);
        }

        let Some((_cc, dtype)) = Self::read_slot_type(feed) else {
            ctx.state.slots[slot].burst = DmrBurst::IDLE;
            return FrameOutcome::Drop;
        };
        let (bits, rel) = Self::read_payload_bits(feed);

        match dtype {
            data_type::VOICE_LC_HEADER => self.handle_full_lc(ctx, slot, &bits, false),
            data_type::TERMINATOR_LC => self.handle_full_lc(ctx, slot, &bits, true),
            data_type::CSBK => self.handle_csbk(ctx, &bits),
            data_type::DATA_HEADER => {
                ctx.state.slots[slot].burst = DmrBurst::DATA;
                self.handle_data(ctx, slot, &bits, &rel, true)
            }
            data_type::RATE_34_DATA => {
                ctx.state.slots[slot].burst = DmrBurst::DATA;
                self.handle_data(ctx, slot, &bits, &rel, false)
            }
            other => {
                debug!("DMR slot {} data type {} unhandled", slot, other);
                FrameOutcome::Drop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::test_support::CtxBundle;
    use crate::proto::VecFeed;

    /// Build the on-air dibits for a data burst: slot type + BPTC payload.
    pub(crate) fn burst_dibits(dtype: u8, payload_bits196: &[u8; 196]) -> Vec<u8> {
        let msg = u32::from(dtype & 0xF); // color code 0
        let cw = GOLAY_20_8.encode(msg);
        let mut out = Vec::with_capacity(108);
        for i in (0..10).rev() {
            out.push(((cw >> (2 * i)) & 3) as u8);
        }
        for i in 0..98 {
            out.push((payload_bits196[2 * i] << 1) | payload_bits196[2 * i + 1]);
        }
        out
    }

    fn bptc_bits(payload96: &[u8; 96]) -> [u8; 196] {
        bptc::encode_196(payload96)
    }

    #[test]
    fn test_csbk_grant_tunes_t3() {
        let mut b = CtxBundle::new();
        b.opts.trunk_enable = true;
        b.opts.p25_trunk = false;
        b.state.trunk.cc_freq = 851_000_000;
        b.state.trunk.on_cc = true;
        b.sm = crate::trunk::TrunkSm::new(crate::trunk::TrunkFlavor::DmrTier3);

        let payload = (0x0010u64 << 48) | (1001u64 << 24) | 222;
        let bits = csbk::build_csbk(csbk::opcode::TV_GRANT, 0, payload);
        let mut p96 = [0u8; 96];
        p96.copy_from_slice(&bits);
        let dibits = burst_dibits(data_type::CSBK, &bptc_bits(&p96));

        let mut h = DmrHandler::new();
        let mut feed = VecFeed::from_dibits(&dibits);
        let out = h.handle_frame(&mut b.ctx(), SyncType::DmrBsData, &mut feed);
        assert_eq!(out, FrameOutcome::Signaling);
        assert_eq!(b.state.trunk.vc_freq[0], 852_000_000);
        assert!(b.state.trunk.tuned);
        assert_eq!(b.state.counters.tunes, 1);
    }

    #[test]
    fn test_terminator_sets_grace_and_event() {
        let mut b = CtxBundle::new();
        let lc_bits = lc::build_full_lc(&lc::FullLc {
            flco: lc::flco::GROUP_VOICE,
            fid: 0,
            so: 0,
            tg: 1001,
            src: 222,
        });
        let mut p96 = [0u8; 96];
        p96[..72].copy_from_slice(&lc_bits);
        let dibits = burst_dibits(data_type::TERMINATOR_LC, &bptc_bits(&p96));

        let mut h = DmrHandler::new();
        let mut feed = VecFeed::from_dibits(&dibits);
        h.handle_frame(&mut b.ctx(), SyncType::DmrTs2Data, &mut feed);
        assert_eq!(b.state.slots[1].burst, DmrBurst::VOICE_END_GRACE);
        let ev = b.state.events[1].latest().expect("event");
        assert_eq!(ev.target, 1001);
        assert_eq!(ev.tx, "TX END");
    }

    #[test]
    fn test_voice_sync_marks_slot() {
        let mut b = CtxBundle::new();
        let mut h = DmrHandler::new();
        let mut feed = VecFeed::from_dibits(&[0; 98]);
        let out = h.handle_frame(&mut b.ctx(), SyncType::DmrTs1Voice, &mut feed);
        assert_eq!(out, FrameOutcome::Voice);
        assert!(b.state.slots[0].voice_active());
    }

    #[test]
    fn test_alias_via_lc_updates_group_table() {
        let mut b = CtxBundle::new();
        b.state.slots[0].tg = 900;
        let mut h = DmrHandler::new();

        // 5-character 8-bit alias: "OPS 5"
        let text = "OPS 5";
        let mut alias_bits = Vec::new();
        for byte in text.bytes() {
            for i in (0..8).rev() {
                alias_bits.push((byte >> i) & 1);
            }
        }
        let so = 0b0100_0000 | text.len() as u8;

        // header LC with the alias payload in its data bytes
        let mut lc_bits = lc::build_full_lc(&lc::FullLc {
            flco: lc::flco::TALKER_ALIAS_HDR,
            fid: 0,
            so,
            tg: 0,
            src: 0,
        });
        for (i, &bit) in alias_bits.iter().take(alias::HEADER_PAYLOAD_BITS).enumerate() {
            lc_bits[31 + i] = bit;
        }
        let mut p96 = [0u8; 96];
        p96[..72].copy_from_slice(&lc_bits);
        let dibits = burst_dibits(data_type::VOICE_LC_HEADER, &bptc_bits(&p96));
        let mut feed = VecFeed::from_dibits(&dibits);
        h.handle_frame(&mut b.ctx(), SyncType::DmrBsData, &mut feed);

        assert_eq!(b.opts.group(900).map(|g| g.name.as_str()), Some(text));
    }
}
