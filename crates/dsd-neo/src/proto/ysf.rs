// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YSF (System Fusion) and ProVoice/EDACS frame handlers.
//!
//! YSF frames open with the FICH, four Golay(20,8)-protected words naming
//! the frame/channel type; voice channels carry AMBE. ProVoice carries
//! IMBE-7100 frames over the EDACS voice channel, so the EDACS frame sync
//! routes to the same handler; the dotting sequence stays a preamble hint.
//! Only the default long-pattern sync path is wired.

use super::{DibitFeed, FrameCtx, FrameHandler, FrameOutcome};
use crate::audio::gate::gate_decision;
use crate::fec::GOLAY_20_8;
use crate::sync::SyncType;
use crate::telemetry::EventRecord;
use crate::{debug, info};

/// YSF frame types from the FICH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YsfFrameType {
    Header,
    Communications,
    Terminator,
    Test,
}

impl YsfFrameType {
    fn from_fi(fi: u8) -> Self {
        match fi & 3 {
            0 => YsfFrameType::Header,
            1 => YsfFrameType::Communications,
            2 => YsfFrameType::Terminator,
            _ => YsfFrameType::Test,
        }
    }
}

/// YSF handler.
pub struct YsfHandler;

impl YsfHandler {
    pub fn new() -> Self {
        Self
    }

    /// Read one Golay(20,8) FICH word.
    fn read_fich_word(feed: &mut dyn DibitFeed) -> Option<u8> {
        let mut cw = 0u32;
        for _ in 0..10 {
            cw = (cw << 2) | u32::from(feed.next_dibit());
        }
        GOLAY_20_8.decode(&mut cw).then(|| GOLAY_20_8.message(cw) as u8)
    }
}

impl Default for YsfHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for YsfHandler {
    fn matches(&self, synctype: SyncType) -> bool {
        synctype == SyncType::Ysf
    }

    fn handle_frame(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        _synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        let Some(w0) = Self::read_fich_word(feed) else {
            return FrameOutcome::Drop;
        };
        // remaining three FICH words: consumed, tolerant of errors
        for _ in 0..3 {
            let _ = Self::read_fich_word(feed);
        }
        match YsfFrameType::from_fi(w0 >> 6) {
            YsfFrameType::Header => {
                info!("YSF header (dt {})", w0 & 0x3);
                ctx.state.events[0].push(EventRecord {
                    proto: "YSF",
                    flags: "CLEAR".into(),
                    tx: "TX BEGIN".into(),
                    ..EventRecord::default()
                });
                FrameOutcome::Signaling
            }
            YsfFrameType::Communications => {
                ctx.sm.voice_sync(&mut ctx.state.slots, 0);
                let allowed =
                    gate_decision(ctx.opts, ctx.state.slots[0].tg, 0).open();
                ctx.state.slots[0].audio_allowed = allowed;
                for _ in 0..5 {
                    let (dibits, _) = feed.read_dibits(36);
                    if dibits.len() < 36 || !allowed {
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
            YsfFrameType::Terminator => {
                ctx.state.slots[0].burst = crate::state::DmrBurst::IDLE;
                ctx.state.events[0].push(EventRecord {
                    proto: "YSF",
                    flags: "CLEAR".into(),
                    tx: "TX END".into(),
                    ..EventRecord::default()
                });
                FrameOutcome::Signaling
            }
            YsfFrameType::Test => FrameOutcome::Drop,
        }
    }
}

/// ProVoice/EDACS handler (long-pattern path).
///
/// Claims the EDACS frame sync alongside the two ProVoice syncs: an EDACS
/// voice channel carries the same IMBE-7100 frame structure.
pub struct ProVoiceHandler;

impl ProVoiceHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProVoiceHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for ProVoiceHandler {
    fn matches(&self, synctype: SyncType) -> bool {
        matches!(
            synctype,
            SyncType::ProVoice | SyncType::ProVoiceEa | SyncType::Edacs
        )
    }

    fn handle_frame(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        ctx.sm.voice_sync(&mut ctx.state.slots, 0);
        let allowed = gate_decision(ctx.opts, ctx.state.slots[0].tg, 0).open()
            && (synctype != SyncType::ProVoiceEa || ctx.opts.tune_enc_calls);
        ctx.state.slots[0].audio_allowed = allowed;

        // four IMBE-7100 frames of 72 bits
        let mut erred = false;
        for _ in 0..4 {
            let (dibits, _) = feed.read_dibits(36);
            if dibits.len() < 36 {
                erred = true;
                break;
            }
            if !allowed {
                continue;
            }
            let mut imbe = [0u8; 72];
            for (i, b) in imbe.iter_mut().enumerate() {
                let d = dibits[i / 2];
                *b = if i % 2 == 0 { d >> 1 } else { d & 1 };
            }
            if let Some(voc) = ctx.vocoder.as_deref_mut() {
                if let Some(frame) = voc.process_mbe_frame(None, None, Some(&imbe)) {
                    ctx.state.slots[0].jitter.push(&frame);
                } else {
                    erred = true;
                }
            }
        }
        ctx.state.counters.update_voice_ema(erred);
        debug!("ProVoice frame ({:?})", synctype);
        FrameOutcome::Voice
    }
}
