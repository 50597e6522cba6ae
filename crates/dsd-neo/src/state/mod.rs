// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoder state, partitioned into owned per-component records.
//!
//! One long-lived [`DecoderState`] exists per decoder instance. It is
//! single-writer: the demod thread owns it exclusively and peers see only
//! read-mostly snapshots published through the telemetry layer. The old
//! monolithic everything-struct is split along component lines - slicer
//! calibration, sync context, per-slot call context, trunking identity,
//! counters, event history - with the extension-slot table covering
//! late-bound per-module state.

pub mod ext;
pub mod opts;

pub use ext::{ExtSlotId, ExtTable};
pub use opts::{GroupEntry, Options};

use crate::audio::JitterRing;
use crate::sync::{DibitReader, Modulation, SymbolHistory, SyncMatch};
use crate::telemetry::EventHistory;
use crate::trunk::TrunkIdentity;
use std::time::Instant;

/// DMR per-slot burst FSM value.
///
/// Encoded as the historical small integer so slot displays and logs stay
/// comparable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmrBurst(pub u8);

impl DmrBurst {
    /// No traffic on the slot.
    pub const IDLE: DmrBurst = DmrBurst(24);
    /// Voice superframe in progress.
    pub const VOICE: DmrBurst = DmrBurst(16);
    /// Voice ended, grace window for late frames.
    pub const VOICE_END_GRACE: DmrBurst = DmrBurst(9);
    /// CACH / embedded signalling assembly.
    pub const SIGNALING: DmrBurst = DmrBurst(10);
    /// Data burst assembly.
    pub const DATA: DmrBurst = DmrBurst(6);

    pub fn is_voice(self) -> bool {
        matches!(self, DmrBurst::VOICE | DmrBurst::VOICE_END_GRACE)
    }
}

impl Default for DmrBurst {
    fn default() -> Self {
        DmrBurst::IDLE
    }
}

/// Per-slot call context (two slots for TDMA protocols).
#[derive(Debug, Default)]
pub struct SlotCtx {
    /// Current talkgroup.
    pub tg: u32,
    /// Source subscriber.
    pub src: u32,
    /// Encryption algorithm id (0 = clear).
    pub alg_id: u8,
    /// Encryption key id.
    pub key_id: u16,
    /// Message indicator / IV for keystream ciphers.
    pub mi: u64,
    /// Burst FSM value.
    pub burst: DmrBurst,
    /// Monotonic stamp of the last voice activity on this slot.
    pub last_voice: Option<Instant>,
    /// Result of the group gate / encryption policy conjunction.
    pub audio_allowed: bool,
    /// Jitter ring feeding the audio thread.
    pub jitter: JitterRing,
}

impl SlotCtx {
    /// Reset assembly for a new call (grant or C_MOVE).
    pub fn reset_assembly(&mut self) {
        self.alg_id = 0;
        self.key_id = 0;
        self.mi = 0;
        self.burst = DmrBurst::IDLE;
        self.jitter.clear();
    }

    /// Mark voice activity now.
    pub fn mark_voice(&mut self) {
        self.burst = DmrBurst::VOICE;
        self.last_voice = Some(Instant::now());
    }

    /// True while the burst FSM indicates active voice.
    pub fn voice_active(&self) -> bool {
        self.burst.is_voice()
    }
}

/// Sync acquisition context.
#[derive(Debug, Default)]
pub struct SyncCtx {
    /// Most recent sync match, if any.
    pub last: Option<SyncMatch>,
    /// Modulation label detected with the sync.
    pub modulation: Option<Modulation>,
    /// True once any sync has ever been achieved on this tune.
    pub ever_synced: bool,
}

/// Diagnostic counters, demod-thread local.
#[derive(Debug, Default, Clone)]
pub struct Counters {
    pub tunes: u64,
    pub releases: u64,
    pub neighbors_added: u64,
    pub neighbors_used: u64,
    pub facch_ok: u64,
    pub facch_err: u64,
    pub sacch_ok: u64,
    pub sacch_err: u64,
    /// P25 Phase 1 bit error accumulator.
    pub p1_ber_bits: u64,
    pub p1_total_bits: u64,
    /// Exponential moving average of voice frame errors.
    pub voice_err_ema: f32,
    /// Grants refused by policy (svc bits, trust, group gate).
    pub policy_refusals: u64,
    /// Producer-side input ring overflow drops.
    pub input_drops: u64,
}

impl Counters {
    /// Fold one voice frame result into the error EMA.
    pub fn update_voice_ema(&mut self, erred: bool) {
        let x = if erred { 1.0 } else { 0.0 };
        self.voice_err_ema = 0.95 * self.voice_err_ema + 0.05 * x;
    }

    /// Current P25p1 BER estimate.
    pub fn p1_ber(&self) -> f64 {
        if self.p1_total_bits == 0 {
            0.0
        } else {
            self.p1_ber_bits as f64 / self.p1_total_bits as f64
        }
    }
}

/// The long-lived decoder state. Single writer: the demod thread.
pub struct DecoderState {
    /// Dibit slicer with adaptive thresholds.
    pub reader: DibitReader,
    /// Recent symbol values for warm-start and diagnostics.
    pub history: SymbolHistory,
    /// Sync acquisition context.
    pub sync: SyncCtx,
    /// Per-slot call context.
    pub slots: [SlotCtx; 2],
    /// Trunking identity: site, IDEN tables, channel maps.
    pub trunk: TrunkIdentity,
    /// Diagnostic counters.
    pub counters: Counters,
    /// Per-slot event history rings.
    pub events: [EventHistory; 2],
    /// Late-bound per-module state.
    pub ext: ExtTable,
}

impl DecoderState {
    /// Deterministic initializer: zeroed fields, allocated rings.
    pub fn new() -> Self {
        Self {
            reader: DibitReader::new(64),
            history: SymbolHistory::default(),
            sync: SyncCtx::default(),
            slots: [SlotCtx::default(), SlotCtx::default()],
            trunk: TrunkIdentity::default(),
            counters: Counters::default(),
            events: [EventHistory::default(), EventHistory::default()],
            ext: ExtTable::new(),
        }
    }

    /// Clear per-tune context after a retune: symbol history, sync latch and
    /// slot assembly. Calibration and trunking identity survive.
    pub fn on_retune(&mut self) {
        self.history.clear();
        self.sync.last = None;
        for slot in self.slots.iter_mut() {
            slot.reset_assembly();
            slot.last_voice = None;
        }
    }
}

impl Default for DecoderState {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DecoderState {
    fn drop(&mut self) {
        // teardown walks the extension table; rings free with their owners
        self.ext.teardown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_fsm_values() {
        assert_eq!(DmrBurst::IDLE.0, 24);
        assert_eq!(DmrBurst::VOICE.0, 16);
        assert_eq!(DmrBurst::VOICE_END_GRACE.0, 9);
        assert!(DmrBurst::VOICE.is_voice());
        assert!(!DmrBurst::IDLE.is_voice());
    }

    #[test]
    fn test_retune_clears_slot_assembly() {
        let mut st = DecoderState::new();
        st.slots[0].tg = 1001;
        st.slots[0].alg_id = 0x21;
        st.slots[0].mark_voice();
        st.history.push(1.0);
        st.on_retune();
        assert_eq!(st.slots[0].alg_id, 0);
        assert!(!st.slots[0].voice_active());
        assert!(st.history.is_empty());
        // talkgroup identity survives for display continuity
        assert_eq!(st.slots[0].tg, 1001);
    }

    #[test]
    fn test_voice_ema_decays() {
        let mut c = Counters::default();
        for _ in 0..10 {
            c.update_voice_ema(true);
        }
        let high = c.voice_err_ema;
        for _ in 0..50 {
            c.update_voice_ema(false);
        }
        assert!(c.voice_err_ema < high / 4.0);
    }
}
