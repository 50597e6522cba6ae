// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end trunk-following scenarios over symbol-capture streams.
//!
//! Each scenario builds the literal dibit stream a capture file would hold
//! (sync word, slot type, BPTC-protected CSBK) and runs it through the
//! decoder with a capturing tuner hook.

use dsd_neo::config::{EnvSwitches, RuntimeConfig};
use dsd_neo::fec::{bptc, GOLAY_20_8};
use dsd_neo::io::TunerHook;
use dsd_neo::proto::dmr::csbk;
use dsd_neo::runtime::{Decoder, DecoderHooks};
use dsd_neo::state::{DmrBurst, Options};
use dsd_neo::sync::Modulation;
use dsd_neo::telemetry::SnapshotHub;
use std::sync::{Arc, Mutex};

/// Tuner double recording every call.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Freq(u64),
    Return,
    Modulation,
    SymbolRate(u32),
}

#[derive(Default, Clone)]
struct CaptureTuner {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CaptureTuner {
    fn freq_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Freq(_)))
            .count()
    }

    fn returns(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Return))
            .count()
    }

    fn p25_overrides(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Modulation | Call::SymbolRate(_)))
            .count()
    }
}

impl TunerHook for CaptureTuner {
    fn tune_to_freq(&mut self, hz: u64, _ted_sps: u32) {
        self.calls.lock().unwrap().push(Call::Freq(hz));
    }
    fn tune_to_cc(&mut self, hz: u64, _ted_sps: u32) {
        self.calls.lock().unwrap().push(Call::Freq(hz));
    }
    fn return_to_cc(&mut self) {
        self.calls.lock().unwrap().push(Call::Return);
    }
    fn set_modulation(&mut self, _m: Modulation) {
        self.calls.lock().unwrap().push(Call::Modulation);
    }
    fn set_symbol_rate(&mut self, rate: u32) {
        self.calls.lock().unwrap().push(Call::SymbolRate(rate));
    }
}

/// DMR base-station data sync as dibits.
fn dmr_data_sync() -> Vec<u8> {
    "313333111331131131331131".bytes().map(|b| b - b'0').collect()
}

/// One data burst: sync + slot-type (Golay 20,8) + BPTC(196,96) payload.
fn data_burst(dtype: u8, payload96: &[u8; 96]) -> Vec<u8> {
    let mut out = dmr_data_sync();
    let cw = GOLAY_20_8.encode(u32::from(dtype & 0xF));
    for i in (0..10).rev() {
        out.push(((cw >> (2 * i)) & 3) as u8);
    }
    let bits = bptc::encode_196(payload96);
    for i in 0..98 {
        out.push((bits[2 * i] << 1) | bits[2 * i + 1]);
    }
    out
}

fn csbk_burst(opcode: u8, payload: u64) -> Vec<u8> {
    let bits = csbk::build_csbk(opcode, 0, payload);
    let mut p96 = [0u8; 96];
    p96.copy_from_slice(&bits);
    data_burst(3, &p96) // data type 3 = CSBK
}

fn t3_decoder(tuner: CaptureTuner) -> Decoder {
    // zeroed grace so release scenarios are immediate and deterministic
    dsd_neo::config::set_runtime(RuntimeConfig {
        hangtime_s: 0.0,
        vc_grace_s: 3600.0, // no tick-driven release during the scenario
        mac_hold_s: 0.0,
        ring_hold_s: 0.0,
        cc_grace_s: 0.0,
    });
    let opts = Options {
        trunk_enable: true,
        p25_trunk: false,
        ..Options::default()
    };
    // keep the candidate cache off disk during the scenarios
    let env = EnvSwitches {
        cc_cache: false,
        ..EnvSwitches::all_enabled()
    };
    let mut d = Decoder::new(
        opts,
        env,
        DecoderHooks {
            tuner: Box::new(tuner),
            vocoder: None,
            snapshots: Arc::new(SnapshotHub::new()),
            metrics: None,
        },
    );
    d.state.trunk.cc_freq = 851_000_000;
    d.state.trunk.on_cc = true;
    d
}

#[test]
fn dmr_t3_grant_tunes_voice_channel() {
    // grant on CC 851.000000, LPCN 0x0010, TG 1001, SRC 222
    let tuner = CaptureTuner::default();
    let mut d = t3_decoder(tuner.clone());

    let payload = (0x0010u64 << 48) | (1001u64 << 24) | 222;
    d.process_dibits(&csbk_burst(csbk::opcode::TV_GRANT, payload));

    assert_eq!(d.state.trunk.vc_freq[0], 852_000_000);
    assert!(d.state.trunk.tuned);
    assert_eq!(d.state.counters.tunes, 1);
    assert_eq!(tuner.freq_calls(), 1);
    assert_eq!(d.state.slots[0].tg, 1001);
    assert_eq!(d.state.slots[0].src, 222);
}

#[test]
fn dmr_t3_c_move_transitions_voice_pair() {
    let tuner = CaptureTuner::default();
    let mut d = t3_decoder(tuner.clone());

    let grant = (0x0010u64 << 48) | (1001u64 << 24) | 222;
    d.process_dibits(&csbk_burst(csbk::opcode::TV_GRANT, grant));
    // pretend the opposite slot had activity so the reset is observable
    d.state.slots[1].burst = DmrBurst::VOICE;

    // C_MOVE: APCN 0x0456, RX_INT 853 MHz, RX_STEP 4000x125, first 0x0454,
    // destination TS1
    let cmove = (0x0456u64 << 48) | (853u64 << 32) | (4000u64 << 16) | (0x0454u64 << 1);
    d.process_dibits(&csbk_burst(csbk::opcode::C_MOVE, cmove));

    assert_eq!(d.state.trunk.vc_freq[0], 853_500_000);
    assert_eq!(d.state.slots[1].burst, DmrBurst::IDLE, "opposite slot reset");
    assert_eq!(d.state.slots[0].burst, DmrBurst::VOICE, "destination voice");
    assert_eq!(tuner.freq_calls(), 2);
}

#[test]
fn dmr_t3_p_clear_returns_to_cc_once() {
    let tuner = CaptureTuner::default();
    let mut d = t3_decoder(tuner.clone());

    let grant = (0x0010u64 << 48) | (1001u64 << 24) | 222;
    d.process_dibits(&csbk_burst(csbk::opcode::TV_GRANT, grant));
    let cmove = (0x0456u64 << 48) | (853u64 << 32) | (4000u64 << 16) | (0x0454u64 << 1);
    d.process_dibits(&csbk_burst(csbk::opcode::C_MOVE, cmove));
    d.process_dibits(&csbk_burst(csbk::opcode::P_CLEAR, 0));

    assert!(!d.state.trunk.tuned);
    assert_eq!(d.state.trunk.vc_freq, [0, 0]);
    assert_eq!(tuner.returns(), 1, "exactly one return-to-CC");
    assert_eq!(d.state.counters.releases, 1);
}

#[test]
fn dmr_t3_return_never_applies_p25_overrides() {
    // trunk_enable=1, p25_trunk=0: the return path must call the tuner hook
    // and must not touch modulation or symbol-rate overrides
    let tuner = CaptureTuner::default();
    let mut d = t3_decoder(tuner.clone());

    let grant = (0x0010u64 << 48) | (1001u64 << 24) | 222;
    d.process_dibits(&csbk_burst(csbk::opcode::TV_GRANT, grant));
    d.process_dibits(&csbk_burst(csbk::opcode::P_CLEAR, 0));

    assert_eq!(tuner.returns(), 1);
    assert_eq!(tuner.p25_overrides(), 0);
}

#[test]
fn neighbor_broadcast_feeds_candidate_ring() {
    let tuner = CaptureTuner::default();
    let mut d = t3_decoder(tuner.clone());

    // four neighbor LPCNs, one of them zero (skipped)
    let payload =
        (0x0020u64 << 48) | (0x0030u64 << 32) | (0x0000u64 << 16) | 0x0040u64;
    d.process_dibits(&csbk_burst(csbk::opcode::C_BCAST, payload));

    assert_eq!(d.state.counters.neighbors_added, 3);
    assert_eq!(d.state.trunk.cc_candidates.len(), 3);
}
