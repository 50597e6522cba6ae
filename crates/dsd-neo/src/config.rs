// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DSD-NEO global configuration - single source of truth.
//!
//! This module centralizes compile-time constants and runtime configuration.
//! **NEVER hardcode elsewhere!**
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: compile-time constants (symbol rates, ring sizes)
//! - **Level 2 (Dynamic)**: [`RuntimeConfig`] snapshot for tunables read once
//!   per trunking tick (hangtime, grace periods, holds)
//! - **Level 3 (Environment)**: `DSD_NEO_*` switches captured at startup
//!
//! Readers obtain the runtime snapshot through an atomic pointer swap; the
//! snapshot itself is immutable, so a tick never observes a half-updated set
//! of tunables.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::OnceLock;

// =======================================================================
// Symbol and sample rates
// =======================================================================

/// Nominal symbol rate shared by DMR, P25 and most supported protocols.
pub const SYMBOL_RATE: u32 = 4800;

/// P25 Phase 1 C4FM symbol rate equals [`SYMBOL_RATE`]; ProVoice runs faster.
pub const PROVOICE_SYMBOL_RATE: u32 = 9600;

/// Default audio output rate in Hz.
pub const AUDIO_RATE: u32 = 8000;

/// Optional high-rate audio output in Hz.
pub const AUDIO_RATE_HIGH: u32 = 48000;

/// Default samples per symbol for FM/C4FM paths.
pub const SAMPLES_PER_SYMBOL: u32 = 10;

/// Samples per symbol after decimation on the CQPSK path.
pub const SAMPLES_PER_SYMBOL_CQPSK: u32 = 5;

// =======================================================================
// Ring capacities
// =======================================================================

/// Symbol history ring length (floats).
pub const SYMBOL_HISTORY_LEN: usize = 2048;

/// Rolling slicer min/max window maximum length.
pub const SLICER_WINDOW_MAX: usize = 1024;

/// Per-slot jitter ring depth in 160-sample frames (~60 ms at 8 kHz).
pub const JITTER_FRAMES: usize = 3;

/// Samples per voice frame at 8 kHz.
pub const FRAME_SAMPLES: usize = 160;

/// CC candidate ring capacity.
pub const CC_CANDIDATES_MAX: usize = 16;

/// IDEN table entries (4-bit iden field).
pub const IDEN_TABLE_LEN: usize = 16;

/// Extension slot table width.
pub const EXT_SLOTS: usize = 32;

/// Per-slot event history ring depth.
pub const EVENT_HISTORY_LEN: usize = 64;

// =======================================================================
// Trunking timing defaults (seconds unless noted)
// =======================================================================

/// Default voice hangtime before a release may return to the control channel.
pub const HANGTIME_DEFAULT_S: f64 = 1.0;

/// Default extra grace after tuning a voice channel before a tick may release.
pub const VC_GRACE_DEFAULT_S: f64 = 1.5;

/// Default hold after a P25p2 MAC_ACTIVE/PTT before idle release.
pub const MAC_HOLD_DEFAULT_S: f64 = 0.5;

/// Default hold while a jitter ring still has queued audio.
pub const RING_HOLD_DEFAULT_S: f64 = 0.2;

/// Default grace after returning to the CC before grants are honored again.
pub const CC_GRACE_DEFAULT_S: f64 = 0.5;

// =======================================================================
// Runtime configuration snapshot
// =======================================================================

/// Tunables read once per trunking tick.
///
/// The struct is immutable once published; [`set_runtime`] installs a new
/// snapshot atomically and in whole.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Seconds of silence before a tuned voice channel may be released.
    pub hangtime_s: f64,
    /// Seconds after tune during which release is deferred unconditionally.
    pub vc_grace_s: f64,
    /// Seconds a P25p2 MAC activity indication holds the channel.
    pub mac_hold_s: f64,
    /// Seconds queued jitter audio holds the channel.
    pub ring_hold_s: f64,
    /// Seconds after return-to-CC before new grants are honored.
    pub cc_grace_s: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            hangtime_s: HANGTIME_DEFAULT_S,
            vc_grace_s: VC_GRACE_DEFAULT_S,
            mac_hold_s: MAC_HOLD_DEFAULT_S,
            ring_hold_s: RING_HOLD_DEFAULT_S,
            cc_grace_s: CC_GRACE_DEFAULT_S,
        }
    }
}

static RUNTIME: OnceLock<ArcSwap<RuntimeConfig>> = OnceLock::new();

fn runtime_cell() -> &'static ArcSwap<RuntimeConfig> {
    RUNTIME.get_or_init(|| ArcSwap::from_pointee(RuntimeConfig::default()))
}

/// Load the current runtime snapshot.
///
/// Cheap enough to call once per tick; the returned Arc stays consistent for
/// as long as the caller holds it.
pub fn runtime() -> Arc<RuntimeConfig> {
    runtime_cell().load_full()
}

/// Install a new runtime snapshot atomically.
pub fn set_runtime(cfg: RuntimeConfig) {
    runtime_cell().store(Arc::new(cfg));
}

// =======================================================================
// Environment switches
// =======================================================================

/// Environment switches observed by the core, captured once at startup.
#[derive(Debug, Clone)]
pub struct EnvSwitches {
    /// `DSD_NEO_SYNC_WARMSTART`: warm-start slicer calibration ("0" disables).
    pub sync_warmstart: bool,
    /// `DSD_NEO_CC_CACHE`: CC candidate persistence ("0"/"n"/"N"/"f"/"F" disable).
    pub cc_cache: bool,
    /// `DSD_NEO_CACHE_DIR`: cache root override.
    pub cache_dir: Option<String>,
    /// `DSD_NEO_PDU_JSON`: P25 PDU JSON diagnostics ("1" enables).
    pub pdu_json: bool,
    /// `DSD_NEO_DMR_T3_STEP_HZ`: LCN-calculator step override in Hz.
    pub dmr_t3_step_hz: Option<u32>,
}

impl EnvSwitches {
    /// Read the switches from the process environment.
    pub fn from_env() -> Self {
        Self {
            sync_warmstart: std::env::var("DSD_NEO_SYNC_WARMSTART")
                .map(|v| v != "0")
                .unwrap_or(true),
            cc_cache: std::env::var("DSD_NEO_CC_CACHE")
                .map(|v| !matches!(v.as_str(), "0" | "n" | "N" | "f" | "F"))
                .unwrap_or(true),
            cache_dir: std::env::var("DSD_NEO_CACHE_DIR").ok(),
            pdu_json: std::env::var("DSD_NEO_PDU_JSON")
                .map(|v| v == "1")
                .unwrap_or(false),
            dmr_t3_step_hz: std::env::var("DSD_NEO_DMR_T3_STEP_HZ")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Fixed switches for tests; everything enabled, no overrides.
    pub fn all_enabled() -> Self {
        Self {
            sync_warmstart: true,
            cc_cache: true,
            cache_dir: None,
            pdu_json: true,
            dmr_t3_step_hz: None,
        }
    }
}

/// Resolve the CC candidate cache root directory.
///
/// Order: `DSD_NEO_CACHE_DIR`, then `$HOME/.cache/dsd-neo`, then the relative
/// fallback `.dsdneo_cache`.
pub fn cache_root(env: &EnvSwitches) -> std::path::PathBuf {
    if let Some(dir) = &env.cache_dir {
        return std::path::PathBuf::from(dir);
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return std::path::PathBuf::from(home).join(".cache").join("dsd-neo");
        }
    }
    std::path::PathBuf::from(".dsdneo_cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_defaults_sane() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.hangtime_s > 0.0);
        assert!(cfg.vc_grace_s >= cfg.hangtime_s);
    }

    #[test]
    fn test_set_runtime_is_whole() {
        set_runtime(RuntimeConfig {
            hangtime_s: 2.5,
            ..RuntimeConfig::default()
        });
        let seen = runtime();
        // the snapshot is replaced as a unit; a reader never sees a mix
        assert!(seen.hangtime_s == 2.5 || seen.hangtime_s == HANGTIME_DEFAULT_S);
        set_runtime(RuntimeConfig::default());
    }

    #[test]
    fn test_cache_root_prefers_override() {
        let env = EnvSwitches {
            cache_dir: Some("/tmp/ccroot".into()),
            ..EnvSwitches::all_enabled()
        };
        assert_eq!(cache_root(&env), std::path::PathBuf::from("/tmp/ccroot"));
    }
}
