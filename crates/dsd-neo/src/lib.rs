// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DSD-NEO - Software-Defined-Radio Digital Voice Decoder
//!
//! A pure Rust decoder core for land-mobile-radio digital voice: it ingests
//! a baseband I/Q sample stream, recovers symbols, identifies the protocol
//! on air, decodes frames, and emits PCM audio plus structured call events.
//! DMR (incl. Tier III trunking), P25 Phase 1/2, NXDN, dPMR, D-STAR, YSF,
//! ProVoice/EDACS and M17 air interfaces are supported, along with several
//! vendor privacy schemes and pluggable per-call export.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Capture thread                              |
//! |        tuner / socket / capture file  ->  SPSC input ring          |
//! +--------------------------------------------------------------------+
//! |                         Demod thread                               |
//! |  dsp (widen, decimate, shape, carrier, timing)  ->  sync (slicer,  |
//! |  sync scan)  ->  proto (frame handlers, fec, crypto)  ->  trunk    |
//! +--------------------------------------------------------------------+
//! |                 Audio thread          |         UI thread          |
//! |  jitter rings -> gate -> AGC -> sink  |  snapshot reads, commands  |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Threading model
//!
//! The demod thread owns [`state::DecoderState`] and is the only writer of
//! per-slot protocol state. The UI thread sees published snapshots only;
//! commands flow back through a bounded queue drained once per symbol batch.
//! A single process-wide exit flag cooperatively shuts everything down.
//!
//! ## Modules Overview
//!
//! - [`fec`] - Block/convolutional codecs (Hamming, Golay, BPTC, RS, trellis)
//! - [`crypto`] - Cipher mode wrappers, vendor keystreams, scrambler LFSRs
//! - [`dsp`] - Baseband front-end chain
//! - [`sync`] - Symbol slicing and sync pattern detection
//! - [`proto`] - Per-protocol frame state machines
//! - [`trunk`] - DMR Tier III / P25 trunking state machines
//! - [`audio`] - Jitter rings, gating, AGC, WAV output
//! - [`telemetry`] - Event records, history snapshots, LRRP
//! - [`io`] - Input ring, command queue, baseband sources, hook traits
//! - [`runtime`] - Thread spawning and the demod main loop

/// Per-slot jitter rings, talkgroup gating, AGC, mixers and WAV output.
pub mod audio;
/// Global configuration: compile-time constants, env switches, runtime snapshot.
pub mod config;
/// Keystream generation: cipher modes, vendor generators, scrambler LFSRs.
pub mod crypto;
/// Baseband DSP front-end (widen, decimate, shape, carrier, equalize, time).
pub mod dsp;
/// Forward error correction codecs shared by all protocols.
pub mod fec;
/// Input ring, command queue, baseband sources and capability hooks.
pub mod io;
/// Compile-time configurable logging macros and outputs.
pub mod logging;
/// Protocol frame handlers and the central dispatcher.
pub mod proto;
/// Demod thread main loop and thread lifecycle.
pub mod runtime;
/// Decoder state records and options.
pub mod state;
/// Dibit slicer, threshold adaptation, sync scanner, warm-start.
pub mod sync;
/// Event records, history rings, snapshot publishing, LRRP, watchdogs.
pub mod telemetry;
/// Trunking state machines and channel identity tables.
pub mod trunk;

use std::sync::atomic::{AtomicBool, Ordering};

/// Top-level error type.
///
/// Initialization failures are fatal; steady-state failures degrade
/// gracefully (cache disabled, drops counted). The hot DSP/frame paths never
/// construct this type - they return small status enums and keep going.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration errors
    // ========================================================================
    /// An option value could not be parsed (option name, offending value).
    InvalidOption(String, String),
    /// A baseband source spec was malformed.
    InvalidSource(String),

    // ========================================================================
    // I/O errors
    // ========================================================================
    /// I/O error with underlying cause.
    Io(std::io::Error),
    /// Socket open/connect failed.
    SocketFailed(String),
    /// CC candidate cache file could not be opened or written.
    CacheFailed(String),

    // ========================================================================
    // Resource errors
    // ========================================================================
    /// Ring or history allocation failed at startup.
    RingInit(String),
    /// Extension slot table is full or the slot is already taken.
    ExtSlot(&'static str),

    // ========================================================================
    // Protocol errors
    // ========================================================================
    /// A frame field was structurally invalid beyond FEC recovery.
    Malformed(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidOption(name, value) => {
                write!(f, "Invalid value for {}: {}", name, value)
            }
            Error::InvalidSource(spec) => write!(f, "Invalid baseband source: {}", spec),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::SocketFailed(msg) => write!(f, "Socket failed: {}", msg),
            Error::CacheFailed(msg) => write!(f, "CC cache failed: {}", msg),
            Error::RingInit(msg) => write!(f, "Ring init failed: {}", msg),
            Error::ExtSlot(msg) => write!(f, "Extension slot: {}", msg),
            Error::Malformed(what) => write!(f, "Malformed frame field: {}", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenient alias for API results using the public [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

/// Process-wide cooperative exit flag.
///
/// Blocking waits wake on their timeout and re-check this flag. Nothing in
/// the core calls process-exit; only the top-level entry point honors it.
static EXIT: AtomicBool = AtomicBool::new(false);

/// Request cooperative shutdown of all decoder threads.
pub fn request_exit() {
    EXIT.store(true, Ordering::Release);
}

/// True once shutdown has been requested.
#[inline]
pub fn exit_requested() -> bool {
    EXIT.load(Ordering::Acquire)
}

/// Re-arm the exit flag. Test support; production starts cleared.
#[doc(hidden)]
pub fn reset_exit_for_tests() {
    EXIT.store(false, Ordering::Release);
}
