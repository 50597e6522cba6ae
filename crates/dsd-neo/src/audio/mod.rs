// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Audio pipeline: per-slot jitter rings, gating, gain and output.
//!
//! Decoded voice frames land in a small per-slot FIFO that bounds worst-case
//! latency; the audio thread pops frames, applies the group gate and gain
//! stages, mixes slots into the output layout and hands PCM to the backend
//! and the per-call WAV writer.

pub mod agc;
pub mod gate;
pub mod jitter;
pub mod mixer;
pub mod wav;

pub use agc::{Agc, manual_gain, InputKind};
pub use gate::{gate_decision, GateVerdict};
pub use jitter::JitterRing;
pub use mixer::{mix_mono, mix_stereo};
pub use wav::CallWavWriter;
