// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Capability hooks.
//!
//! The core never talks to a tuner, vocoder or UI directly; it calls these
//! traits. Backends install real implementations at startup, tests install
//! capturing fakes. All hook calls are serialized on the demod thread.

use crate::sync::Modulation;
use crate::telemetry::StateSnapshot;

/// Tuner control consumed by the trunking state machines.
pub trait TunerHook: Send {
    /// Tune to a voice channel frequency.
    fn tune_to_freq(&mut self, hz: u64, ted_sps: u32);
    /// Tune to a control channel frequency.
    fn tune_to_cc(&mut self, hz: u64, ted_sps: u32);
    /// Return to the last control channel.
    fn return_to_cc(&mut self);
    /// Override the demod modulation (P25 CC recovery only).
    fn set_modulation(&mut self, modulation: Modulation);
    /// Override the symbol rate (P25 CC recovery only).
    fn set_symbol_rate(&mut self, rate: u32);
}

/// No-op tuner for conventional (non-trunked) operation.
#[derive(Debug, Default)]
pub struct NullTuner;

impl TunerHook for NullTuner {
    fn tune_to_freq(&mut self, _hz: u64, _ted_sps: u32) {}
    fn tune_to_cc(&mut self, _hz: u64, _ted_sps: u32) {}
    fn return_to_cc(&mut self) {}
    fn set_modulation(&mut self, _modulation: Modulation) {}
    fn set_symbol_rate(&mut self, _rate: u32) {}
}

/// Signal-quality readouts published to the IO backend.
pub trait MetricsHook: Send {
    fn snr_db(&mut self, snr: f64);
    fn ber(&mut self, ber: f64);
    fn ppm_adjust(&mut self, ppm: f64);
}

/// Black-box MBE frame decoder.
///
/// The core hands the three possible frame layouts; the vocoder consumes
/// whichever matches the current protocol and returns 160 samples of 8 kHz
/// audio, or `None` on an unrecoverable frame.
pub trait Vocoder: Send {
    fn process_mbe_frame(
        &mut self,
        imbe_fr: Option<&[u8; 88]>,
        ambe_fr: Option<&[u8; 49]>,
        imbe7100_fr: Option<&[u8; 72]>,
    ) -> Option<[f32; 160]>;
}

/// Telemetry publication toward the UI thread.
pub trait TelemetrySink: Send {
    fn publish_snapshot(&self, snapshot: StateSnapshot);
    fn request_redraw(&self);
}

#[cfg(test)]
pub mod test_support {
    //! Capturing fakes shared by the trunking tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every tuner call for assertion.
    #[derive(Debug, Default, Clone)]
    pub struct CapturedTuner {
        pub calls: Arc<Mutex<Vec<TunerCall>>>,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TunerCall {
        Freq(u64, u32),
        Cc(u64, u32),
        Return,
        Modulation,
        SymbolRate(u32),
    }

    impl CapturedTuner {
        pub fn calls(&self) -> Vec<TunerCall> {
            self.calls.lock().expect("capture lock").clone()
        }

        pub fn count_freq_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, TunerCall::Freq(..)))
                .count()
        }

        pub fn count_returns(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, TunerCall::Return))
                .count()
        }
    }

    impl TunerHook for CapturedTuner {
        fn tune_to_freq(&mut self, hz: u64, ted_sps: u32) {
            self.calls.lock().expect("capture lock").push(TunerCall::Freq(hz, ted_sps));
        }
        fn tune_to_cc(&mut self, hz: u64, ted_sps: u32) {
            self.calls.lock().expect("capture lock").push(TunerCall::Cc(hz, ted_sps));
        }
        fn return_to_cc(&mut self) {
            self.calls.lock().expect("capture lock").push(TunerCall::Return);
        }
        fn set_modulation(&mut self, _modulation: Modulation) {
            self.calls.lock().expect("capture lock").push(TunerCall::Modulation);
        }
        fn set_symbol_rate(&mut self, rate: u32) {
            self.calls
                .lock()
                .expect("capture lock")
                .push(TunerCall::SymbolRate(rate));
        }
    }
}
