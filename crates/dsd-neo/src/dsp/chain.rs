// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The assembled DSP front-end chain.
//!
//! Raw tuner bytes in, symbol-rate values out:
//!
//! - **FM/C4FM**: widen -> half-band decimate -> FM discriminator
//!   (piecewise-linear atan2) -> channel low-pass -> Gardner (Farrow).
//! - **CQPSK**: widen (+rotation) -> half-band -> Costas -> equalizer ->
//!   Gardner (MMSE, decimating) -> phase-to-level mapping.
//!
//! The output feeds the dibit slicer directly; a captured dibit file
//! bypasses this entire module.

use super::costas::{fast_atan2_q14, CarrierMode, CostasLoop, PI_Q14};
use super::equalizer::{CqpskEqualizer, EqConfig};
use super::firdes::{low_pass, Fir, Window};
use super::halfband::{HalfBand, HalfBandOrder};
use super::timing::{GardnerCqpsk, GardnerFm};
use super::widen::{widen_rotate_scalar, Bias};
use super::Cf32;

/// Demodulation mode for the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainMode {
    C4fm,
    Cqpsk,
}

/// The front-end chain state.
pub struct DspChain {
    mode: ChainMode,
    rotate90: bool,
    hb_i: HalfBand,
    hb_q: HalfBand,
    channel: Fir,
    costas: CostasLoop,
    eq: CqpskEqualizer,
    ted_fm: GardnerFm,
    ted_cqpsk: GardnerCqpsk,
    prev: Cf32,
}

impl DspChain {
    /// `input_rate` is the IQ sample rate in Hz; the chain decimates by two
    /// and recovers `symbol_rate` symbols per second.
    pub fn new(mode: ChainMode, input_rate: u32, symbol_rate: u32, rotate90: bool) -> Self {
        let post_decim = input_rate as f32 / 2.0;
        let sps = post_decim / symbol_rate as f32;
        Self {
            mode,
            rotate90,
            hb_i: HalfBand::new(HalfBandOrder::Taps23),
            hb_q: HalfBand::new(HalfBandOrder::Taps23),
            channel: Fir::new(low_pass(
                1.0,
                f64::from(post_decim),
                f64::from(symbol_rate) * 0.75,
                f64::from(symbol_rate) * 0.5,
                Window::Hamming,
            )),
            costas: CostasLoop::new(0.02, 2000),
            eq: CqpskEqualizer::new(EqConfig::default()),
            ted_fm: GardnerFm::new(sps, 0.02, 0.05, 0.002),
            ted_cqpsk: GardnerCqpsk::new(sps, 0.02, 0.05, 0.002),
            prev: Cf32::default(),
        }
    }

    /// Run one chunk of raw IQ bytes; appends symbol values to `out`.
    pub fn process_iq(&mut self, bytes: &[u8], out: &mut Vec<f32>) {
        let n = bytes.len() & !1;
        if n == 0 {
            return;
        }
        let mut wide = vec![0i16; n];
        if self.rotate90 {
            widen_rotate_scalar(&bytes[..n], &mut wide, Bias::Centered127);
        } else {
            super::widen::widen(&bytes[..n], &mut wide, Bias::Centered127);
        }
        let scale = 1.0 / 8192.0;
        let i_in: Vec<f32> = wide.iter().step_by(2).map(|&v| f32::from(v) * scale).collect();
        let q_in: Vec<f32> = wide
            .iter()
            .skip(1)
            .step_by(2)
            .map(|&v| f32::from(v) * scale)
            .collect();

        let mut i_dec = Vec::new();
        let mut q_dec = Vec::new();
        self.hb_i.process(&i_in, &mut i_dec);
        self.hb_q.process(&q_in, &mut q_dec);

        match self.mode {
            ChainMode::C4fm => self.c4fm_path(&i_dec, &q_dec, out),
            ChainMode::Cqpsk => self.cqpsk_path(&i_dec, &q_dec, out),
        }
    }

    /// FM discriminator then matched low-pass then timing.
    fn c4fm_path(&mut self, i: &[f32], q: &[f32], out: &mut Vec<f32>) {
        let mut disc = Vec::with_capacity(i.len());
        for (&re, &im) in i.iter().zip(q.iter()) {
            let cur = Cf32::new(re, im);
            let d = cur.mul(self.prev.conj());
            let angle = fast_atan2_q14((d.im * 16384.0) as i32, (d.re * 16384.0) as i32);
            // scale so a +/-3 deviation lands near +/-3.0
            disc.push(angle as f32 / PI_Q14 as f32 * 12.0);
            self.prev = cur;
        }
        let mut shaped = Vec::new();
        self.channel.process(&disc, &mut shaped);
        self.ted_fm.process(&shaped, out);
    }

    /// Carrier recovery, equalization, symbol timing, phase slicing.
    fn cqpsk_path(&mut self, i: &[f32], q: &[f32], out: &mut Vec<f32>) {
        let mut derot = Vec::with_capacity(i.len());
        for (&re, &im) in i.iter().zip(q.iter()) {
            derot.push(self.costas.process(Cf32::new(re, im)));
        }
        if self.costas.mode() == CarrierMode::Fll && self.costas.freq_q14().abs() < 50 {
            self.costas.set_mode(CarrierMode::Costas);
        }
        let mut symbols = Vec::new();
        self.ted_cqpsk.process(&derot, &mut symbols);
        for s in symbols {
            let y = self.eq.process(s);
            // QPSK phase to 4-level value: the dibit reader slices the
            // same +/-1/+/-3 lattice the FM path produces
            let angle = y.im.atan2(y.re);
            let level = if angle >= 0.0 {
                if angle < std::f32::consts::FRAC_PI_2 {
                    1.0
                } else {
                    3.0
                }
            } else if angle > -std::f32::consts::FRAC_PI_2 {
                -1.0
            } else {
                -3.0
            };
            out.push(level);
        }
    }

    /// Reset all stage state (retune).
    pub fn reset(&mut self) {
        self.hb_i.reset();
        self.hb_q.reset();
        self.channel.reset();
        self.costas.reset();
        self.eq.reset();
        self.ted_fm.reset();
        self.ted_cqpsk.reset();
        self.prev = Cf32::default();
    }
}
