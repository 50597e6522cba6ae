// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Window-method FIR design.
//!
//! Mirrors the classic `firdes::low_pass` recipe: the tap count comes from
//! the window's stop-band attenuation and the normalized transition width,
//! forced odd for a symmetric linear-phase filter, and the taps are an ideal
//! sinc shaped by the window and normalized to unit DC gain. Root-raised-
//! cosine taps for the CQPSK matched filter live here too.

use std::f64::consts::PI;

/// Window functions with their stop-band attenuations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// 44 dB attenuation.
    Hann,
    /// 53 dB attenuation.
    Hamming,
    /// 74 dB attenuation.
    Blackman,
    /// 92 dB attenuation.
    BlackmanHarris,
}

impl Window {
    fn attenuation_db(self) -> f64 {
        match self {
            Window::Hann => 44.0,
            Window::Hamming => 53.0,
            Window::Blackman => 74.0,
            Window::BlackmanHarris => 92.0,
        }
    }

    fn value(self, i: usize, n: usize) -> f64 {
        let x = 2.0 * PI * i as f64 / (n - 1) as f64;
        match self {
            Window::Hann => 0.5 - 0.5 * x.cos(),
            Window::Hamming => 0.54 - 0.46 * x.cos(),
            Window::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
            Window::BlackmanHarris => {
                0.35875 - 0.48829 * x.cos() + 0.14128 * (2.0 * x).cos()
                    - 0.01168 * (3.0 * x).cos()
            }
        }
    }
}

/// Number of taps for the requested transition width, forced odd.
fn compute_ntaps(sampling_freq: f64, transition_width: f64, window: Window) -> usize {
    let att = window.attenuation_db();
    let mut ntaps = (att * sampling_freq / (22.0 * transition_width)) as usize;
    if ntaps % 2 == 0 {
        ntaps += 1;
    }
    ntaps.max(3)
}

/// Low-pass FIR taps (window method).
///
/// `gain` is the desired DC gain; `cutoff` and `transition_width` are in Hz
/// relative to `sampling_freq`.
pub fn low_pass(
    gain: f64,
    sampling_freq: f64,
    cutoff: f64,
    transition_width: f64,
    window: Window,
) -> Vec<f32> {
    let ntaps = compute_ntaps(sampling_freq, transition_width, window);
    let m = (ntaps - 1) / 2;
    let fw = 2.0 * PI * cutoff / sampling_freq;
    let mut taps = vec![0.0f64; ntaps];
    for (i, t) in taps.iter_mut().enumerate() {
        let n = i as f64 - m as f64;
        let ideal = if n == 0.0 { fw / PI } else { (n * fw).sin() / (n * PI) };
        *t = ideal * window.value(i, ntaps);
    }
    let sum: f64 = taps.iter().sum();
    let scale = gain / sum;
    taps.iter().map(|&t| (t * scale) as f32).collect()
}

/// Root-raised-cosine taps.
///
/// `sps` samples per symbol, roll-off `alpha` in (0, 1], `span` symbols per
/// side. Normalized to unit energy.
pub fn root_raised_cosine(sps: f64, alpha: f64, span: usize) -> Vec<f32> {
    let half = (span as f64 * sps) as i64;
    let mut taps = Vec::with_capacity((2 * half + 1) as usize);
    for k in -half..=half {
        let t = k as f64 / sps;
        let v = if k == 0 {
            1.0 - alpha + 4.0 * alpha / PI
        } else if (4.0 * alpha * t).abs() == 1.0 {
            // singular point of the closed form
            (alpha / 2.0_f64.sqrt())
                * ((1.0 + 2.0 / PI) * (PI / (4.0 * alpha)).sin()
                    + (1.0 - 2.0 / PI) * (PI / (4.0 * alpha)).cos())
        } else {
            let num = (PI * t * (1.0 - alpha)).sin()
                + 4.0 * alpha * t * (PI * t * (1.0 + alpha)).cos();
            let den = PI * t * (1.0 - (4.0 * alpha * t).powi(2));
            num / den
        };
        taps.push(v);
    }
    let energy: f64 = taps.iter().map(|t| t * t).sum();
    let scale = 1.0 / energy.sqrt();
    taps.iter().map(|&t| (t * scale) as f32).collect()
}

/// Convolve-and-hold FIR for the channel shaping stage.
pub struct Fir {
    taps: Vec<f32>,
    history: Vec<f32>,
}

impl Fir {
    pub fn new(taps: Vec<f32>) -> Self {
        let n = taps.len();
        Self {
            taps,
            history: vec![0.0; n.saturating_sub(1)],
        }
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    /// Filter `input`, one output per input sample, appending to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let n = self.taps.len();
        let mut buf = Vec::with_capacity(self.history.len() + input.len());
        buf.extend_from_slice(&self.history);
        buf.extend_from_slice(input);
        for i in 0..input.len() {
            let mut acc = 0.0f32;
            for (j, &t) in self.taps.iter().enumerate() {
                acc += t * buf[i + j];
            }
            out.push(acc);
        }
        let keep = buf.len().saturating_sub(n - 1);
        self.history = buf.split_off(keep);
    }

    pub fn reset(&mut self) {
        for h in self.history.iter_mut() {
            *h = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_pass_unit_dc_gain() {
        let taps = low_pass(1.0, 48000.0, 6000.0, 2000.0, Window::Hamming);
        assert_eq!(taps.len() % 2, 1, "odd symmetric filter");
        let sum: f32 = taps.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_low_pass_attenuation_scales_length() {
        let hamming = low_pass(1.0, 48000.0, 6000.0, 2000.0, Window::Hamming);
        let bh = low_pass(1.0, 48000.0, 6000.0, 2000.0, Window::BlackmanHarris);
        assert!(bh.len() > hamming.len(), "92 dB window needs more taps");
    }

    #[test]
    fn test_low_pass_symmetry() {
        let taps = low_pass(2.0, 48000.0, 4000.0, 1500.0, Window::Blackman);
        let n = taps.len();
        for i in 0..n / 2 {
            assert!((taps[i] - taps[n - 1 - i]).abs() < 1e-7);
        }
    }

    #[test]
    fn test_rrc_symmetry_and_energy() {
        let taps = root_raised_cosine(5.0, 0.2, 6);
        let n = taps.len();
        for i in 0..n / 2 {
            assert!((taps[i] - taps[n - 1 - i]).abs() < 1e-6);
        }
        let energy: f32 = taps.iter().map(|t| t * t).sum();
        assert!((energy - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_fir_chunking_stable() {
        let taps = low_pass(1.0, 8000.0, 2000.0, 1000.0, Window::Hann);
        let mut rng = fastrand::Rng::with_seed(8);
        let input: Vec<f32> = (0..600).map(|_| rng.f32() - 0.5).collect();

        let mut whole = Fir::new(taps.clone());
        let mut a = Vec::new();
        whole.process(&input, &mut a);

        let mut chunked = Fir::new(taps);
        let mut b = Vec::new();
        for c in input.chunks(41) {
            chunked.process(c, &mut b);
        }
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
