// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Symbol timing recovery.
//!
//! Two interpolator back-ends feed a common Gardner timing error detector:
//!
//! - **MMSE polyphase** (8 taps, 128 phases): decimates to symbol rate on
//!   the CQPSK path.
//! - **Cubic Farrow**: 4-point fractional delay for the FM/C4FM path, where
//!   the dibit reader keeps consuming at sample rate and only the fractional
//!   offset is steered.
//!
//! The dual loop updates both the fractional phase µ and the symbol period
//! ω, with ω clamped to `ω_mid * (1 ± ω_rel)`. A lock detector accumulates
//! eye-center versus mid-symbol energy.

use super::Cf32;
use std::sync::OnceLock;

const NSTEPS: usize = 128;
const NTAPS: usize = 8;

/// Windowed-sinc MMSE interpolator bank: `NSTEPS + 1` phases of 8 taps.
fn mmse_bank() -> &'static Vec<[f32; NTAPS]> {
    static BANK: OnceLock<Vec<[f32; NTAPS]>> = OnceLock::new();
    BANK.get_or_init(|| {
        let mut bank = Vec::with_capacity(NSTEPS + 1);
        for phase in 0..=NSTEPS {
            let frac = phase as f64 / NSTEPS as f64;
            let mut taps = [0.0f32; NTAPS];
            let mut sum = 0.0f64;
            for (k, t) in taps.iter_mut().enumerate() {
                // interpolation point sits between taps 3 and 4
                let x = k as f64 - 3.0 - frac;
                let sinc = if x == 0.0 {
                    1.0
                } else {
                    (std::f64::consts::PI * x).sin() / (std::f64::consts::PI * x)
                };
                let w = 0.42
                    - 0.5 * (2.0 * std::f64::consts::PI * (k as f64 + 1.0 - frac)
                        / (NTAPS + 1) as f64)
                        .cos()
                    + 0.08
                        * (4.0 * std::f64::consts::PI * (k as f64 + 1.0 - frac)
                            / (NTAPS + 1) as f64)
                            .cos();
                let v = sinc * w;
                *t = v as f32;
                sum += v;
            }
            // unity DC so interpolation never changes signal level
            for t in taps.iter_mut() {
                *t = (f64::from(*t) / sum) as f32;
            }
            bank.push(taps);
        }
        bank
    })
}

/// Interpolate around `idx` (needs `idx-3..=idx+4` valid) at phase `mu`.
fn mmse_interp(buf: &[Cf32], idx: usize, mu: f32) -> Cf32 {
    let phase = ((mu * NSTEPS as f32).round() as usize).min(NSTEPS);
    let taps = &mmse_bank()[phase];
    let mut acc = Cf32::default();
    for (k, &t) in taps.iter().enumerate() {
        acc = acc.add(buf[idx - 3 + k].scale(t));
    }
    acc
}

/// 4-point cubic (Farrow) fractional-delay interpolation of `buf[idx + mu]`,
/// using points `idx-1..=idx+2`.
pub fn cubic_interp(y0: f32, y1: f32, y2: f32, y3: f32, mu: f32) -> f32 {
    let c0 = y1;
    let c1 = 0.5 * (y2 - y0);
    let c2 = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
    let c3 = 0.5 * (y3 - y0) + 1.5 * (y1 - y2);
    ((c3 * mu + c2) * mu + c1) * mu + c0
}

/// Lock detector: eye-center vs mid-symbol energy ratio.
#[derive(Debug, Default)]
pub struct LockDetector {
    center: f32,
    mid: f32,
    samples: u32,
}

impl LockDetector {
    pub fn update(&mut self, center_energy: f32, mid_energy: f32) {
        // slow exponential window
        self.center = 0.995 * self.center + 0.005 * center_energy;
        self.mid = 0.995 * self.mid + 0.005 * mid_energy;
        self.samples = self.samples.saturating_add(1);
    }

    /// Locked when the eye center carries clearly more energy than the
    /// symbol transitions.
    pub fn locked(&self) -> bool {
        self.samples > 200 && self.center > 2.0 * (self.mid + 1e-9)
    }

    pub fn reset(&mut self) {
        self.center = 0.0;
        self.mid = 0.0;
        self.samples = 0;
    }
}

/// Gardner recovery over complex input, decimating to symbol rate (CQPSK).
pub struct GardnerCqpsk {
    buf: Vec<Cf32>,
    /// fractional interpolation phase in [0, 1)
    mu: f32,
    /// samples per symbol estimate
    omega: f32,
    omega_mid: f32,
    omega_rel: f32,
    gain_mu: f32,
    gain_omega: f32,
    /// read position of the next symbol center
    pos: f32,
    prev_sym: Cf32,
    pub lock: LockDetector,
}

impl GardnerCqpsk {
    pub fn new(omega: f32, omega_rel: f32, gain_mu: f32, gain_omega: f32) -> Self {
        Self {
            buf: Vec::new(),
            mu: 0.0,
            omega,
            omega_mid: omega,
            omega_rel,
            gain_mu,
            gain_omega,
            // first read position clears both the interpolator wing and
            // the half-symbol look-back
            pos: omega + 4.0,
            prev_sym: Cf32::default(),
            lock: LockDetector::default(),
        }
    }

    pub fn omega(&self) -> f32 {
        self.omega
    }

    /// Consume input samples, appending symbol-rate outputs to `out`.
    pub fn process(&mut self, input: &[Cf32], out: &mut Vec<Cf32>) {
        self.buf.extend_from_slice(input);
        loop {
            let idx = self.pos.floor() as usize;
            // need idx-3 .. idx+4 and the mid-point a half symbol back
            let half = self.omega / 2.0;
            let mid_pos = self.pos - half;
            let mid_idx = mid_pos.floor() as usize;
            if idx < 4 || mid_idx < 4 || idx + 5 >= self.buf.len() {
                break;
            }
            let sym = mmse_interp(&self.buf, idx, self.pos - idx as f32);
            let mid = mmse_interp(&self.buf, mid_idx, mid_pos - mid_idx as f32);

            // Gardner: err = Re{ mid* x (sym - prev_sym) }; a positive
            // error means the sampling point sits late
            let err = mid.conj().mul(sym.sub(self.prev_sym)).re;
            let err = err.clamp(-1.0, 1.0);

            self.omega -= self.gain_omega * err;
            let lo = self.omega_mid * (1.0 - self.omega_rel);
            let hi = self.omega_mid * (1.0 + self.omega_rel);
            self.omega = self.omega.clamp(lo, hi);
            self.mu = -self.gain_mu * err;

            self.lock.update(sym.norm_sq(), mid.norm_sq());

            self.prev_sym = sym;
            out.push(sym);

            self.pos += self.omega + self.mu;
            self.mu = 0.0;
        }
        // drop consumed history, keep an interpolator wing
        let keep_from = (self.pos.floor() as usize).saturating_sub(8);
        if keep_from > 0 {
            self.buf.drain(..keep_from);
            self.pos -= keep_from as f32;
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.mu = 0.0;
        self.omega = self.omega_mid;
        self.pos = self.omega_mid + 4.0;
        self.prev_sym = Cf32::default();
        self.lock.reset();
    }
}

/// Gardner recovery over real samples with cubic Farrow interpolation.
///
/// Non-decimating: every input sample is re-emitted at the corrected
/// fractional delay, and symbol centers are flagged so the dibit reader can
/// keep its own samples-per-symbol cadence.
pub struct GardnerFm {
    buf: Vec<f32>,
    mu: f32,
    omega: f32,
    omega_mid: f32,
    omega_rel: f32,
    gain_mu: f32,
    gain_omega: f32,
    pos: f32,
    prev_sym: f32,
    pub lock: LockDetector,
}

impl GardnerFm {
    pub fn new(omega: f32, omega_rel: f32, gain_mu: f32, gain_omega: f32) -> Self {
        Self {
            buf: Vec::new(),
            mu: 0.0,
            omega,
            omega_mid: omega,
            omega_rel,
            gain_mu,
            gain_omega,
            // first read position clears both the interpolator wing and
            // the half-symbol look-back
            pos: omega + 2.0,
            prev_sym: 0.0,
            lock: LockDetector::default(),
        }
    }

    pub fn omega(&self) -> f32 {
        self.omega
    }

    /// Consume input, emitting one interpolated value per symbol.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        self.buf.extend_from_slice(input);
        loop {
            let idx = self.pos.floor() as usize;
            let half = self.omega / 2.0;
            let mid_pos = self.pos - half;
            let mid_idx = mid_pos.floor() as usize;
            if idx < 2 || mid_idx < 2 || idx + 3 >= self.buf.len() {
                break;
            }
            let at = |p: f32, i: usize| {
                cubic_interp(
                    self.buf[i - 1],
                    self.buf[i],
                    self.buf[i + 1],
                    self.buf[i + 2],
                    p - i as f32,
                )
            };
            let sym = at(self.pos, idx);
            let mid = at(mid_pos, mid_idx);

            // positive error means the sampling point sits late
            let err = (mid * (sym - self.prev_sym)).clamp(-1.0, 1.0);
            self.omega -= self.gain_omega * err;
            let lo = self.omega_mid * (1.0 - self.omega_rel);
            let hi = self.omega_mid * (1.0 + self.omega_rel);
            self.omega = self.omega.clamp(lo, hi);
            self.mu = -self.gain_mu * err;

            self.lock.update(sym * sym, mid * mid);
            self.prev_sym = sym;
            out.push(sym);

            self.pos += self.omega + self.mu;
            self.mu = 0.0;
        }
        let keep_from = (self.pos.floor() as usize).saturating_sub(4);
        if keep_from > 0 {
            self.buf.drain(..keep_from);
            self.pos -= keep_from as f32;
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.mu = 0.0;
        self.omega = self.omega_mid;
        self.pos = self.omega_mid + 2.0;
        self.prev_sym = 0.0;
        self.lock.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubic_interp_exact_on_cubic() {
        // cubic interpolation reproduces any cubic polynomial exactly
        let f = |x: f32| 0.5 * x * x * x - x * x + 2.0 * x - 3.0;
        for mu in [0.0f32, 0.25, 0.5, 0.9] {
            let got = cubic_interp(f(-1.0), f(0.0), f(1.0), f(2.0), mu);
            assert!((got - f(mu)).abs() < 1e-4, "mu={} got {}", mu, got);
        }
    }

    #[test]
    fn test_mmse_bank_unity_dc() {
        for taps in mmse_bank().iter() {
            let sum: f32 = taps.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_omega_clamped() {
        let mut ted = GardnerFm::new(10.0, 0.005, 0.1, 0.5);
        // feed an alternating pattern that drives large errors
        let input: Vec<f32> = (0..2000).map(|i| if (i / 3) % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let mut out = Vec::new();
        ted.process(&input, &mut out);
        assert!(ted.omega() >= 10.0 * 0.995 && ted.omega() <= 10.0 * 1.005);
    }

    fn raised_cosine(t: f64, beta: f64) -> f64 {
        if t == 0.0 {
            return 1.0;
        }
        let denom = 1.0 - (2.0 * beta * t) * (2.0 * beta * t);
        if denom.abs() < 1e-9 {
            return (std::f64::consts::PI / (2.0 * beta)).sin()
                * std::f64::consts::FRAC_PI_4
                / (std::f64::consts::PI / (2.0 * beta));
        }
        let sinc = (std::f64::consts::PI * t).sin() / (std::f64::consts::PI * t);
        sinc * (std::f64::consts::PI * beta * t).cos() / denom
    }

    #[test]
    fn test_fm_recovers_offset_bpsk() {
        // ±1 symbols, raised-cosine pulses, sps = 10, timing offset 0.37 T
        let sps = 10.0f64;
        let offset = 3.7f64;
        let mut rng = fastrand::Rng::with_seed(11);
        let syms: Vec<f64> = (0..300).map(|_| if rng.bool() { 1.0 } else { -1.0 }).collect();
        let nsamp = (syms.len() as f64 * sps) as usize;
        let mut wave = vec![0.0f32; nsamp];
        for (n, w) in wave.iter_mut().enumerate() {
            let mut acc = 0.0f64;
            for (k, &a) in syms.iter().enumerate() {
                let t = (n as f64 - offset - k as f64 * sps) / sps;
                if t.abs() < 8.0 {
                    acc += a * raised_cosine(t, 0.35);
                }
            }
            *w = acc as f32;
        }
        let mut ted = GardnerFm::new(10.0, 0.02, 0.05, 0.002);
        let mut out = Vec::new();
        ted.process(&wave, &mut out);
        assert!(out.len() > 250, "got {} symbols", out.len());
        // after settling, recovered samples must sit near ±1
        let tail = &out[out.len() - 100..];
        let mut weak = 0;
        for &v in tail {
            if v.abs() < 0.7 {
                weak += 1;
            }
        }
        assert!(weak <= 3, "{} weak symbols of 100", weak);
    }
}
