// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fractionally-spaced CQPSK equalizer.
//!
//! A complex FIR (odd tap count, at most 11) with Q14 coefficients, run in
//! two modes: blind CMA warm-up until enough symbols have passed, then
//! decision-directed NLMS. Options on top of the linear section:
//!
//! - **Widely-linear branch**: a conjugate FIR added when the input is
//!   measurably improper (non-circular). Gated by the impropriety ratio
//!   with hysteresis and a minimum hold so the branch never flaps.
//! - **DFE**: up to four feedback taps over past decisions.
//! - **Tap leakage**: a small decay applied on every update keeps the
//!   filter from wandering during deep fades.
//!
//! Coefficients are kept quantized in Q14 after every adaptation step, so
//! the equalizer state matches what a fixed-point port would hold.

use super::Cf32;

const Q14: f32 = 16384.0;
/// Tap magnitude clamp in Q14 (4.0).
const TAP_CLAMP: i32 = 4 << 14;
const FRAC: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Complex Q14 coefficient.
#[derive(Debug, Clone, Copy, Default)]
struct Cq14 {
    re: i32,
    im: i32,
}

impl Cq14 {
    #[inline]
    fn to_f(self) -> Cf32 {
        Cf32::new(self.re as f32 / Q14, self.im as f32 / Q14)
    }

    #[inline]
    fn from_f(v: Cf32) -> Self {
        Self {
            re: ((v.re * Q14) as i32).clamp(-TAP_CLAMP, TAP_CLAMP),
            im: ((v.im * Q14) as i32).clamp(-TAP_CLAMP, TAP_CLAMP),
        }
    }
}

/// Equalizer configuration.
#[derive(Debug, Clone)]
pub struct EqConfig {
    /// Forward taps; forced odd, capped at 11.
    pub num_taps: usize,
    /// Decision feedback taps, capped at 4. Zero disables the DFE.
    pub num_dfe: usize,
    /// CMA warm-up step size.
    pub mu_cma: f32,
    /// NLMS step size.
    pub mu_dd: f32,
    /// Per-update tap decay.
    pub leakage: f32,
    /// Symbols of CMA before switching to decision-directed.
    pub warmup_symbols: u32,
    /// Enable the widely-linear conjugate branch machinery.
    pub wl_enable: bool,
    /// Impropriety ratio above which the WL branch is engaged.
    pub improp_threshold: f32,
    /// Consecutive windows on the other side of the threshold before a
    /// switch (hysteresis).
    pub switch_hysteresis: u32,
    /// Minimum symbols a branch selection is held.
    pub min_hold: u32,
    /// Symbols per impropriety evaluation window.
    pub improp_window: u32,
}

impl Default for EqConfig {
    fn default() -> Self {
        Self {
            num_taps: 9,
            num_dfe: 2,
            mu_cma: 0.005,
            mu_dd: 0.05,
            leakage: 1e-4,
            warmup_symbols: 200,
            wl_enable: true,
            improp_threshold: 0.4,
            switch_hysteresis: 3,
            min_hold: 400,
            improp_window: 128,
        }
    }
}

/// Adaptation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqMode {
    CmaWarmup,
    DecisionDirected,
}

/// CQPSK NLMS/DFE equalizer.
pub struct CqpskEqualizer {
    cfg: EqConfig,
    taps: Vec<Cq14>,
    wl_taps: Vec<Cq14>,
    dfe_taps: Vec<Cq14>,
    line: Vec<Cf32>,
    decisions: Vec<Cf32>,
    mode: EqMode,
    symbols: u32,
    // impropriety gate
    pseudo_acc: Cf32,
    power_acc: f32,
    window_n: u32,
    wl_active: bool,
    flip_votes: u32,
    hold: u32,
}

impl CqpskEqualizer {
    pub fn new(mut cfg: EqConfig) -> Self {
        cfg.num_taps = cfg.num_taps.clamp(1, 11) | 1;
        cfg.num_dfe = cfg.num_dfe.min(4);
        let mut taps = vec![Cq14::default(); cfg.num_taps];
        taps[cfg.num_taps / 2] = Cq14 {
            re: Q14 as i32,
            im: 0,
        };
        Self {
            line: vec![Cf32::default(); cfg.num_taps],
            decisions: vec![Cf32::default(); cfg.num_dfe.max(1)],
            wl_taps: vec![Cq14::default(); cfg.num_taps],
            dfe_taps: vec![Cq14::default(); cfg.num_dfe.max(1)],
            taps,
            cfg,
            mode: EqMode::CmaWarmup,
            symbols: 0,
            pseudo_acc: Cf32::default(),
            power_acc: 0.0,
            window_n: 0,
            wl_active: false,
            flip_votes: 0,
            hold: 0,
        }
    }

    pub fn mode(&self) -> EqMode {
        self.mode
    }

    pub fn wl_active(&self) -> bool {
        self.wl_active
    }

    /// Nearest QPSK constellation point (unit circle diagonals).
    #[inline]
    fn slice(y: Cf32) -> Cf32 {
        Cf32::new(FRAC * y.re.signum(), FRAC * y.im.signum())
    }

    /// Equalize one fractionally-spaced input sample into a symbol estimate.
    pub fn process(&mut self, x: Cf32) -> Cf32 {
        self.line.rotate_right(1);
        self.line[0] = x;

        let mut y = Cf32::default();
        for (t, &v) in self.taps.iter().zip(self.line.iter()) {
            y = y.add(t.to_f().mul(v));
        }
        if self.wl_active {
            for (t, &v) in self.wl_taps.iter().zip(self.line.iter()) {
                y = y.add(t.to_f().mul(v.conj()));
            }
        }
        if self.cfg.num_dfe > 0 {
            for (t, &d) in self.dfe_taps.iter().zip(self.decisions.iter()) {
                y = y.sub(t.to_f().mul(d));
            }
        }

        let dec = Self::slice(y);
        let err = match self.mode {
            // Godard CMA: error pushes |y|^2 toward the unit modulus
            EqMode::CmaWarmup => y.scale(1.0 - y.norm_sq()),
            EqMode::DecisionDirected => dec.sub(y),
        };

        let mu = match self.mode {
            EqMode::CmaWarmup => self.cfg.mu_cma,
            EqMode::DecisionDirected => self.cfg.mu_dd,
        };
        let norm: f32 = self.line.iter().map(|v| v.norm_sq()).sum::<f32>() + 1e-6;
        let step = mu / norm;
        let keep = 1.0 - self.cfg.leakage;

        for (t, &v) in self.taps.iter_mut().zip(self.line.iter()) {
            let updated = t
                .to_f()
                .scale(keep)
                .add(err.mul(v.conj()).scale(step));
            *t = Cq14::from_f(updated);
        }
        if self.wl_active {
            for (t, &v) in self.wl_taps.iter_mut().zip(self.line.iter()) {
                let updated = t.to_f().scale(keep).add(err.mul(v).scale(step));
                *t = Cq14::from_f(updated);
            }
        }
        if self.cfg.num_dfe > 0 && self.mode == EqMode::DecisionDirected {
            for (t, &d) in self.dfe_taps.iter_mut().zip(self.decisions.iter()) {
                let updated = t
                    .to_f()
                    .scale(keep)
                    .sub(err.mul(d.conj()).scale(step));
                *t = Cq14::from_f(updated);
            }
        }

        if self.cfg.num_dfe > 0 {
            self.decisions.rotate_right(1);
            self.decisions[0] = dec;
        }

        self.symbols = self.symbols.saturating_add(1);
        if self.mode == EqMode::CmaWarmup && self.symbols >= self.cfg.warmup_symbols {
            self.mode = EqMode::DecisionDirected;
        }

        self.update_impropriety(x);
        y
    }

    /// Accumulate the pseudo-power ratio and run the gated WL switch.
    fn update_impropriety(&mut self, x: Cf32) {
        if !self.cfg.wl_enable {
            return;
        }
        self.pseudo_acc = self.pseudo_acc.add(x.mul(x));
        self.power_acc += x.norm_sq();
        self.window_n += 1;
        if self.hold > 0 {
            self.hold -= 1;
        }
        if self.window_n < self.cfg.improp_window {
            return;
        }
        let ratio = if self.power_acc > 1e-9 {
            (self.pseudo_acc.norm_sq()).sqrt() / self.power_acc
        } else {
            0.0
        };
        self.pseudo_acc = Cf32::default();
        self.power_acc = 0.0;
        self.window_n = 0;

        let wants_wl = ratio > self.cfg.improp_threshold;
        if wants_wl != self.wl_active {
            self.flip_votes += 1;
            if self.flip_votes >= self.cfg.switch_hysteresis && self.hold == 0 {
                self.wl_active = wants_wl;
                self.flip_votes = 0;
                self.hold = self.cfg.min_hold;
                if !wants_wl {
                    // dropping the branch zeroes its taps so a later
                    // re-engage starts neutral
                    for t in self.wl_taps.iter_mut() {
                        *t = Cq14::default();
                    }
                }
            }
        } else {
            self.flip_votes = 0;
        }
    }

    /// Reset adaptation (retune).
    pub fn reset(&mut self) {
        for t in self.taps.iter_mut() {
            *t = Cq14::default();
        }
        self.taps[self.cfg.num_taps / 2] = Cq14 {
            re: Q14 as i32,
            im: 0,
        };
        for t in self.wl_taps.iter_mut() {
            *t = Cq14::default();
        }
        for t in self.dfe_taps.iter_mut() {
            *t = Cq14::default();
        }
        for v in self.line.iter_mut() {
            *v = Cf32::default();
        }
        for v in self.decisions.iter_mut() {
            *v = Cf32::default();
        }
        self.mode = EqMode::CmaWarmup;
        self.symbols = 0;
        self.wl_active = false;
        self.flip_votes = 0;
        self.hold = 0;
        self.pseudo_acc = Cf32::default();
        self.power_acc = 0.0;
        self.window_n = 0;
    }
}
