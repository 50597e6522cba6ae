// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Automatic and manual gain.
//!
//! The AGC targets a running RMS in the int16 domain. A silence
//! short-circuit skips adaptation and output on effectively-zero input so
//! squelched gaps never turn into crackle as the gain winds up.

/// Input sample domain, which sets the manual-gain base scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Normalized float samples around +/-1.0.
    NormalizedFloat,
    /// Already-scaled PCM16 values carried in floats.
    Pcm16,
}

impl InputKind {
    /// Base scale applied before the user gain.
    pub fn base_scale(self) -> f32 {
        match self {
            InputKind::NormalizedFloat => 4800.0,
            InputKind::Pcm16 => 1.0,
        }
    }
}

/// Manual gain: input-aware base scale times the user gain.
pub fn manual_gain(samples: &mut [f32], kind: InputKind, gain: f32) {
    let scale = kind.base_scale() * gain;
    for s in samples.iter_mut() {
        *s = (*s * scale).clamp(f32::from(i16::MIN), f32::from(i16::MAX));
    }
}

/// Running-RMS automatic gain control.
#[derive(Debug, Clone)]
pub struct Agc {
    /// Target RMS in the int16 domain.
    target_rms: f32,
    /// Smoothed measured RMS.
    rms: f32,
    /// Current gain.
    gain: f32,
    max_gain: f32,
}

/// Mean power below which a frame counts as silence.
const SILENCE_POWER: f32 = 1.0;

impl Default for Agc {
    fn default() -> Self {
        Self::new(6000.0, 50.0)
    }
}

impl Agc {
    pub fn new(target_rms: f32, max_gain: f32) -> Self {
        Self {
            target_rms,
            rms: 0.0,
            gain: 1.0,
            max_gain,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Gain one float frame in place (int16 domain values).
    pub fn process(&mut self, samples: &mut [f32]) {
        if samples.is_empty() {
            return;
        }
        let power: f32 =
            samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        if power < SILENCE_POWER {
            // silence short-circuit: output zeros, freeze adaptation
            for s in samples.iter_mut() {
                *s = 0.0;
            }
            return;
        }
        let frame_rms = power.sqrt();
        self.rms = 0.8 * self.rms + 0.2 * frame_rms;
        if self.rms > 1.0 {
            let desired = self.target_rms / self.rms;
            // slew the gain so word onsets never pump
            self.gain += 0.25 * (desired - self.gain);
            self.gain = self.gain.clamp(0.01, self.max_gain);
        }
        for s in samples.iter_mut() {
            *s = (*s * self.gain).clamp(f32::from(i16::MIN), f32::from(i16::MAX));
        }
    }

    /// Gain one i16 frame in place.
    pub fn process_i16(&mut self, samples: &mut [i16]) {
        let mut buf: Vec<f32> = samples.iter().map(|&s| f32::from(s)).collect();
        self.process(&mut buf);
        for (o, v) in samples.iter_mut().zip(buf.iter()) {
            *o = *v as i16;
        }
    }

    pub fn reset(&mut self) {
        self.rms = 0.0;
        self.gain = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agc_converges_toward_target() {
        let mut agc = Agc::new(6000.0, 50.0);
        // quiet tone at RMS ~300
        let frame: Vec<f32> = (0..160)
            .map(|i| 424.0 * (i as f32 * 0.3).sin())
            .collect();
        let mut last_rms = 0.0f32;
        for _ in 0..50 {
            let mut f = frame.clone();
            agc.process(&mut f);
            let p: f32 = f.iter().map(|s| s * s).sum::<f32>() / f.len() as f32;
            last_rms = p.sqrt();
        }
        assert!(
            (last_rms - 6000.0).abs() < 1500.0,
            "rms after agc {}",
            last_rms
        );
    }

    #[test]
    fn test_silence_short_circuit() {
        let mut agc = Agc::new(6000.0, 50.0);
        let gain_before = agc.gain();
        let mut frame = vec![0.0f32; 160];
        frame[0] = 0.5; // effectively zero
        agc.process(&mut frame);
        assert!(frame.iter().all(|&s| s == 0.0));
        assert_eq!(agc.gain(), gain_before, "silence must not adapt the gain");
    }

    #[test]
    fn test_manual_gain_scales_by_input_kind() {
        let mut a = vec![0.5f32; 4];
        manual_gain(&mut a, InputKind::NormalizedFloat, 1.0);
        assert!((a[0] - 2400.0).abs() < 1e-3);

        let mut b = vec![500.0f32; 4];
        manual_gain(&mut b, InputKind::Pcm16, 2.0);
        assert!((b[0] - 1000.0).abs() < 1e-3);
    }

    #[test]
    fn test_i16_path_matches_float() {
        let mut agc_f = Agc::new(6000.0, 50.0);
        let mut agc_i = Agc::new(6000.0, 50.0);
        let frame: Vec<f32> = (0..160).map(|i| 2000.0 * (i as f32 * 0.2).sin()).collect();
        let mut f = frame.clone();
        agc_f.process(&mut f);
        let mut i: Vec<i16> = frame.iter().map(|&s| s as i16).collect();
        agc_i.process_i16(&mut i);
        for (a, b) in f.iter().zip(i.iter()) {
            assert!((a - f32::from(*b)).abs() <= 2.0);
        }
    }
}
