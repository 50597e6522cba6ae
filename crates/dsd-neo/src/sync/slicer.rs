// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dibit reader with adaptive amplitude thresholds.
//!
//! Four-level slicing: a symbol value against `center` decides the sign,
//! then `umid`/`lmid` (0.625 of the way to the extremes) decide inner vs
//! outer level. The wire mapping is `+1 -> 0, +3 -> 1, -1 -> 2, -3 -> 3`.
//!
//! Thresholds adapt from rolling min/max windows of recent symbol values.
//! The invariant `min < center < max` holds from the first full calibration
//! (or warm-start) onward.

use crate::config::SLICER_WINDOW_MAX;
use std::collections::VecDeque;

/// Slicer calibration state.
#[derive(Debug, Clone)]
pub struct SlicerCal {
    pub center: f32,
    pub umid: f32,
    pub lmid: f32,
    pub min: f32,
    pub max: f32,
    /// Reference levels used by sync-gated logic (0.8 of the extremes).
    pub minref: f32,
    pub maxref: f32,
    pub minbuf: VecDeque<f32>,
    pub maxbuf: VecDeque<f32>,
    /// Rolling window length, at most [`SLICER_WINDOW_MAX`].
    pub msize: usize,
}

impl Default for SlicerCal {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SlicerCal {
    pub fn new(msize: usize) -> Self {
        Self {
            center: 0.0,
            umid: 0.0,
            lmid: 0.0,
            min: 0.0,
            max: 0.0,
            minref: 0.0,
            maxref: 0.0,
            minbuf: VecDeque::with_capacity(msize.min(SLICER_WINDOW_MAX)),
            maxbuf: VecDeque::with_capacity(msize.min(SLICER_WINDOW_MAX)),
            msize: msize.min(SLICER_WINDOW_MAX),
        }
    }

    /// Fold one symbol value into the rolling windows and refresh the
    /// derived thresholds.
    pub fn update(&mut self, v: f32) {
        let buf = if v < self.center {
            &mut self.minbuf
        } else {
            &mut self.maxbuf
        };
        if buf.len() == self.msize {
            buf.pop_front();
        }
        buf.push_back(v);
        self.recompute();
    }

    /// Recompute center/umid/lmid from the window means.
    pub fn recompute(&mut self) {
        if self.minbuf.is_empty() || self.maxbuf.is_empty() {
            return;
        }
        self.min = self.minbuf.iter().sum::<f32>() / self.minbuf.len() as f32;
        self.max = self.maxbuf.iter().sum::<f32>() / self.maxbuf.len() as f32;
        self.center = (self.min + self.max) / 2.0;
        self.umid = self.center + 0.625 * (self.max - self.center);
        self.lmid = self.center + 0.625 * (self.min - self.center);
    }

    /// True once a usable eye exists.
    pub fn calibrated(&self) -> bool {
        self.min < self.center && self.center < self.max
    }

    /// Drop all calibration (retune).
    pub fn reset(&mut self) {
        self.minbuf.clear();
        self.maxbuf.clear();
        self.center = 0.0;
        self.umid = 0.0;
        self.lmid = 0.0;
        self.min = 0.0;
        self.max = 0.0;
        self.minref = 0.0;
        self.maxref = 0.0;
    }
}

/// One sliced symbol with its optional side-channel outputs.
#[derive(Debug, Clone, Copy)]
pub struct SlicedSymbol {
    /// Two-bit symbol, wire mapping.
    pub dibit: u8,
    /// Slicing confidence, 0..255 (distance from the nearest threshold).
    pub reliability: u8,
    /// Normalized soft value for Viterbi metrics, roughly in [-3, 3].
    pub soft: f32,
    /// Raw symbol value for the secondary analog path.
    pub analog: f32,
}

/// Dibit reader: slices timed symbol values through [`SlicerCal`].
#[derive(Debug, Default)]
pub struct DibitReader {
    pub cal: SlicerCal,
    /// Total symbols consumed; sync matches report offsets against this.
    pub symbols_read: u64,
}

impl DibitReader {
    pub fn new(msize: usize) -> Self {
        Self {
            cal: SlicerCal::new(msize),
            symbols_read: 0,
        }
    }

    /// Slice one symbol-rate sample into a dibit.
    pub fn read(&mut self, v: f32) -> SlicedSymbol {
        self.cal.update(v);
        self.symbols_read += 1;

        let c = &self.cal;
        let dibit = if v >= c.center {
            if v >= c.umid {
                1 // +3
            } else {
                0 // +1
            }
        } else if v <= c.lmid {
            3 // -3
        } else {
            2 // -1
        };

        // confidence: distance to the nearest decision threshold, scaled by
        // the eye opening
        let eye = (c.max - c.min).max(1e-6);
        let d_center = (v - c.center).abs();
        let d_mid = (v - c.umid).abs().min((v - c.lmid).abs());
        let reliability = ((d_center.min(d_mid) / eye) * 1020.0).min(255.0) as u8;

        let soft = if c.calibrated() {
            // map [min, max] to [-3, 3]
            ((v - c.center) / (eye / 2.0)) * 3.0
        } else {
            0.0
        };

        SlicedSymbol {
            dibit,
            reliability,
            soft,
            analog: v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_four_level(reader: &mut DibitReader) {
        // repeating clean +3 +1 -1 -3 eye
        for _ in 0..64 {
            for &v in &[3.0f32, 1.0, -1.0, -3.0] {
                reader.read(v);
            }
        }
    }

    #[test]
    fn test_threshold_convergence() {
        let mut r = DibitReader::new(32);
        feed_four_level(&mut r);
        let c = &r.cal;
        assert!(c.calibrated());
        assert!((c.center - 0.0).abs() < 0.3, "center {}", c.center);
        assert!(c.umid > c.center && c.umid < c.max);
        assert!(c.lmid < c.center && c.lmid > c.min);
    }

    #[test]
    fn test_dibit_mapping() {
        let mut r = DibitReader::new(32);
        feed_four_level(&mut r);
        assert_eq!(r.read(1.0).dibit, 0);
        assert_eq!(r.read(3.0).dibit, 1);
        assert_eq!(r.read(-1.0).dibit, 2);
        assert_eq!(r.read(-3.0).dibit, 3);
    }

    #[test]
    fn test_reliability_orders_confidence() {
        let mut r = DibitReader::new(32);
        feed_four_level(&mut r);
        // a value on the decision boundary is less reliable than a clean one
        let edge = r.read(r.cal.umid);
        let clean = r.read(3.0);
        assert!(clean.reliability > edge.reliability);
    }

    #[test]
    fn test_soft_sign_tracks_symbol() {
        let mut r = DibitReader::new(32);
        feed_four_level(&mut r);
        assert!(r.read(3.0).soft > 2.0);
        assert!(r.read(-3.0).soft < -2.0);
        assert!(r.read(1.0).soft > 0.0 && r.read(1.0).soft < 2.0);
    }
}
