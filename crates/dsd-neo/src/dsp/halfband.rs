// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Symmetric half-band FIR decimators.
//!
//! A half-band filter has every odd-indexed tap (counting from the center)
//! exactly zero and a center tap of 0.5, so decimate-by-2 costs only the
//! even taps. The left wing of each block is carried across calls so stream
//! chunking never changes the output.

/// Supported half-band orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfBandOrder {
    Taps15,
    Taps23,
    Taps31,
}

impl HalfBandOrder {
    fn len(self) -> usize {
        match self {
            HalfBandOrder::Taps15 => 15,
            HalfBandOrder::Taps23 => 23,
            HalfBandOrder::Taps31 => 31,
        }
    }
}

/// Decimate-by-2 half-band filter with persistent history.
pub struct HalfBand {
    taps: Vec<f32>,
    history: Vec<f32>,
}

impl HalfBand {
    /// Design a half-band low-pass of the given order (Hamming window).
    pub fn new(order: HalfBandOrder) -> Self {
        let n = order.len();
        let center = n / 2;
        let mut taps = vec![0.0f32; n];
        for (i, t) in taps.iter_mut().enumerate() {
            let k = i as f64 - center as f64;
            let ideal = if k == 0.0 {
                0.5
            } else {
                // sin(pi k / 2) / (pi k): zero at even k != 0
                (std::f64::consts::FRAC_PI_2 * k).sin() / (std::f64::consts::PI * k)
            };
            let w = 0.54
                - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos();
            *t = (ideal * w) as f32;
        }
        // force the half-band structure exactly: odd offsets zero, then
        // normalize the even taps so DC gain is unity
        for (i, t) in taps.iter_mut().enumerate() {
            let k = i as i64 - center as i64;
            if k != 0 && k % 2 == 0 {
                *t = 0.0;
            }
        }
        taps[center] = 0.5;
        let wing_sum: f32 = taps
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != center)
            .map(|(_, t)| *t)
            .sum();
        if wing_sum != 0.0 {
            let scale = 0.5 / wing_sum;
            for (i, t) in taps.iter_mut().enumerate() {
                if i != center {
                    *t *= scale;
                }
            }
        }
        Self {
            history: vec![0.0; n - 1],
            taps,
        }
    }

    /// Filter taps (test and introspection support).
    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    /// Decimate `input` by two, appending to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let n = self.taps.len();
        let mut buf = Vec::with_capacity(self.history.len() + input.len());
        buf.extend_from_slice(&self.history);
        buf.extend_from_slice(input);

        let full = buf.len().saturating_sub(n - 1);
        let mut i = 0;
        while i < full {
            let mut acc = 0.0f32;
            for (j, &t) in self.taps.iter().enumerate() {
                if t != 0.0 {
                    acc += t * buf[i + j];
                }
            }
            out.push(acc);
            i += 2;
        }
        // carry the unconsumed wing; keep phase parity across calls
        let consumed = i;
        self.history = buf.split_off(consumed);
    }

    /// Drop stream history (retune).
    pub fn reset(&mut self) {
        for h in self.history.iter_mut() {
            *h = 0.0;
        }
        let n = self.taps.len();
        self.history.resize(n - 1, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halfband_structure() {
        for order in [HalfBandOrder::Taps15, HalfBandOrder::Taps23, HalfBandOrder::Taps31] {
            let hb = HalfBand::new(order);
            let taps = hb.taps();
            let center = taps.len() / 2;
            assert_eq!(taps[center], 0.5);
            for (i, &t) in taps.iter().enumerate() {
                let k = i as i64 - center as i64;
                if k != 0 && k % 2 == 0 {
                    assert_eq!(t, 0.0, "even-offset tap {} nonzero", i);
                }
            }
            let wings: f32 = taps
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != center)
                .map(|(_, t)| *t)
                .sum();
            assert!((wings - 0.5).abs() < 1e-6, "unity DC gain");
        }
    }

    #[test]
    fn test_dc_passthrough() {
        let mut hb = HalfBand::new(HalfBandOrder::Taps23);
        let input = vec![1.0f32; 512];
        let mut out = Vec::new();
        hb.process(&input, &mut out);
        // after the transient, DC passes at unity
        let settled = &out[32..];
        for &v in settled {
            assert!((v - 1.0).abs() < 1e-3, "got {}", v);
        }
    }

    #[test]
    fn test_chunked_equals_whole() {
        let mut rng = fastrand::Rng::with_seed(5);
        let input: Vec<f32> = (0..1000).map(|_| rng.f32() - 0.5).collect();

        let mut whole = HalfBand::new(HalfBandOrder::Taps15);
        let mut a = Vec::new();
        whole.process(&input, &mut a);

        let mut chunked = HalfBand::new(HalfBandOrder::Taps15);
        let mut b = Vec::new();
        for chunk in input.chunks(97) {
            chunked.process(chunk, &mut b);
        }
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
