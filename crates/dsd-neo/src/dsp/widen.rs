// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Widen u8 capture bytes to centered i16, with optional 90° IQ rotation.
//!
//! Tuner bytes are unsigned, centered at 127(.5). Widening subtracts the
//! bias and shifts into Q15. The optional rotation multiplies successive IQ
//! pairs by j^n, i.e. the cyclic map `[i,q] -> [i,q], [-q,i], [-i,-q], [q,-i]`,
//! which recenters a quarter-rate capture offset at DC.
//!
//! # Bias contract
//!
//! - bias **127** pairs with the scalar widen and all SIMD rotation paths.
//! - bias **128** pairs with the legacy byte-wise `255 - x` pre-negation, so
//!   the combined effect is the exact centered negation:
//!   `(255 - x) - 128 == -(x - 127)`.
//!
//! Runtime dispatch picks AVX2, then SSSE3, then scalar on x86-64, and NEON
//! on aarch64. Every SIMD path yields results identical to the scalar
//! reference.

/// Widening bias matching the rotation variant in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Scalar widen / SIMD rotation paths.
    Centered127,
    /// Legacy byte-wise `255 - x` pre-negated input.
    Centered128,
}

impl Bias {
    #[inline]
    fn value(self) -> i16 {
        match self {
            Bias::Centered127 => 127,
            Bias::Centered128 => 128,
        }
    }
}

/// Scalar reference: widen without rotation.
pub fn widen_scalar(input: &[u8], out: &mut [i16], bias: Bias) {
    let b = bias.value();
    for (x, o) in input.iter().zip(out.iter_mut()) {
        *o = (i16::from(*x) - b) << 6;
    }
}

/// Scalar reference: widen IQ pairs and rotate by j^n.
///
/// `input.len()` must be even; pair n is rotated by `(n % 4) * 90°`.
pub fn widen_rotate_scalar(input: &[u8], out: &mut [i16], bias: Bias) {
    debug_assert_eq!(input.len() % 2, 0);
    let b = bias.value();
    let w = |x: u8| (i16::from(x) - b) << 6;
    for (n, (pair, o)) in input.chunks_exact(2).zip(out.chunks_exact_mut(2)).enumerate() {
        let (i, q) = (w(pair[0]), w(pair[1]));
        let (ro, io) = match n % 4 {
            0 => (i, q),
            1 => (-q, i),
            2 => (-i, -q),
            _ => (q, -i),
        };
        o[0] = ro;
        o[1] = io;
    }
}

/// Legacy byte-wise pre-negation (`255 - x`) used by the bias-128 path.
pub fn negate_bytes(buf: &mut [u8]) {
    for x in buf.iter_mut() {
        *x = 255 - *x;
    }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::Bias;

    /// Widen without rotation, SSSE3.
    ///
    /// SAFETY: caller must verify ssse3 support at runtime.
    #[target_feature(enable = "ssse3")]
    pub unsafe fn widen_ssse3(input: &[u8], out: &mut [i16], bias: Bias) {
        use std::arch::x86_64::*;
        let b = _mm_set1_epi16(i16::from(bias == Bias::Centered128) + 127);
        let chunks = input.len() / 8;
        for c in 0..chunks {
            let p = input.as_ptr().add(c * 8);
            let v = _mm_loadl_epi64(p as *const __m128i);
            let wide = _mm_unpacklo_epi8(v, _mm_setzero_si128());
            let centered = _mm_sub_epi16(wide, b);
            let shifted = _mm_slli_epi16::<6>(centered);
            _mm_storeu_si128(out.as_mut_ptr().add(c * 8) as *mut __m128i, shifted);
        }
        super::widen_scalar(&input[chunks * 8..], &mut out[chunks * 8..], bias);
    }

    /// Widen without rotation, AVX2.
    ///
    /// SAFETY: caller must verify avx2 support at runtime.
    #[target_feature(enable = "avx2")]
    pub unsafe fn widen_avx2(input: &[u8], out: &mut [i16], bias: Bias) {
        use std::arch::x86_64::*;
        let b = _mm256_set1_epi16(i16::from(bias == Bias::Centered128) + 127);
        let chunks = input.len() / 16;
        for c in 0..chunks {
            let p = input.as_ptr().add(c * 16);
            let v = _mm_loadu_si128(p as *const __m128i);
            let wide = _mm256_cvtepu8_epi16(v);
            let centered = _mm256_sub_epi16(wide, b);
            let shifted = _mm256_slli_epi16::<6>(centered);
            _mm256_storeu_si256(out.as_mut_ptr().add(c * 16) as *mut __m256i, shifted);
        }
        super::widen_scalar(&input[chunks * 16..], &mut out[chunks * 16..], bias);
    }

    /// Widen + rotate, SSSE3. Processes 4 IQ pairs (one full rotation cycle)
    /// per iteration: widen as above, then apply the sign/swizzle pattern.
    ///
    /// SAFETY: caller must verify ssse3 support at runtime.
    #[target_feature(enable = "ssse3")]
    pub unsafe fn widen_rotate_ssse3(input: &[u8], out: &mut [i16], bias: Bias) {
        use std::arch::x86_64::*;
        let b = _mm_set1_epi16(i16::from(bias == Bias::Centered128) + 127);
        // lane order after widen: i0 q0 i1 q1 i2 q2 i3 q3
        // rotation: (i0,q0) (-q1,i1) (-i2,-q2) (q3,-i3)
        let swap = _mm_setr_epi8(0, 1, 2, 3, 6, 7, 4, 5, 8, 9, 10, 11, 14, 15, 12, 13);
        let sign = _mm_setr_epi16(1, 1, -1, 1, -1, -1, 1, -1);
        let chunks = input.len() / 8;
        for c in 0..chunks {
            let p = input.as_ptr().add(c * 8);
            let v = _mm_loadl_epi64(p as *const __m128i);
            let wide = _mm_unpacklo_epi8(v, _mm_setzero_si128());
            let centered = _mm_slli_epi16::<6>(_mm_sub_epi16(wide, b));
            let swizzled = _mm_shuffle_epi8(centered, swap);
            let rotated = _mm_sign_epi16(swizzled, sign);
            _mm_storeu_si128(out.as_mut_ptr().add(c * 8) as *mut __m128i, rotated);
        }
        let done = chunks * 8;
        // the scalar tail keeps the pair index so the cycle stays aligned
        rotate_tail(input, out, bias, done);
    }

    #[inline]
    fn rotate_tail(input: &[u8], out: &mut [i16], bias: Bias, done: usize) {
        let b = match bias {
            Bias::Centered127 => 127i16,
            Bias::Centered128 => 128,
        };
        let w = |x: u8| (i16::from(x) - b) << 6;
        for n in (done / 2)..(input.len() / 2) {
            let (i, q) = (w(input[2 * n]), w(input[2 * n + 1]));
            let (ro, io) = match n % 4 {
                0 => (i, q),
                1 => (-q, i),
                2 => (-i, -q),
                _ => (q, -i),
            };
            out[2 * n] = ro;
            out[2 * n + 1] = io;
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arm {
    use super::Bias;

    /// Widen without rotation, NEON.
    ///
    /// SAFETY: NEON is mandatory on aarch64.
    pub fn widen_neon(input: &[u8], out: &mut [i16], bias: Bias) {
        unsafe {
            use std::arch::aarch64::*;
            let b = vdupq_n_s16(i16::from(bias == Bias::Centered128) + 127);
            let chunks = input.len() / 8;
            for c in 0..chunks {
                let v = vld1_u8(input.as_ptr().add(c * 8));
                let wide = vreinterpretq_s16_u16(vmovl_u8(v));
                let shifted = vshlq_n_s16::<6>(vsubq_s16(wide, b));
                vst1q_s16(out.as_mut_ptr().add(c * 8), shifted);
            }
            super::widen_scalar(&input[chunks * 8..], &mut out[chunks * 8..], bias);
        }
    }
}

/// Widen with the best available implementation.
pub fn widen(input: &[u8], out: &mut [i16], bias: Bias) {
    debug_assert!(out.len() >= input.len());
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: feature checked above
            unsafe { x86::widen_avx2(input, out, bias) };
            return;
        }
        if is_x86_feature_detected!("ssse3") {
            // SAFETY: feature checked above
            unsafe { x86::widen_ssse3(input, out, bias) };
            return;
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        arm::widen_neon(input, out, bias);
        return;
    }
    #[allow(unreachable_code)]
    widen_scalar(input, out, bias);
}

/// Widen + rotate with the best available implementation.
pub fn widen_rotate(input: &[u8], out: &mut [i16], bias: Bias) {
    debug_assert!(out.len() >= input.len());
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("ssse3") {
            // SAFETY: feature checked above
            unsafe { x86::widen_rotate_ssse3(input, out, bias) };
            return;
        }
    }
    #[allow(unreachable_code)]
    widen_rotate_scalar(input, out, bias);
}
