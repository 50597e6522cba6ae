// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reed-Solomon codecs over GF(64) with errors-and-erasures decoding.
//!
//! P25 protects its link control and trunking payloads with hexbit
//! (6-bit-symbol) RS codes, all shortened from the (63, 63-2t) parent over
//! GF(2^6) with field polynomial x^6 + x + 1:
//!
//! | Code | Parity | Capacity |
//! |------|--------|----------|
//! | RS(12,9)   | 3  | 1 correct / 2 detect |
//! | RS(24,12)  | 12 | t = 6  |
//! | RS(36,20)  | 16 | t = 8  |
//! | RS(63,35)  | 28 | t = 14, with erasure marking |
//!
//! Decoding is Berlekamp-Massey with an erasure-initialized locator, Chien
//! search and Forney magnitudes, accepting only bounded-distance results
//! (2 errors + erasures <= parity). Erasure marking never degrades below the
//! hard decoder: an empty erasure list reduces to plain BM.

use super::FecResult;
use std::sync::OnceLock;

const FIELD: usize = 64;
const GROUP: usize = 63;
/// Field polynomial x^6 + x + 1.
const POLY: u16 = 0x43;

struct Gf64 {
    exp: [u8; 128],
    log: [u8; 64],
}

static TABLES: OnceLock<Gf64> = OnceLock::new();

fn gf() -> &'static Gf64 {
    TABLES.get_or_init(|| {
        let mut exp = [0u8; 128];
        let mut log = [0u8; 64];
        let mut x: u16 = 1;
        for i in 0..GROUP {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x40 != 0 {
                x ^= POLY;
            }
        }
        for i in GROUP..128 {
            exp[i] = exp[i - GROUP];
        }
        Gf64 { exp, log }
    })
}

#[inline]
fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = gf();
    t.exp[(usize::from(t.log[a as usize]) + usize::from(t.log[b as usize])) % GROUP]
}

#[inline]
fn inv(a: u8) -> u8 {
    let t = gf();
    t.exp[(GROUP - usize::from(t.log[a as usize])) % GROUP]
}

#[inline]
fn alpha(power: usize) -> u8 {
    gf().exp[power % GROUP]
}

/// Encode: compute `nroots` parity symbols over `msg` (6-bit values).
///
/// Returns the parity tail; the on-air codeword is `msg || parity`.
pub fn encode(msg: &[u8], nroots: usize) -> Vec<u8> {
    debug_assert!(msg.len() + nroots <= GROUP);
    // generator poly Π (x + α^j), j = 1..nroots, leading coefficient first
    let mut g = vec![1u8];
    for j in 1..=nroots {
        let mut ng = vec![0u8; g.len() + 1];
        for (i, &c) in g.iter().enumerate() {
            ng[i] ^= mul(c, alpha(j));
            ng[i + 1] ^= c;
        }
        g = ng;
    }
    g.reverse();

    let mut rem = vec![0u8; nroots];
    for &m in msg {
        let fb = m ^ rem[0];
        rem.rotate_left(1);
        rem[nroots - 1] = 0;
        if fb != 0 {
            for i in 0..nroots {
                rem[i] ^= mul(fb, g[i + 1]);
            }
        }
    }
    rem
}

/// Errors-and-erasures decode in place.
///
/// `data` holds the full codeword (message symbols then parity); `erasures`
/// are indices into `data` flagged unreliable by the caller. Beyond-capacity
/// inputs return [`FecResult::Uncorrectable`] with `data` untouched.
pub fn decode(data: &mut [u8], nroots: usize, erasures: &[usize]) -> FecResult {
    let n = data.len();
    debug_assert!(n <= GROUP && nroots < n);

    // Syndromes S_j = r(α^j), j = 1..nroots.
    let mut syn = vec![0u8; nroots];
    let mut clean = true;
    for (j, s) in syn.iter_mut().enumerate() {
        let mut acc = 0u8;
        for (i, &d) in data.iter().enumerate() {
            if d != 0 {
                acc ^= mul(d, alpha((j + 1) * (n - 1 - i)));
            }
        }
        *s = acc;
        clean &= acc == 0;
    }
    if clean {
        return FecResult::Clean;
    }

    // Erasure-initialized locator Λ(x) = Π (1 + X_i x).
    let mut lambda = vec![0u8; nroots + 1];
    lambda[0] = 1;
    for &idx in erasures {
        if idx >= n {
            return FecResult::Uncorrectable;
        }
        let x = alpha(n - 1 - idx);
        let prev = lambda.clone();
        for i in 0..nroots {
            lambda[i + 1] ^= mul(prev[i], x);
        }
    }

    // Berlekamp-Massey over the remaining iterations.
    let e = erasures.len();
    let mut b = lambda.clone();
    let mut el = e;
    let mut r = e;
    while r < nroots {
        r += 1;
        let mut discr = 0u8;
        for i in 0..r.min(lambda.len()) {
            if lambda[i] != 0 {
                discr ^= mul(lambda[i], syn[r - 1 - i]);
            }
        }
        if discr == 0 {
            b.rotate_right(1);
            b[0] = 0;
        } else {
            let mut t = vec![0u8; nroots + 1];
            t[0] = lambda[0];
            for i in 0..nroots {
                t[i + 1] = lambda[i + 1] ^ mul(discr, b[i]);
            }
            if 2 * el <= r + e - 1 {
                el = r + e - el;
                let d_inv = inv(discr);
                for (dst, &src) in b.iter_mut().zip(lambda.iter()) {
                    *dst = mul(src, d_inv);
                }
            } else {
                b.rotate_right(1);
                b[0] = 0;
            }
            lambda = t;
        }
    }

    let deg = match lambda.iter().rposition(|&c| c != 0) {
        Some(d) => d,
        None => return FecResult::Uncorrectable,
    };
    // Bounded distance: 2ν + e <= nroots with deg = ν + e.
    if 2 * deg > nroots + e {
        return FecResult::Uncorrectable;
    }

    // Chien search over the shortened positions.
    let mut roots = Vec::with_capacity(deg);
    for idx in 0..n {
        let x_inv = alpha(GROUP - (n - 1 - idx) % GROUP);
        let mut acc = 0u8;
        let mut xp = 1u8;
        for &c in &lambda[..=deg] {
            if c != 0 {
                acc ^= mul(c, xp);
            }
            xp = mul(xp, x_inv);
        }
        if acc == 0 {
            roots.push(idx);
        }
    }
    if roots.len() != deg {
        return FecResult::Uncorrectable;
    }

    // Ω(x) = S(x)Λ(x) mod x^nroots.
    let mut omega = vec![0u8; nroots];
    for i in 0..nroots {
        let mut acc = 0u8;
        for j in 0..=i.min(lambda.len() - 1) {
            if lambda[j] != 0 {
                acc ^= mul(lambda[j], syn[i - j]);
            }
        }
        omega[i] = acc;
    }

    // Forney magnitudes (fcr = 1 drops the X^(1-fcr) factor).
    let mut fixed = data.to_vec();
    for &idx in &roots {
        let x_inv = alpha(GROUP - (n - 1 - idx) % GROUP);
        let mut num = 0u8;
        let mut xp = 1u8;
        for &c in &omega {
            if c != 0 {
                num ^= mul(c, xp);
            }
            xp = mul(xp, x_inv);
        }
        let x_inv2 = mul(x_inv, x_inv);
        let mut den = 0u8;
        let mut xp = 1u8;
        let mut i = 1;
        while i <= deg {
            if lambda[i] != 0 {
                den ^= mul(lambda[i], xp);
            }
            xp = mul(xp, x_inv2);
            i += 2;
        }
        if den == 0 {
            return FecResult::Uncorrectable;
        }
        fixed[idx] ^= mul(num, inv(den));
    }

    // Re-check syndromes so an overloaded input can never fabricate output.
    for j in 1..=nroots {
        let mut acc = 0u8;
        for (i, &d) in fixed.iter().enumerate() {
            if d != 0 {
                acc ^= mul(d, alpha(j * (n - 1 - i)));
            }
        }
        if acc != 0 {
            return FecResult::Uncorrectable;
        }
    }

    data.copy_from_slice(&fixed);
    FecResult::Corrected(deg as u8)
}

/// RS(12,9): 1 symbol corrected, 2 detected. P25 HDU/TDULC link control.
pub fn rs_12_9(data: &mut [u8; 12]) -> FecResult {
    decode(data, 3, &[])
}

/// RS(24,12,13): t = 6. P25 LDU1 header words.
pub fn rs_24_12(data: &mut [u8; 24]) -> FecResult {
    decode(data, 12, &[])
}

/// RS(36,20,17): t = 8. P25 LDU2 tail words.
pub fn rs_36_20(data: &mut [u8; 36]) -> FecResult {
    decode(data, 16, &[])
}

/// RS(63,35): t = 14, erasure-capable. P25 Phase 2 FACCH/SACCH.
pub fn rs_63_35(data: &mut [u8; 63], erasures: &[usize]) -> FecResult {
    decode(data, 28, erasures)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cw(k: usize, nroots: usize, seed: u64) -> Vec<u8> {
        let mut rng = fastrand::Rng::with_seed(seed);
        let msg: Vec<u8> = (0..k).map(|_| rng.u8(..64)).collect();
        let mut cw = msg.clone();
        cw.extend(encode(&msg, nroots));
        cw
    }

    #[test]
    fn test_clean_decode() {
        let mut cw = make_cw(12, 12, 1);
        let orig = cw.clone();
        assert_eq!(decode(&mut cw, 12, &[]), FecResult::Clean);
        assert_eq!(cw, orig);
    }

    #[test]
    fn test_corrects_to_capacity() {
        for (k, nroots, seed) in [(9usize, 3usize, 2u64), (12, 12, 3), (20, 16, 4), (35, 28, 5)] {
            let t = nroots / 2;
            let mut rng = fastrand::Rng::with_seed(seed + 100);
            let cw = make_cw(k, nroots, seed);
            for ne in 1..=t {
                let mut rx = cw.clone();
                let mut hit = Vec::new();
                while hit.len() < ne {
                    let p = rng.usize(..rx.len());
                    if !hit.contains(&p) {
                        hit.push(p);
                        rx[p] ^= rng.u8(1..64);
                    }
                }
                let res = decode(&mut rx, nroots, &[]);
                assert!(res.ok(), "k={} ne={}", k, ne);
                assert_eq!(rx, cw, "k={} ne={}", k, ne);
            }
        }
    }

    #[test]
    fn test_erasures_extend_capacity() {
        // t errors plus up to nroots - 2t erasures must still decode.
        let cw = make_cw(35, 28, 9);
        let mut rng = fastrand::Rng::with_seed(11);
        let mut rx = cw.clone();
        let mut pos = Vec::new();
        while pos.len() < 20 {
            let p = rng.usize(..63);
            if !pos.contains(&p) {
                pos.push(p);
            }
        }
        // 4 hard errors + 16 erasures: 2*4 + 16 = 24 <= 28
        for &p in &pos[..4] {
            rx[p] ^= rng.u8(1..64);
        }
        for &p in &pos[4..] {
            rx[p] = rng.u8(..64);
        }
        let mut arr: [u8; 63] = rx.try_into().expect("len");
        let res = rs_63_35(&mut arr, &pos[4..]);
        assert!(res.ok());
        assert_eq!(arr.to_vec(), cw);
    }

    #[test]
    fn test_rs12_9_two_errors_detected() {
        let cw = make_cw(9, 3, 21);
        let mut rng = fastrand::Rng::with_seed(22);
        for _ in 0..64 {
            let mut rx: [u8; 12] = cw.clone().try_into().expect("len");
            let a = rng.usize(..12);
            let mut b = rng.usize(..12);
            while b == a {
                b = rng.usize(..12);
            }
            rx[a] ^= rng.u8(1..64);
            rx[b] ^= rng.u8(1..64);
            let before = rx;
            let res = rs_12_9(&mut rx);
            match res {
                FecResult::Uncorrectable => assert_eq!(rx, before),
                // a double hit can cancel into a single-symbol error; the
                // repaired word must then equal the original codeword
                _ => assert_eq!(rx.to_vec(), cw),
            }
        }
    }

    #[test]
    fn test_beyond_capacity_never_fabricates() {
        let cw = make_cw(35, 28, 31);
        let mut rng = fastrand::Rng::with_seed(32);
        for _ in 0..32 {
            let mut rx: [u8; 63] = cw.clone().try_into().expect("len");
            let mut hit = Vec::new();
            while hit.len() < 15 {
                let p = rng.usize(..63);
                if !hit.contains(&p) {
                    hit.push(p);
                    rx[p] ^= rng.u8(1..64);
                }
            }
            if let FecResult::Corrected(_) | FecResult::Clean = rs_63_35(&mut rx, &[]) {
                assert_eq!(rx.to_vec(), cw, "fabricated a different codeword");
            }
        }
    }
}
