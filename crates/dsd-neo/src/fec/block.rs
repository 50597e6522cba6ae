// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Systematic block codes with syndrome-table decoding.
//!
//! One engine covers the Hamming, Golay, quadratic-residue and LSD code
//! families used across DMR, P25, NXDN and dPMR signaling. A code is a
//! systematic cyclic code (message in the high bits, polynomial remainder in
//! the low bits), optionally extended by an overall parity bit in the LSB.
//!
//! Decoding re-encodes the received message bits and XORs against the
//! received word; that map is linear with kernel exactly the code, so a
//! table keyed by it over all error patterns of weight <= t yields
//! bounded-distance decoding without an explicit parity-check matrix. The
//! table is built once per code behind `OnceLock`.

use std::collections::HashMap;
use std::sync::OnceLock;

/// A systematic cyclic block code, optionally parity-extended.
///
/// `n` total bits, `k` message bits, corrects up to `t` bit errors. Error
/// weights above `t` are reported as failures and never miscorrected as long
/// as the code distance is at least `2t + 2` for detect-beyond-correct
/// families (Hamming(16,11,4), RS-like contracts) or `2t + 1` otherwise.
pub struct BlockCode {
    /// Total codeword length in bits (<= 32).
    pub n: u8,
    /// Message length in bits.
    pub k: u8,
    /// Guaranteed correction capacity in bits.
    pub t: u8,
    /// Generator polynomial including the leading term.
    g: u32,
    /// Append an overall parity bit as the LSB.
    extended: bool,
    /// syndrome -> error pattern, built on first use.
    table: OnceLock<HashMap<u32, u32>>,
}

impl BlockCode {
    pub const fn new(n: u8, k: u8, t: u8, g: u32, extended: bool) -> Self {
        Self {
            n,
            k,
            t,
            g,
            extended,
            table: OnceLock::new(),
        }
    }

    /// Degree of the cyclic parity part.
    #[inline]
    fn r(&self) -> u8 {
        self.n - self.k - u8::from(self.extended)
    }

    /// Polynomial remainder of `m * x^r mod g`.
    fn parity(&self, m: u32) -> u32 {
        let r = self.r();
        let mask = (1u32 << r) - 1;
        let mut reg = 0u32;
        for i in (0..self.k).rev() {
            let fb = ((m >> i) & 1) ^ ((reg >> (r - 1)) & 1);
            reg = (reg << 1) & mask;
            if fb != 0 {
                reg ^= self.g & mask;
            }
        }
        reg
    }

    /// Encode `k` message bits into an `n`-bit codeword.
    pub fn encode(&self, m: u32) -> u32 {
        debug_assert!(m < (1u32 << self.k));
        let mut cw = (m << self.r()) | self.parity(m);
        if self.extended {
            cw = (cw << 1) | (cw.count_ones() & 1);
        }
        cw
    }

    /// Extract the message bits from a codeword.
    #[inline]
    pub fn message(&self, cw: u32) -> u32 {
        cw >> (self.n - self.k)
    }

    /// Linear syndrome: received XOR re-encoded message portion.
    #[inline]
    fn syndrome(&self, cw: u32) -> u32 {
        cw ^ self.encode(self.message(cw))
    }

    fn table(&self) -> &HashMap<u32, u32> {
        self.table.get_or_init(|| {
            let mut map = HashMap::new();
            // weight-0 entry keeps the clean path a plain lookup
            map.insert(0u32, 0u32);
            let positions: Vec<u32> = (0..u32::from(self.n)).collect();
            let mut stack: Vec<(u32, usize, u8)> = vec![(0, 0, 0)];
            while let Some((err, start, w)) = stack.pop() {
                if w > 0 {
                    map.insert(self.syndrome(err), err);
                }
                if w < self.t {
                    for (idx, &p) in positions.iter().enumerate().skip(start) {
                        stack.push((err | (1 << p), idx + 1, w + 1));
                    }
                }
            }
            map
        })
    }

    /// Decode in place to the nearest codeword within distance `t`.
    ///
    /// # Returns
    /// * `true` - codeword was valid or repaired.
    /// * `false` - error weight exceeded `t`; `cw` is left untouched.
    pub fn decode(&self, cw: &mut u32) -> bool {
        let s = self.syndrome(*cw);
        match self.table().get(&s) {
            Some(&err) => {
                *cw ^= err;
                true
            }
            None => false,
        }
    }

    /// Decode and return the number of corrected bits.
    pub fn decode_counted(&self, cw: &mut u32) -> super::FecResult {
        let s = self.syndrome(*cw);
        match self.table().get(&s) {
            Some(0) => super::FecResult::Clean,
            Some(&err) => {
                *cw ^= err;
                super::FecResult::Corrected(err.count_ones() as u8)
            }
            None => super::FecResult::Uncorrectable,
        }
    }
}

// =======================================================================
// Code instances
// =======================================================================

/// Hamming(7,4,3), DMR CACH TACT.
pub static HAMMING_7_4: BlockCode = BlockCode::new(7, 4, 1, 0b1011, false);
/// Hamming(13,9,3), BPTC(196,96) columns.
pub static HAMMING_13_9: BlockCode = BlockCode::new(13, 9, 1, 0b10011, false);
/// Hamming(15,11,3), BPTC(196,96) rows.
pub static HAMMING_15_11: BlockCode = BlockCode::new(15, 11, 1, 0b10011, false);
/// Hamming(16,11,4), extended (15,11); embedded signalling rows.
pub static HAMMING_16_11: BlockCode = BlockCode::new(16, 11, 1, 0b10011, true);
/// Hamming(17,12,3), NXDN SACCH.
pub static HAMMING_17_12: BlockCode = BlockCode::new(17, 12, 1, 0b100101, false);
/// Golay(20,8) with d=6, DMR reverse-channel signalling; corrects 2.
pub static GOLAY_20_8: BlockCode = BlockCode::new(20, 8, 2, 0x18D9, false);
/// Perfect binary Golay(23,12,7); corrects 3.
pub static GOLAY_23_12: BlockCode = BlockCode::new(23, 12, 3, 0xAE3 | 0x800, false);
/// Extended Golay(24,12,8); corrects 3, P25 MI fragments and DMR emb LC.
pub static GOLAY_24_12: BlockCode = BlockCode::new(24, 12, 3, 0xAE3 | 0x800, true);
/// QR(16,7,6) as BCH(15,7) + overall parity; corrects 2. NXDN/dPMR CAC.
pub static QR_16_7_6: BlockCode = BlockCode::new(16, 7, 2, 0x1D1, true);
/// P25 Phase 1 Low-Speed Data (16,8,4): corrects 1, detects 2.
pub static LSD_16_8: BlockCode = BlockCode::new(16, 8, 1, 0x107, false);
