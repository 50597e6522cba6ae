// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DMR block product turbo codes.
//!
//! Three shapes are used by DMR signaling:
//! - **(196,96)**: full-burst signaling (CSBK, data headers, full LC).
//!   13x15 matrix, rows Hamming(15,11), columns Hamming(13,9), 181-step
//!   bit interleave, three reserved bits ahead of the 96 payload bits.
//! - **(128,77)**: embedded link control. 8x16 matrix, rows Hamming(16,11,4)
//!   plus a column-parity row; 72 LC bits + 5-bit checksum.
//! - **(16,2)**: reverse-channel signaling. Four codewords at pairwise
//!   distance >= 8, nearest-codeword decode.
//!
//! Row/column correction alternates until a pass changes nothing, so any
//! single bit flip anywhere in a matrix is always repaired.

use super::block::{HAMMING_13_9, HAMMING_15_11, HAMMING_16_11};
use super::{bits_to_u32, u32_to_bits};

// =======================================================================
// BPTC(196,96)
// =======================================================================

const B196: usize = 196;
const ROWS: usize = 13;
const COLS: usize = 15;

/// Undo the on-air 181-step interleave.
pub fn deinterleave_196(bits: &[u8; B196]) -> [u8; B196] {
    let mut out = [0u8; B196];
    for (i, &b) in bits.iter().enumerate() {
        out[(i * 181) % B196] = b;
    }
    out
}

/// Apply the on-air 181-step interleave.
pub fn interleave_196(bits: &[u8; B196]) -> [u8; B196] {
    let mut out = [0u8; B196];
    for (i, o) in out.iter_mut().enumerate() {
        *o = bits[(i * 181) % B196];
    }
    out
}

/// Matrix layout: bit (r, c) lives at `1 + r*15 + c`; bit 0 is padding that
/// rides along with the R0 reserved bit.
#[inline]
fn at(r: usize, c: usize) -> usize {
    1 + r * COLS + c
}

/// Encode 96 payload bits (plus zeroed reserved bits) into an interleaved
/// 196-bit block. Test and loopback support.
pub fn encode_196(payload: &[u8; 96]) -> [u8; B196] {
    let mut m = [0u8; B196];
    // payload: row 0 cols 3..10, rows 1..8 cols 0..10
    let mut p = 0;
    for c in 3..11 {
        m[at(0, c)] = payload[p];
        p += 1;
    }
    for r in 1..9 {
        for c in 0..11 {
            m[at(r, c)] = payload[p];
            p += 1;
        }
    }
    // row parity over the 9 data rows
    for r in 0..9 {
        let mut word = 0u32;
        for c in 0..11 {
            word = (word << 1) | u32::from(m[at(r, c)]);
        }
        let cw = HAMMING_15_11.encode(word);
        for c in 0..COLS {
            m[at(r, c)] = ((cw >> (14 - c)) & 1) as u8;
        }
    }
    // column parity over all 15 columns
    for c in 0..COLS {
        let mut word = 0u32;
        for r in 0..9 {
            word = (word << 1) | u32::from(m[at(r, c)]);
        }
        let cw = HAMMING_13_9.encode(word);
        for r in 0..ROWS {
            m[at(r, c)] = ((cw >> (12 - r)) & 1) as u8;
        }
    }
    interleave_196(&m)
}

/// Decode an interleaved 196-bit block into 96 payload bits.
///
/// Returns `None` when the product iteration cannot converge to clean rows
/// and columns.
pub fn decode_196(bits: &[u8; B196]) -> Option<[u8; 96]> {
    let mut m = deinterleave_196(bits);
    let mut clean = false;
    for _ in 0..5 {
        let mut changed = false;
        clean = true;
        for c in 0..COLS {
            let mut col = [0u8; 13];
            for r in 0..ROWS {
                col[r] = m[at(r, c)];
            }
            let mut word = bits_to_u32(&col);
            let before = word;
            if HAMMING_13_9.decode(&mut word) {
                if word != before {
                    changed = true;
                    let mut fixed = [0u8; 13];
                    u32_to_bits(word, &mut fixed);
                    for r in 0..ROWS {
                        m[at(r, c)] = fixed[r];
                    }
                }
            } else {
                clean = false;
            }
        }
        for r in 0..ROWS {
            let mut row = [0u8; 15];
            row.copy_from_slice(&m[at(r, 0)..=at(r, COLS - 1)]);
            let mut word = bits_to_u32(&row);
            let before = word;
            if HAMMING_15_11.decode(&mut word) {
                if word != before {
                    changed = true;
                    let mut fixed = [0u8; 15];
                    u32_to_bits(word, &mut fixed);
                    m[at(r, 0)..=at(r, COLS - 1)].copy_from_slice(&fixed);
                }
            } else {
                clean = false;
            }
        }
        if !changed {
            break;
        }
    }
    if !clean {
        return None;
    }
    let mut payload = [0u8; 96];
    let mut p = 0;
    for c in 3..11 {
        payload[p] = m[at(0, c)];
        p += 1;
    }
    for r in 1..9 {
        for c in 0..11 {
            payload[p] = m[at(r, c)];
            p += 1;
        }
    }
    Some(payload)
}

// =======================================================================
// BPTC(128,77) - embedded link control
// =======================================================================

use super::crc::checksum5;

/// Serialize the 8x16 embedded matrix column-major (on-air order).
pub fn serialize_128(m: &[u8; 128]) -> [u8; 128] {
    let mut out = [0u8; 128];
    let mut i = 0;
    for c in 0..16 {
        for r in 0..8 {
            out[i] = m[r * 16 + c];
            i += 1;
        }
    }
    out
}

/// Inverse of [`serialize_128`].
pub fn deserialize_128(bits: &[u8; 128]) -> [u8; 128] {
    let mut out = [0u8; 128];
    let mut i = 0;
    for c in 0..16 {
        for r in 0..8 {
            out[r * 16 + c] = bits[i];
            i += 1;
        }
    }
    out
}

/// Encode 72 LC bits into a column-major 128-bit embedded block.
pub fn encode_128(lc: &[u8; 72]) -> [u8; 128] {
    let mut lc_bytes = [0u8; 9];
    super::bits_to_bytes(lc, &mut lc_bytes);
    let cs = checksum5(&lc_bytes);

    // 77 info bits: 72 LC + 5 checksum, 11 per row across 7 rows
    let mut info = [0u8; 77];
    info[..72].copy_from_slice(lc);
    for i in 0..5 {
        info[72 + i] = (cs >> (4 - i)) & 1;
    }

    let mut m = [0u8; 128];
    for r in 0..7 {
        let word = bits_to_u32(&info[r * 11..r * 11 + 11]);
        let cw = HAMMING_16_11.encode(word);
        for c in 0..16 {
            m[r * 16 + c] = ((cw >> (15 - c)) & 1) as u8;
        }
    }
    // final row: column parity
    for c in 0..16 {
        let mut p = 0u8;
        for r in 0..7 {
            p ^= m[r * 16 + c];
        }
        m[7 * 16 + c] = p;
    }
    serialize_128(&m)
}

/// Decode a column-major embedded block into 72 LC bits.
///
/// A single flip anywhere (including the parity row) is repaired; checksum
/// failure after row correction reports `None`.
pub fn decode_128(bits: &[u8; 128]) -> Option<[u8; 72]> {
    let mut m = deserialize_128(bits);
    for r in 0..7 {
        let mut word = bits_to_u32(&m[r * 16..r * 16 + 16]);
        if !HAMMING_16_11.decode(&mut word) {
            return None;
        }
        let mut fixed = [0u8; 16];
        u32_to_bits(word, &mut fixed);
        m[r * 16..r * 16 + 16].copy_from_slice(&fixed);
    }
    let mut info = [0u8; 77];
    for r in 0..7 {
        for c in 0..11 {
            info[r * 11 + c] = m[r * 16 + c];
        }
    }
    let mut lc = [0u8; 72];
    lc.copy_from_slice(&info[..72]);
    let mut lc_bytes = [0u8; 9];
    super::bits_to_bytes(&lc, &mut lc_bytes);
    let mut cs = 0u8;
    for i in 0..5 {
        cs = (cs << 1) | info[72 + i];
    }
    if checksum5(&lc_bytes) != cs {
        return None;
    }
    Some(lc)
}

// =======================================================================
// BPTC(16,2) - reverse channel
// =======================================================================

/// Codeword table, pairwise distance >= 8.
const RC_CODEWORDS: [u16; 4] = [0x0000, 0x00FF, 0xFF00, 0xFFFF];

/// Encode a 2-bit reverse-channel value.
pub fn encode_16_2(value: u8) -> u16 {
    RC_CODEWORDS[usize::from(value & 3)]
}

/// Nearest-codeword decode; accepts up to 3 bit errors.
pub fn decode_16_2(cw: u16) -> Option<u8> {
    let mut best = (u32::MAX, 0u8);
    for (v, &c) in RC_CODEWORDS.iter().enumerate() {
        let d = (cw ^ c).count_ones();
        if d < best.0 {
            best = (d, v as u8);
        }
    }
    (best.0 <= 3).then_some(best.1)
}
