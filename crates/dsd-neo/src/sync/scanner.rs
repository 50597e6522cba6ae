// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sliding sync pattern scanner.
//!
//! Keeps a ring of recent dibits and, after every new symbol, compares the
//! tail against every tabled pattern in both polarities. For CQPSK slicing
//! the four dibit remaps (inversion, bit swap, XOR, 90° rotation) are also
//! tried and the best-case distance wins. The first pattern within its
//! error budget latches `(synctype, bit_offset, modulation)`.

use super::patterns::{SyncPattern, SyncType, PATTERNS};
use super::Modulation;

/// Dibit remap applied before comparison (CQPSK constellation slips).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DibitRemap {
    Direct,
    /// Polarity inversion: sign flip, `d ^ 2`.
    Invert,
    /// Bit swap within the dibit: `0,1,2,3 -> 0,2,1,3`.
    Swap,
    /// XOR of the low bit: `d ^ 1`.
    XorLow,
    /// 90° constellation rotation: `+1 -> +3 -> -1 -> -3 -> +1`.
    Rotate90,
}

impl DibitRemap {
    #[inline]
    pub fn apply(self, d: u8) -> u8 {
        match self {
            DibitRemap::Direct => d,
            DibitRemap::Invert => d ^ 2,
            DibitRemap::Swap => match d {
                1 => 2,
                2 => 1,
                other => other,
            },
            DibitRemap::XorLow => d ^ 1,
            DibitRemap::Rotate90 => match d {
                0 => 1,
                1 => 2,
                2 => 3,
                _ => 0,
            },
        }
    }
}

const CQPSK_REMAPS: [DibitRemap; 5] = [
    DibitRemap::Direct,
    DibitRemap::Invert,
    DibitRemap::Swap,
    DibitRemap::XorLow,
    DibitRemap::Rotate90,
];

/// A latched sync match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncMatch {
    pub synctype: SyncType,
    /// Bit offset into the symbol stream where the sync pattern ends.
    pub bit_offset: u64,
    pub modulation: Modulation,
    /// Dibit mismatches of the winning comparison.
    pub errs: u8,
    /// Remap that produced the match.
    pub remap: DibitRemap,
}

/// Sliding-window scanner over the recent dibit stream.
pub struct SyncScanner {
    ring: Vec<u8>,
    head: usize,
    count: usize,
    /// Dibits consumed so far (for bit offsets).
    total: u64,
    /// Try the CQPSK remap set in addition to direct/inverted.
    cqpsk: bool,
    /// History of recent synctypes for modulation auto-detect.
    pub recent: Vec<SyncType>,
}

/// Longest tabled pattern, sized at startup.
fn max_pattern_len() -> usize {
    PATTERNS.iter().map(|p| p.dibits.len()).max().unwrap_or(0)
}

impl SyncScanner {
    pub fn new(cqpsk: bool) -> Self {
        Self {
            ring: vec![0; max_pattern_len()],
            head: 0,
            count: 0,
            total: 0,
            cqpsk,
            recent: Vec::new(),
        }
    }

    pub fn set_cqpsk(&mut self, on: bool) {
        self.cqpsk = on;
    }

    /// Push one dibit and scan. Returns a match when a pattern latches.
    pub fn push(&mut self, dibit: u8) -> Option<SyncMatch> {
        let cap = self.ring.len();
        self.ring[self.head] = dibit & 3;
        self.head = (self.head + 1) % cap;
        if self.count < cap {
            self.count += 1;
        }
        self.total += 1;
        self.scan()
    }

    /// Tail dibit at distance `back` from the most recent (0 = newest).
    #[inline]
    fn tail(&self, back: usize) -> u8 {
        let cap = self.ring.len();
        self.ring[(self.head + cap - 1 - back) % cap]
    }

    fn distance(&self, pattern: &SyncPattern, remap: DibitRemap) -> u8 {
        let pat = pattern.dibits.as_bytes();
        let n = pat.len();
        let mut errs = 0u8;
        for i in 0..n {
            let want = pat[n - 1 - i] - b'0';
            let got = remap.apply(self.tail(i));
            if want != got {
                errs = errs.saturating_add(1);
            }
        }
        errs
    }

    /// Direct polarity is preferred across the whole table before any remap
    /// is considered: the DMR voice and data sync words are exact dibit
    /// complements, so an inverted voice sync is indistinguishable from a
    /// direct data sync and must resolve to the direct identity.
    fn scan(&mut self) -> Option<SyncMatch> {
        let remaps: &[DibitRemap] = if self.cqpsk {
            &CQPSK_REMAPS
        } else {
            &[DibitRemap::Direct, DibitRemap::Invert]
        };
        for &remap in remaps {
            for pattern in PATTERNS {
                if self.count < pattern.dibits.len() {
                    continue;
                }
                let errs = self.distance(pattern, remap);
                if errs <= pattern.max_errs {
                    let synctype = if remap == DibitRemap::Invert {
                        pattern.synctype.inverted_variant()
                    } else {
                        pattern.synctype
                    };
                    self.recent.push(synctype);
                    if self.recent.len() > 16 {
                        self.recent.remove(0);
                    }
                    return Some(SyncMatch {
                        synctype,
                        bit_offset: self.total * 2,
                        modulation: pattern.modulation,
                        errs,
                        remap,
                    });
                }
            }
        }
        None
    }

    /// Forget the dibit window (retune).
    pub fn clear(&mut self) {
        self.head = 0;
        self.count = 0;
        self.recent.clear();
    }
}
