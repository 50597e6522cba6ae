// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Warm-start slicer calibration from the sync pattern itself.
//!
//! Outer-only sync patterns (every symbol +3 or -3) make the just-received
//! history bimodal: splitting it and averaging each mode gives trustworthy
//! `min`/`max` seeds, so the first frame after sync decodes with correct
//! thresholds instead of waiting for the rolling windows to fill.
//!
//! The feature ships behind the `DSD_NEO_SYNC_WARMSTART` environment
//! kill-switch for safe rollout.

use super::patterns::SyncPattern;
use super::slicer::SlicerCal;
use super::SymbolHistory;
use crate::config::EnvSwitches;

/// Sync lengths eligible for warm-start.
const ELIGIBLE_LENS: [usize; 5] = [8, 10, 12, 20, 24];

/// Warm-start outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmStart {
    /// Thresholds were seeded.
    Ok,
    /// Kill-switch disabled the feature.
    Disabled,
    /// Not enough symbol history behind the sync.
    NoHistory,
    /// The split produced a degenerate eye (modes collapsed).
    Degenerate,
    /// No calibration target.
    NullState,
}

/// True when every pattern symbol is an outer level (+3 or -3).
pub fn outer_only(pattern: &SyncPattern) -> bool {
    ELIGIBLE_LENS.contains(&pattern.dibits.len())
        && pattern.dibits.bytes().all(|b| b == b'1' || b == b'3')
}

/// Seed slicer thresholds from the last `sync_len` history symbols.
///
/// When the pattern carries both polarities the split is by sign (full
/// calibration); a single-polarity run can still seed the center by the
/// largest gap between sorted values.
pub fn warm_start(
    env: &EnvSwitches,
    cal: Option<&mut SlicerCal>,
    history: &SymbolHistory,
    pattern: &SyncPattern,
) -> WarmStart {
    if !env.sync_warmstart {
        return WarmStart::Disabled;
    }
    let cal = match cal {
        Some(c) => c,
        None => return WarmStart::NullState,
    };
    if !outer_only(pattern) {
        return WarmStart::Degenerate;
    }
    let sync_len = pattern.dibits.len();
    let tail = history.last_n(sync_len);
    if tail.len() < sync_len {
        return WarmStart::NoHistory;
    }

    let has_pos = pattern.dibits.bytes().any(|b| b == b'1');
    let has_neg = pattern.dibits.bytes().any(|b| b == b'3');

    let (lo_mean, hi_mean) = if has_pos && has_neg {
        // full calibration: split by sign
        let (mut lo_sum, mut lo_n, mut hi_sum, mut hi_n) = (0.0f32, 0u32, 0.0f32, 0u32);
        for &v in &tail {
            if v < 0.0 {
                lo_sum += v;
                lo_n += 1;
            } else {
                hi_sum += v;
                hi_n += 1;
            }
        }
        if lo_n == 0 || hi_n == 0 {
            return WarmStart::Degenerate;
        }
        (lo_sum / lo_n as f32, hi_sum / hi_n as f32)
    } else {
        // center-only: split at the largest gap of the sorted values
        let mut sorted = tail.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mut split = 0;
        let mut best_gap = 0.0f32;
        for i in 1..sorted.len() {
            let gap = sorted[i] - sorted[i - 1];
            if gap > best_gap {
                best_gap = gap;
                split = i;
            }
        }
        if split == 0 {
            return WarmStart::Degenerate;
        }
        let lo = &sorted[..split];
        let hi = &sorted[split..];
        (
            lo.iter().sum::<f32>() / lo.len() as f32,
            hi.iter().sum::<f32>() / hi.len() as f32,
        )
    };

    if hi_mean - lo_mean < f32::EPSILON {
        return WarmStart::Degenerate;
    }

    cal.min = lo_mean;
    cal.max = hi_mean;
    cal.center = (lo_mean + hi_mean) / 2.0;
    cal.umid = cal.center + 0.625 * (cal.max - cal.center);
    cal.lmid = cal.center + 0.625 * (cal.min - cal.center);
    cal.minref = 0.80 * cal.min;
    cal.maxref = 0.80 * cal.max;
    cal.minbuf.clear();
    cal.maxbuf.clear();
    // pre-fill so the first rolling updates cannot yank the eye around
    for _ in 0..cal.msize.min(16) {
        cal.minbuf.push_back(lo_mean);
        cal.maxbuf.push_back(hi_mean);
    }
    WarmStart::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::patterns::{SyncType, PATTERNS};

    fn pattern(t: SyncType) -> &'static SyncPattern {
        PATTERNS.iter().find(|p| p.synctype == t).expect("tabled")
    }

    fn env() -> EnvSwitches {
        EnvSwitches::all_enabled()
    }

    #[test]
    fn test_outer_only_classification() {
        assert!(outer_only(pattern(SyncType::DmrBsVoice)));
        assert!(outer_only(pattern(SyncType::M17Lsf)));
        assert!(!outer_only(pattern(SyncType::Ysf)), "YSF has inner symbols");
        assert!(!outer_only(pattern(SyncType::NxdnFsw)));
    }

    #[test]
    fn test_seeds_thresholds_from_bimodal_history() {
        let pat = pattern(SyncType::DmrBsVoice); // 24 outer symbols
        let mut hist = SymbolHistory::with_capacity(64);
        for b in pat.dibits.bytes() {
            hist.push(if b == b'1' { 2.8 } else { -3.2 });
        }
        let mut cal = SlicerCal::new(32);
        let r = warm_start(&env(), Some(&mut cal), &hist, pat);
        assert_eq!(r, WarmStart::Ok);
        assert!((cal.max - 2.8).abs() < 1e-5);
        assert!((cal.min - -3.2).abs() < 1e-5);
        assert!((cal.center - -0.2).abs() < 1e-5);
        assert!((cal.minref - 0.8 * -3.2).abs() < 1e-5);
        assert!((cal.maxref - 0.8 * 2.8).abs() < 1e-5);
        assert!(cal.calibrated());
        assert!(!cal.minbuf.is_empty() && !cal.maxbuf.is_empty());
    }

    #[test]
    fn test_kill_switch() {
        let pat = pattern(SyncType::DmrBsVoice);
        let mut hist = SymbolHistory::with_capacity(64);
        for _ in 0..24 {
            hist.push(3.0);
        }
        let mut cal = SlicerCal::new(32);
        let off = EnvSwitches {
            sync_warmstart: false,
            ..EnvSwitches::all_enabled()
        };
        assert_eq!(
            warm_start(&off, Some(&mut cal), &hist, pat),
            WarmStart::Disabled
        );
    }

    #[test]
    fn test_no_history() {
        let pat = pattern(SyncType::DmrBsVoice);
        let hist = SymbolHistory::with_capacity(64);
        let mut cal = SlicerCal::new(32);
        assert_eq!(
            warm_start(&env(), Some(&mut cal), &hist, pat),
            WarmStart::NoHistory
        );
    }

    #[test]
    fn test_null_state() {
        let pat = pattern(SyncType::DmrBsVoice);
        let hist = SymbolHistory::with_capacity(64);
        assert_eq!(warm_start(&env(), None, &hist, pat), WarmStart::NullState);
    }

    #[test]
    fn test_degenerate_when_single_mode() {
        // all-positive samples against a mixed-polarity pattern
        let pat = pattern(SyncType::DmrBsVoice);
        let mut hist = SymbolHistory::with_capacity(64);
        for _ in 0..24 {
            hist.push(3.0);
        }
        let mut cal = SlicerCal::new(32);
        assert_eq!(
            warm_start(&env(), Some(&mut cal), &hist, pat),
            WarmStart::Degenerate
        );
    }
}
