// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control-channel candidate ring with on-disk persistence.
//!
//! Neighbor broadcasts feed a bounded FIFO of candidate CC frequencies used
//! when the current control channel disappears. The ring never holds
//! duplicates or the current CC. When enabled by `DSD_NEO_CC_CACHE` the
//! candidates persist across runs, keyed by system identity:
//!
//! - P25: `p25_cc_<WACN5hex>_<SYSID3hex>[_R<rfss3d>_S<site3d>].txt`
//! - DMR: `dmr_cc_<SYSCODE4hex>.txt`
//!
//! File format: UTF-8 text, one decimal Hz per line. Cache root resolution
//! lives in [`crate::config::cache_root`].

use crate::config::{cache_root, EnvSwitches, CC_CANDIDATES_MAX};
use std::io::Write;
use std::path::PathBuf;

/// Bounded FIFO of candidate CC frequencies.
#[derive(Debug, Default, Clone)]
pub struct CcCandidates {
    items: Vec<u64>,
}

impl CcCandidates {
    /// Add a candidate; rejects zero, `current_cc`, and duplicates.
    /// Rolls over FIFO-style at capacity. Returns true when added.
    pub fn add(&mut self, hz: u64, current_cc: u64) -> bool {
        if hz == 0 || hz == current_cc || self.items.contains(&hz) {
            return false;
        }
        if self.items.len() == CC_CANDIDATES_MAX {
            self.items.remove(0);
        }
        self.items.push(hz);
        true
    }

    /// Pop the oldest candidate for a hunt attempt.
    pub fn take_next(&mut self) -> Option<u64> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn items(&self) -> &[u64] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cache file name for a P25 system identity.
pub fn p25_cache_name(wacn: u32, sysid: u32, rfss_site: Option<(u8, u8)>) -> String {
    match rfss_site {
        Some((rfss, site)) => format!(
            "p25_cc_{:05X}_{:03X}_R{:03}_S{:03}.txt",
            wacn, sysid, rfss, site
        ),
        None => format!("p25_cc_{:05X}_{:03X}.txt", wacn, sysid),
    }
}

/// Cache file name for a DMR system code.
pub fn dmr_cache_name(syscode: u16) -> String {
    format!("dmr_cc_{:04X}.txt", syscode)
}

/// Persist the candidates (plus the current CC first) to the cache file.
///
/// Failures degrade gracefully: the cache is skipped and reported, never
/// fatal.
pub fn persist(
    env: &EnvSwitches,
    name: &str,
    current_cc: u64,
    candidates: &CcCandidates,
) -> crate::Result<PathBuf> {
    if !env.cc_cache {
        return Err(crate::Error::CacheFailed("disabled by DSD_NEO_CC_CACHE".into()));
    }
    let root = cache_root(env);
    std::fs::create_dir_all(&root)
        .map_err(|e| crate::Error::CacheFailed(format!("{}: {}", root.display(), e)))?;
    let path = root.join(name);
    let mut f = std::fs::File::create(&path)
        .map_err(|e| crate::Error::CacheFailed(format!("{}: {}", path.display(), e)))?;
    if current_cc != 0 {
        writeln!(f, "{}", current_cc).map_err(|e| crate::Error::CacheFailed(e.to_string()))?;
    }
    for hz in candidates.items() {
        writeln!(f, "{}", hz).map_err(|e| crate::Error::CacheFailed(e.to_string()))?;
    }
    Ok(path)
}

/// Load cached candidates; unreadable files yield an empty set.
pub fn load(env: &EnvSwitches, name: &str) -> CcCandidates {
    let mut out = CcCandidates::default();
    if !env.cc_cache {
        return out;
    }
    let path = cache_root(env).join(name);
    let Ok(text) = std::fs::read_to_string(path) else {
        return out;
    };
    for line in text.lines() {
        if let Ok(hz) = line.trim().parse::<u64>() {
            out.add(hz, 0);
        }
    }
    out
}
