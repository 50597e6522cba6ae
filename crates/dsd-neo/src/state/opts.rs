// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoder options.
//!
//! Read-mostly configuration owned by the demod thread alongside the state.
//! CLI/UI changes arrive as commands and are folded in at the per-batch
//! command drain point, never concurrently.

/// Group list entry: a talkgroup with its display name and mode string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub tg: u32,
    pub name: String,
    /// Mode string: "A" allow, "B" block, "DE" digital-encrypted lockout.
    pub mode: String,
}

/// Maximum group table entries; talker-alias updates must respect this.
pub const GROUP_CAPACITY: usize = 512;

/// Speed unit for LRRP reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    Kph,
    Mph,
}

/// Decoder options record.
#[derive(Debug, Clone)]
pub struct Options {
    /// Verbosity: 0 quiet, 1 call lifecycle, 2+ frame detail.
    pub verbose: u8,
    /// Expected polarity is inverted.
    pub inverted: bool,
    /// Nominal samples per symbol (typically 5 or 10).
    pub samples_per_symbol: u32,
    /// Trunk following master switch.
    pub trunk_enable: bool,
    /// P25 trunking (as opposed to DMR Tier III).
    pub p25_trunk: bool,
    /// Tune grants whose service options indicate a data call.
    pub tune_data_calls: bool,
    /// Tune grants whose service options indicate an encrypted call.
    pub tune_enc_calls: bool,
    /// Allow-list semantics for the group list (false = block-list).
    pub use_allow_list: bool,
    /// Group gating table.
    pub groups: Vec<GroupEntry>,
    /// Number of live group entries (capacity-guarded updates).
    pub group_tally: usize,
    /// Active talkgroup hold: force-unmute this TG, mute the other slot.
    pub tg_hold: u32,
    /// Manual audio gain (0 = AGC).
    pub audio_gain: f32,
    /// Output audio rate in Hz.
    pub audio_rate: u32,
    /// Per-call WAV output directory (None = disabled).
    pub call_wav_dir: Option<std::path::PathBuf>,
    /// LRRP speed unit.
    pub speed_unit: SpeedUnit,
    /// LRRP output file path (None = disabled).
    pub lrrp_file: Option<std::path::PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            verbose: 1,
            inverted: false,
            samples_per_symbol: crate::config::SAMPLES_PER_SYMBOL,
            trunk_enable: false,
            p25_trunk: true,
            tune_data_calls: false,
            tune_enc_calls: false,
            use_allow_list: false,
            groups: Vec::new(),
            group_tally: 0,
            tg_hold: 0,
            audio_gain: 0.0,
            audio_rate: crate::config::AUDIO_RATE,
            call_wav_dir: None,
            speed_unit: SpeedUnit::Kph,
            lrrp_file: None,
        }
    }
}

impl Options {
    /// Look up a group entry by talkgroup.
    pub fn group(&self, tg: u32) -> Option<&GroupEntry> {
        self.groups[..self.group_tally.min(self.groups.len())]
            .iter()
            .find(|g| g.tg == tg)
    }

    /// Insert or update a group entry, refusing growth beyond capacity.
    ///
    /// Returns false (and changes nothing) when the table is full and `tg`
    /// is not already present.
    pub fn upsert_group(&mut self, tg: u32, name: &str, mode: &str) -> bool {
        let live = self.group_tally.min(self.groups.len());
        if let Some(g) = self.groups[..live].iter_mut().find(|g| g.tg == tg) {
            g.name = name.to_string();
            g.mode = mode.to_string();
            return true;
        }
        if live >= GROUP_CAPACITY {
            return false;
        }
        self.groups.push(GroupEntry {
            tg,
            name: name.to_string(),
            mode: mode.to_string(),
        });
        self.group_tally = live + 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_updates_in_place() {
        let mut o = Options::default();
        assert!(o.upsert_group(1001, "OPS 1", "A"));
        assert!(o.upsert_group(1001, "OPS ONE", "A"));
        assert_eq!(o.group_tally, 1);
        assert_eq!(o.group(1001).map(|g| g.name.as_str()), Some("OPS ONE"));
    }

    #[test]
    fn test_capacity_guard() {
        let mut o = Options::default();
        for tg in 0..GROUP_CAPACITY as u32 {
            assert!(o.upsert_group(tg, "G", "A"));
        }
        let tally = o.group_tally;
        // a new group must be refused without touching existing entries
        assert!(!o.upsert_group(999_999, "LATE", "A"));
        assert_eq!(o.group_tally, tally);
        assert_eq!(o.group(0).map(|g| g.name.as_str()), Some("G"));
        // an update to an existing entry still works at capacity
        assert!(o.upsert_group(3, "RENAMED", "A"));
    }
}
