// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Talkgroup gating.
//!
//! Decides per slot whether decoded audio may reach the mixer. Inputs:
//! allow-list/block-list mode, explicit per-group mode strings ("DE" is a
//! hard digital-encrypted lockout), and the active TG hold, which
//! force-unmutes the held talkgroup and mutes the opposite slot.

use crate::state::Options;

/// Gate outcome with the reason, for the one-line diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Open,
    MutedByList,
    MutedByMode,
    MutedByHold,
}

impl GateVerdict {
    pub fn open(self) -> bool {
        self == GateVerdict::Open
    }
}

/// Group gate for `tg` heard on `slot`.
pub fn gate_decision(opts: &Options, tg: u32, slot: usize) -> GateVerdict {
    // TG hold dominates everything: the held group is forced open on its
    // slot and every other slot is muted.
    if opts.tg_hold != 0 {
        if tg == opts.tg_hold {
            return GateVerdict::Open;
        }
        return GateVerdict::MutedByHold;
    }

    if let Some(entry) = opts.group(tg) {
        match entry.mode.as_str() {
            // digital-encrypted lockout is a mute regardless of list mode
            "DE" => GateVerdict::MutedByMode,
            "B" => GateVerdict::MutedByList,
            _ => GateVerdict::Open,
        }
    } else if opts.use_allow_list {
        // allow-list semantics: unknown groups stay muted
        GateVerdict::MutedByList
    } else {
        let _ = slot;
        GateVerdict::Open
    }
}
