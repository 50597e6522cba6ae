// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DMR Tier III specifics: LCN arithmetic, C_MOVE and P_CLEAR handling.
//!
//! A Tier III grant carries a Logical Physical Channel Number whose LSB is
//! the timeslot; the carrier index is `lpcn >> 1` and the frequency is
//! `cc + carrier * step`. The step defaults to 125 kHz-aligned channel
//! spacing and can be forced with `DSD_NEO_DMR_T3_STEP_HZ`.
//!
//! C_MOVE instead names an Absolute PCN against an explicit channel plan
//! (integer MHz base, step in 125 Hz units, first APCN of the plan).

use super::sm::{GrantPolicy, ReleaseReason, SvcBits, TrunkSm};
use super::TrunkIdentity;
use crate::config::{EnvSwitches, RuntimeConfig};
use crate::io::TunerHook;
use crate::state::{Counters, DmrBurst, SlotCtx};
use crate::{debug, info};

/// Default LCN step in Hz when no override or plan applies.
pub const DEFAULT_STEP_HZ: u32 = 125_000;

/// Resolve a logical PCN relative to the control channel.
///
/// Returns `(freq_hz, slot)`.
pub fn lpcn_to_freq(env: &EnvSwitches, cc_freq: u64, lpcn: u16) -> (u64, usize) {
    let step = u64::from(env.dmr_t3_step_hz.unwrap_or(DEFAULT_STEP_HZ));
    let carrier = u64::from(lpcn >> 1);
    let slot = usize::from(lpcn & 1);
    (cc_freq + carrier * step, slot)
}

/// Explicit channel plan from a C_MOVE/announcement CSBK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPlan {
    /// RX base in integer MHz.
    pub rx_int_mhz: u32,
    /// Channel step in 125 Hz units.
    pub rx_step: u32,
    /// First absolute PCN covered by this plan.
    pub first_apcn: u16,
}

impl ChannelPlan {
    /// Resolve an absolute PCN; `None` when outside the plan.
    pub fn apcn_to_freq(&self, apcn: u16) -> Option<(u64, usize)> {
        let off = apcn.checked_sub(self.first_apcn)?;
        let carrier = u64::from(off >> 1);
        let slot = usize::from(off & 1);
        let step = u64::from(self.rx_step) * 125;
        Some((u64::from(self.rx_int_mhz) * 1_000_000 + carrier * step, slot))
    }
}

/// Handle a Tier III group grant (TV_GRANT / ahoy-answer path).
#[allow(clippy::too_many_arguments)]
pub fn group_grant(
    sm: &mut TrunkSm,
    identity: &mut TrunkIdentity,
    counters: &mut Counters,
    slots: &mut [SlotCtx; 2],
    tuner: &mut dyn TunerHook,
    policy: &GrantPolicy,
    env: &EnvSwitches,
    lpcn: u16,
    tg: u32,
    src: u32,
    svc: SvcBits,
    ted_sps: u32,
) -> bool {
    let (freq, slot) = lpcn_to_freq(env, identity.cc_freq, lpcn);
    sm.grant_resolved(
        identity, counters, slots, tuner, policy, freq, slot, tg, src, svc, ted_sps, "Group",
    )
}

/// Handle C_MOVE: shift the active call to another physical channel.
///
/// The destination slot goes voice-active, the opposite slot resets to
/// idle, and the voice channel pair transitions to the new frequency.
#[allow(clippy::too_many_arguments)]
pub fn c_move(
    sm: &mut TrunkSm,
    identity: &mut TrunkIdentity,
    counters: &mut Counters,
    slots: &mut [SlotCtx; 2],
    tuner: &mut dyn TunerHook,
    plan: &ChannelPlan,
    apcn: u16,
    dest_slot: usize,
    ted_sps: u32,
) -> bool {
    let Some((freq, _plan_slot)) = plan.apcn_to_freq(apcn) else {
        debug!("C_MOVE APCN {:#06X} outside channel plan", apcn);
        return false;
    };
    let dest = dest_slot.min(1);
    tuner.tune_to_freq(freq, ted_sps);
    identity.vc_freq[dest] = freq;
    identity.tuned = true;
    identity.on_cc = false;
    counters.tunes += 1;
    slots[1 - dest].burst = DmrBurst::IDLE;
    slots[dest].burst = DmrBurst::VOICE;
    sm.voice_sync(slots, dest);
    info!("C_MOVE: APCN {:#06X} -> {} Hz slot {}", apcn, freq, dest);
    true
}

/// Handle P_CLEAR: explicit call teardown, immediate return to the CC.
pub fn p_clear(
    sm: &mut TrunkSm,
    identity: &mut TrunkIdentity,
    counters: &mut Counters,
    slots: &mut [SlotCtx; 2],
    tuner: &mut dyn TunerHook,
    cfg: &RuntimeConfig,
) -> bool {
    sm.clear_voice_marks(slots);
    sm.release(identity, counters, slots, tuner, cfg, ReleaseReason::Clear)
}
