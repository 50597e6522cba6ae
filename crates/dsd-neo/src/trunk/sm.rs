// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The trunking state machine core shared by DMR Tier III and P25.
//!
//! ```text
//!            *_grant (policy+trust pass)
//!   ON_CC ------------------------------------> TUNED
//!     ^                                           |
//!     |   release/tick (slots idle, hangtime up)  |
//!     +----------------- RELEASING <--------------+
//! ```
//!
//! Policy refusals (svc bits, trust, bad channel math) never mutate state;
//! they bump a diagnostic counter and emit one log line. Deferral reasons
//! are printed with the deferring condition so a stuck channel can be
//! diagnosed from the log alone.

use super::iden::{ChannelError, TrunkIdentity, Trust};
use crate::audio::jitter::Frame;
use crate::config::{EnvSwitches, RuntimeConfig, FRAME_SAMPLES, SYMBOL_RATE};
use crate::io::TunerHook;
use crate::state::{Counters, SlotCtx};
use crate::sync::Modulation;
use crate::{debug, info, warn};
use std::time::Instant;

/// SM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrunkState {
    OnCc,
    Tuned,
    Releasing,
}

/// Which protocol the SM is following.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrunkFlavor {
    DmrTier3,
    P25,
}

/// Service option bits carried by a grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SvcBits {
    pub data: bool,
    pub encrypted: bool,
    pub emergency: bool,
}

/// Tune policy derived from the options record.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantPolicy {
    pub tune_data: bool,
    pub tune_enc: bool,
}

/// Why a release was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    /// Explicit protocol teardown (P_CLEAR, MAC_END).
    Clear,
    /// Call end inferred from terminators.
    CallEnd,
    /// Hangtime expiry from the tick.
    Hangtime,
    /// Operator/forced.
    Forced,
}

impl ReleaseReason {
    fn as_str(self) -> &'static str {
        match self {
            ReleaseReason::Clear => "clear",
            ReleaseReason::CallEnd => "call-end",
            ReleaseReason::Hangtime => "hangtime",
            ReleaseReason::Forced => "forced",
        }
    }
}

/// Trunk-following state machine.
pub struct TrunkSm {
    pub flavor: TrunkFlavor,
    state: TrunkState,
    tune_time: Option<Instant>,
    last_voice: Option<Instant>,
    /// P25p2 MAC activity hold stamp.
    mac_time: Option<Instant>,
    /// Audio frames rescued from the jitter rings by a P25 release; the
    /// runtime drains these to the audio path on its next pump.
    flushed: Vec<(usize, Frame)>,
}

impl TrunkSm {
    pub fn new(flavor: TrunkFlavor) -> Self {
        Self {
            flavor,
            state: TrunkState::OnCc,
            tune_time: None,
            last_voice: None,
            mac_time: None,
            flushed: Vec::new(),
        }
    }

    /// Take the audio frames rescued by the last P25 release, oldest first.
    pub fn take_flushed(&mut self) -> Vec<(usize, Frame)> {
        std::mem::take(&mut self.flushed)
    }

    pub fn state(&self) -> TrunkState {
        self.state
    }

    /// Handle a group voice grant.
    ///
    /// Returns true when a tune happened. Refusals (bad channel math,
    /// untrusted IDEN off-CC, policy-blocked svc bits) leave all state
    /// untouched and do not increment the tune counter.
    #[allow(clippy::too_many_arguments)]
    pub fn group_grant(
        &mut self,
        identity: &mut TrunkIdentity,
        counters: &mut Counters,
        slots: &mut [SlotCtx; 2],
        tuner: &mut dyn TunerHook,
        policy: &GrantPolicy,
        channel: u16,
        tg: u32,
        src: u32,
        svc: SvcBits,
        ted_sps: u32,
    ) -> bool {
        self.grant(
            identity, counters, slots, tuner, policy, channel, tg, src, svc, ted_sps, "Group",
        )
    }

    /// Handle an individual (unit-to-unit) voice grant.
    #[allow(clippy::too_many_arguments)]
    pub fn individual_grant(
        &mut self,
        identity: &mut TrunkIdentity,
        counters: &mut Counters,
        slots: &mut [SlotCtx; 2],
        tuner: &mut dyn TunerHook,
        policy: &GrantPolicy,
        channel: u16,
        dst: u32,
        src: u32,
        svc: SvcBits,
        ted_sps: u32,
    ) -> bool {
        self.grant(
            identity, counters, slots, tuner, policy, channel, dst, src, svc, ted_sps,
            "Private",
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn grant(
        &mut self,
        identity: &mut TrunkIdentity,
        counters: &mut Counters,
        slots: &mut [SlotCtx; 2],
        tuner: &mut dyn TunerHook,
        policy: &GrantPolicy,
        channel: u16,
        target: u32,
        src: u32,
        svc: SvcBits,
        ted_sps: u32,
        kind: &str,
    ) -> bool {
        let (freq, slot) = match identity.channel_to_freq(channel) {
            Ok(v) => v,
            Err(e @ ChannelError::IdenNotSeeded(_)) | Err(e @ ChannelError::BadProduct(_)) => {
                warn!("{}", e);
                return false;
            }
        };

        if !identity.on_cc && identity.channel_trust(channel) < Trust::Confirmed {
            counters.policy_refusals += 1;
            warn!(
                "{} Grant ch {:#06X} refused: unconfirmed IDEN while off control channel",
                kind, channel
            );
            return false;
        }
        self.grant_resolved(
            identity, counters, slots, tuner, policy, freq, slot, target, src, svc, ted_sps,
            kind,
        )
    }

    /// Grant with the frequency already resolved (DMR Tier III LCN math
    /// happens outside the IDEN tables). Policy checks still apply; trust
    /// is the caller's responsibility.
    #[allow(clippy::too_many_arguments)]
    pub fn grant_resolved(
        &mut self,
        identity: &mut TrunkIdentity,
        counters: &mut Counters,
        slots: &mut [SlotCtx; 2],
        tuner: &mut dyn TunerHook,
        policy: &GrantPolicy,
        freq: u64,
        slot: usize,
        target: u32,
        src: u32,
        svc: SvcBits,
        ted_sps: u32,
        kind: &str,
    ) -> bool {
        if svc.data && !policy.tune_data {
            counters.policy_refusals += 1;
            warn!("{} Grant TG {} blocked by data svc policy", kind, target);
            return false;
        }
        if svc.encrypted && !policy.tune_enc {
            counters.policy_refusals += 1;
            warn!("{} Grant TG {} blocked by encryption svc policy", kind, target);
            return false;
        }
        let slot = slot.min(1);

        for s in slots.iter_mut() {
            s.reset_assembly();
        }
        slots[slot].tg = target;
        slots[slot].src = src;

        tuner.tune_to_freq(freq, ted_sps);
        identity.vc_freq[slot] = freq;
        identity.tuned = true;
        identity.on_cc = false;
        counters.tunes += 1;
        self.tune_time = Some(Instant::now());
        self.last_voice = None;
        self.mac_time = None;
        self.state = TrunkState::Tuned;
        info!(
            "{} Grant: {} Hz TG {} SRC {} slot {}",
            kind, freq, target, src, slot
        );
        true
    }

    /// Voice sync observed on `slot`: refresh the hang timer.
    pub fn voice_sync(&mut self, slots: &mut [SlotCtx; 2], slot: usize) {
        if slot < 2 {
            slots[slot].mark_voice();
            self.last_voice = Some(Instant::now());
        }
    }

    /// P25p2 MAC activity (PTT/ACTIVE): hold the channel briefly.
    pub fn mac_activity(&mut self) {
        self.mac_time = Some(Instant::now());
    }

    /// Request a release. Returns true when the SM actually returned to the
    /// control channel; deferred releases keep the state at `Tuned` and log
    /// the deferring condition.
    pub fn release(
        &mut self,
        identity: &mut TrunkIdentity,
        counters: &mut Counters,
        slots: &mut [SlotCtx; 2],
        tuner: &mut dyn TunerHook,
        cfg: &RuntimeConfig,
        reason: ReleaseReason,
    ) -> bool {
        if self.state != TrunkState::Tuned {
            return false;
        }
        if let Some(active) = slots.iter().position(|s| s.voice_active()) {
            debug!(
                "release ({}) deferred: slot-active (slot {})",
                reason.as_str(),
                active
            );
            return false;
        }
        if let Some(lv) = self.last_voice {
            if lv.elapsed().as_secs_f64() < cfg.hangtime_s {
                debug!("release ({}) deferred: hangtime", reason.as_str());
                return false;
            }
        }
        if let Some(mt) = self.mac_time {
            if mt.elapsed().as_secs_f64() < cfg.mac_hold_s {
                debug!("release ({}) deferred: mac-hold", reason.as_str());
                return false;
            }
        }
        if slots.iter().any(|s| !s.jitter.is_empty()) {
            // queued audio still draining; the ring hold keeps the tail of
            // the call intact (the audio thread empties it within ring_hold)
            if let Some(t) = self.tune_time {
                if t.elapsed().as_secs_f64() < cfg.ring_hold_s {
                    debug!("release ({}) deferred: ring-hold", reason.as_str());
                    return false;
                }
            }
        }

        self.state = TrunkState::Releasing;
        if self.flavor == TrunkFlavor::P25 {
            // best-effort flush: rescue any partial superframe audio still
            // queued in the jitter rings before leaving the voice channel,
            // so the call tail is played instead of discarded
            let mut frame = [0.0f32; FRAME_SAMPLES];
            for (slot, s) in slots.iter_mut().enumerate() {
                while s.jitter.pop(&mut frame) {
                    self.flushed.push((slot, frame));
                }
            }
            // restore CC demod defaults; DMR never applies these overrides
            tuner.set_modulation(Modulation::C4fm);
            tuner.set_symbol_rate(SYMBOL_RATE);
        }
        tuner.return_to_cc();
        identity.vc_freq = [0, 0];
        identity.tuned = false;
        identity.on_cc = true;
        for s in slots.iter_mut() {
            s.reset_assembly();
        }
        counters.releases += 1;
        self.tune_time = None;
        self.last_voice = None;
        self.mac_time = None;
        self.state = TrunkState::OnCc;
        info!("return to CC ({})", reason.as_str());
        true
    }

    /// Neighbor broadcast: fold candidate CC frequencies into the ring and
    /// persist when the cache is enabled.
    pub fn neighbor_update(
        &mut self,
        identity: &mut TrunkIdentity,
        counters: &mut Counters,
        env: &EnvSwitches,
        freqs: &[u64],
    ) {
        let mut changed = false;
        for &hz in freqs {
            if identity.cc_candidates.add(hz, identity.cc_freq) {
                counters.neighbors_added += 1;
                changed = true;
            }
        }
        if changed && env.cc_cache {
            let name = match self.flavor {
                TrunkFlavor::P25 => super::cc_cache::p25_cache_name(
                    identity.site.wacn,
                    identity.site.sysid,
                    (identity.site.rfss != 0)
                        .then_some((identity.site.rfss, identity.site.site)),
                ),
                TrunkFlavor::DmrTier3 => {
                    super::cc_cache::dmr_cache_name(identity.site.sysid as u16)
                }
            };
            if let Err(e) =
                super::cc_cache::persist(env, &name, identity.cc_freq, &identity.cc_candidates)
            {
                debug!("cc cache skip: {}", e);
            }
        }
    }

    /// Take the next CC candidate for hunting (CC lost).
    pub fn hunt_next(
        &mut self,
        identity: &mut TrunkIdentity,
        counters: &mut Counters,
    ) -> Option<u64> {
        let hz = identity.cc_candidates.take_next()?;
        counters.neighbors_used += 1;
        Some(hz)
    }

    /// Periodic tick: release when tuned, idle and the hang/grace windows
    /// have elapsed. Reads the runtime config snapshot once.
    pub fn tick(
        &mut self,
        identity: &mut TrunkIdentity,
        counters: &mut Counters,
        slots: &mut [SlotCtx; 2],
        tuner: &mut dyn TunerHook,
        cfg: &RuntimeConfig,
    ) {
        if self.state != TrunkState::Tuned {
            return;
        }
        if slots.iter().any(|s| s.voice_active()) {
            return;
        }
        // VC grace: never bounce straight back off a fresh tune
        if let Some(t) = self.tune_time {
            if t.elapsed().as_secs_f64() < cfg.vc_grace_s {
                return;
            }
        }
        let quiet = match self.last_voice {
            Some(lv) => lv.elapsed().as_secs_f64() > cfg.hangtime_s,
            // never saw voice: the grace window above already elapsed
            None => true,
        };
        if quiet {
            self.release(identity, counters, slots, tuner, cfg, ReleaseReason::Hangtime);
        }
    }

    /// Explicit teardown support: clear voice marks so a protocol-initiated
    /// release is not deferred by its own just-ended call.
    pub fn clear_voice_marks(&mut self, slots: &mut [SlotCtx; 2]) {
        for s in slots.iter_mut() {
            s.burst = crate::state::DmrBurst::IDLE;
        }
        self.last_voice = None;
        self.mac_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::hooks::test_support::{CapturedTuner, TunerCall};
    use crate::trunk::iden::IdenEntry;

    fn fixture() -> (TrunkSm, TrunkIdentity, Counters, [SlotCtx; 2], CapturedTuner) {
        let mut identity = TrunkIdentity {
            cc_freq: 851_000_000,
            on_cc: true,
            ..TrunkIdentity::default()
        };
        identity.seed_iden(
            1,
            IdenEntry {
                base: 170_200_000,
                spac: 100,
                trust: Trust::Confirmed,
                seeded: true,
                slots: 1,
                ..IdenEntry::default()
            },
        );
        (
            TrunkSm::new(TrunkFlavor::P25),
            identity,
            Counters::default(),
            [SlotCtx::default(), SlotCtx::default()],
            CapturedTuner::default(),
        )
    }

    fn cfg() -> RuntimeConfig {
        RuntimeConfig {
            hangtime_s: 0.0,
            vc_grace_s: 0.0,
            mac_hold_s: 0.0,
            ring_hold_s: 0.0,
            cc_grace_s: 0.0,
        }
    }

    #[test]
    fn test_grant_tunes_exactly_once() {
        let (mut sm, mut id, mut ctr, mut slots, mut tuner) = fixture();
        let ok = sm.group_grant(
            &mut id,
            &mut ctr,
            &mut slots,
            &mut tuner,
            &GrantPolicy::default(),
            0x100A,
            1001,
            222,
            SvcBits::default(),
            10,
        );
        assert!(ok);
        assert_eq!(tuner.calls(), vec![TunerCall::Freq(851_125_000, 10)]);
        assert_eq!(id.vc_freq[0], 851_125_000);
        assert!(id.tuned);
        assert_eq!(ctr.tunes, 1);
        assert_eq!(sm.state(), TrunkState::Tuned);
        assert_eq!(slots[0].tg, 1001);
    }

    #[test]
    fn test_untrusted_iden_off_cc_refused() {
        let (mut sm, mut id, mut ctr, mut slots, mut tuner) = fixture();
        id.on_cc = false;
        id.iden[1].trust = Trust::Learned;
        let ok = sm.group_grant(
            &mut id,
            &mut ctr,
            &mut slots,
            &mut tuner,
            &GrantPolicy::default(),
            0x100A,
            1001,
            222,
            SvcBits::default(),
            10,
        );
        assert!(!ok);
        assert!(tuner.calls().is_empty(), "no tuner call on refusal");
        assert_eq!(ctr.tunes, 0);
        assert_eq!(ctr.policy_refusals, 1);
        assert_eq!(sm.state(), TrunkState::OnCc);
    }

    #[test]
    fn test_untrusted_iden_on_cc_allowed() {
        let (mut sm, mut id, mut ctr, mut slots, mut tuner) = fixture();
        id.iden[1].trust = Trust::Learned; // still on CC: recoverable
        assert!(sm.group_grant(
            &mut id,
            &mut ctr,
            &mut slots,
            &mut tuner,
            &GrantPolicy::default(),
            0x100A,
            1001,
            222,
            SvcBits::default(),
            10,
        ));
    }

    #[test]
    fn test_svc_policy_blocks() {
        let (mut sm, mut id, mut ctr, mut slots, mut tuner) = fixture();
        let svc = SvcBits {
            encrypted: true,
            ..SvcBits::default()
        };
        assert!(!sm.group_grant(
            &mut id,
            &mut ctr,
            &mut slots,
            &mut tuner,
            &GrantPolicy::default(),
            0x100A,
            1001,
            222,
            svc,
            10,
        ));
        assert_eq!(ctr.policy_refusals, 1);
        // with the policy opened, the same grant tunes
        let policy = GrantPolicy {
            tune_enc: true,
            tune_data: false,
        };
        assert!(sm.group_grant(
            &mut id, &mut ctr, &mut slots, &mut tuner, &policy, 0x100A, 1001, 222, svc, 10,
        ));
    }

    #[test]
    fn test_release_deferred_by_voice_then_released() {
        let (mut sm, mut id, mut ctr, mut slots, mut tuner) = fixture();
        sm.group_grant(
            &mut id,
            &mut ctr,
            &mut slots,
            &mut tuner,
            &GrantPolicy::default(),
            0x100A,
            1001,
            222,
            SvcBits::default(),
            10,
        );
        sm.voice_sync(&mut slots, 0);
        assert!(!sm.release(&mut id, &mut ctr, &mut slots, &mut tuner, &cfg(), ReleaseReason::CallEnd));
        assert_eq!(tuner.count_returns(), 0);
        assert_eq!(sm.state(), TrunkState::Tuned);

        // voice ends, hangtime zero: release goes through exactly once
        sm.clear_voice_marks(&mut slots);
        assert!(sm.release(&mut id, &mut ctr, &mut slots, &mut tuner, &cfg(), ReleaseReason::Clear));
        assert_eq!(tuner.count_returns(), 1);
        assert_eq!(id.vc_freq, [0, 0]);
        assert!(!id.tuned && id.on_cc);
        assert_eq!(ctr.releases, 1);
        // a second release is a no-op
        assert!(!sm.release(&mut id, &mut ctr, &mut slots, &mut tuner, &cfg(), ReleaseReason::Clear));
        assert_eq!(tuner.count_returns(), 1);
    }

    #[test]
    fn test_release_deferred_by_hangtime() {
        let (mut sm, mut id, mut ctr, mut slots, mut tuner) = fixture();
        sm.group_grant(
            &mut id,
            &mut ctr,
            &mut slots,
            &mut tuner,
            &GrantPolicy::default(),
            0x100A,
            1001,
            222,
            SvcBits::default(),
            10,
        );
        sm.voice_sync(&mut slots, 0);
        slots[0].burst = crate::state::DmrBurst::IDLE; // voice flag gone...
        let long = RuntimeConfig {
            hangtime_s: 3600.0,
            ..cfg()
        };
        // ...but hangtime since last voice has not elapsed
        assert!(!sm.release(&mut id, &mut ctr, &mut slots, &mut tuner, &long, ReleaseReason::CallEnd));
        assert_eq!(sm.state(), TrunkState::Tuned);
    }

    #[test]
    fn test_p25_release_flushes_partial_superframe_audio() {
        let (mut sm, mut id, mut ctr, mut slots, mut tuner) = fixture();
        sm.group_grant(
            &mut id,
            &mut ctr,
            &mut slots,
            &mut tuner,
            &GrantPolicy::default(),
            0x100A,
            1001,
            222,
            SvcBits::default(),
            10,
        );
        // a partial superframe is still queued on both slots when the
        // release arrives
        slots[0].jitter.push(&[0.25; FRAME_SAMPLES]);
        slots[1].jitter.push(&[0.5; FRAME_SAMPLES]);
        assert!(sm.release(&mut id, &mut ctr, &mut slots, &mut tuner, &cfg(), ReleaseReason::CallEnd));
        assert_eq!(tuner.count_returns(), 1);

        // the queued audio was rescued, slot 0 first, instead of being
        // discarded by the post-release assembly reset
        let flushed = sm.take_flushed();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].0, 0);
        assert_eq!(flushed[0].1[0], 0.25);
        assert_eq!(flushed[1].0, 1);
        assert_eq!(flushed[1].1[0], 0.5);
        assert!(slots.iter().all(|s| s.jitter.is_empty()));
        // take drains the staging buffer
        assert!(sm.take_flushed().is_empty());
    }

    #[test]
    fn test_dmr_release_does_not_stage_flush() {
        let (_, mut id, mut ctr, mut slots, mut tuner) = fixture();
        let mut sm = TrunkSm::new(TrunkFlavor::DmrTier3);
        sm.group_grant(
            &mut id,
            &mut ctr,
            &mut slots,
            &mut tuner,
            &GrantPolicy::default(),
            0x100A,
            1001,
            222,
            SvcBits::default(),
            10,
        );
        slots[0].jitter.push(&[0.75; FRAME_SAMPLES]);
        assert!(sm.release(&mut id, &mut ctr, &mut slots, &mut tuner, &cfg(), ReleaseReason::Clear));
        assert!(sm.take_flushed().is_empty(), "flush is a P25-only path");
    }

    #[test]
    fn test_tick_releases_after_quiet() {
        let (mut sm, mut id, mut ctr, mut slots, mut tuner) = fixture();
        sm.group_grant(
            &mut id,
            &mut ctr,
            &mut slots,
            &mut tuner,
            &GrantPolicy::default(),
            0x100A,
            1001,
            222,
            SvcBits::default(),
            10,
        );
        sm.tick(&mut id, &mut ctr, &mut slots, &mut tuner, &cfg());
        assert_eq!(sm.state(), TrunkState::OnCc);
        assert_eq!(tuner.count_returns(), 1);
    }

    #[test]
    fn test_dmr_flavor_never_applies_p25_overrides() {
        let (_, mut id, mut ctr, mut slots, mut tuner) = fixture();
        let mut sm = TrunkSm::new(TrunkFlavor::DmrTier3);
        id.on_cc = true;
        sm.group_grant(
            &mut id,
            &mut ctr,
            &mut slots,
            &mut tuner,
            &GrantPolicy::default(),
            0x100A,
            1001,
            222,
            SvcBits::default(),
            10,
        );
        assert!(sm.release(&mut id, &mut ctr, &mut slots, &mut tuner, &cfg(), ReleaseReason::Clear));
        let calls = tuner.calls();
        assert_eq!(
            calls
                .iter()
                .filter(|c| matches!(c, TunerCall::Return))
                .count(),
            1
        );
        assert!(
            !calls
                .iter()
                .any(|c| matches!(c, TunerCall::Modulation | TunerCall::SymbolRate(_))),
            "DMR release must not apply P25-only overrides: {:?}",
            calls
        );
    }

    #[test]
    fn test_neighbor_update_dedup_and_counters() {
        let (mut sm, mut id, mut ctr, _slots, _tuner) = fixture();
        let env = EnvSwitches {
            cc_cache: false,
            ..EnvSwitches::all_enabled()
        };
        sm.neighbor_update(
            &mut id,
            &mut ctr,
            &env,
            &[852_000_000, 0, 851_000_000, 852_000_000, 853_000_000],
        );
        // zero, the current CC and the duplicate are all rejected
        assert_eq!(ctr.neighbors_added, 2);
        assert_eq!(id.cc_candidates.len(), 2);
        assert_eq!(sm.hunt_next(&mut id, &mut ctr), Some(852_000_000));
        assert_eq!(ctr.neighbors_used, 1);
    }
}
