// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! P25 trunking specifics.
//!
//! Grants from TSBK, MBT and Phase 2 MAC VPDUs all resolve through the
//! IDEN tables and feed the shared state machine identically; this module
//! holds the service-option decoding and the grant entry points the frame
//! handlers call.

use super::sm::{GrantPolicy, SvcBits, TrunkSm};
use super::TrunkIdentity;
use crate::io::TunerHook;
use crate::state::{Counters, Options, SlotCtx};

/// Decode a P25 service options octet.
///
/// Bit 7 emergency, bit 6 protected (encrypted), bit 4 packet (data).
pub fn svc_bits(octet: u8) -> SvcBits {
    SvcBits {
        emergency: octet & 0x80 != 0,
        encrypted: octet & 0x40 != 0,
        data: octet & 0x10 != 0,
    }
}

/// Grant policy from the options record.
pub fn policy_from_opts(opts: &Options) -> GrantPolicy {
    GrantPolicy {
        tune_data: opts.tune_data_calls,
        tune_enc: opts.tune_enc_calls,
    }
}

/// Group voice grant (TSBK 0x00, MAC A3/group paths, LCW 0x44).
#[allow(clippy::too_many_arguments)]
pub fn group_grant(
    sm: &mut TrunkSm,
    identity: &mut TrunkIdentity,
    counters: &mut Counters,
    slots: &mut [SlotCtx; 2],
    tuner: &mut dyn TunerHook,
    opts: &Options,
    channel: u16,
    tg: u32,
    src: u32,
    svc: u8,
) -> bool {
    if !opts.trunk_enable || !opts.p25_trunk {
        return false;
    }
    sm.group_grant(
        identity,
        counters,
        slots,
        tuner,
        &policy_from_opts(opts),
        channel,
        tg,
        src,
        svc_bits(svc),
        opts.samples_per_symbol,
    )
}

/// Unit-to-unit voice grant (TSBK 0x04, MAC UU 0x44).
#[allow(clippy::too_many_arguments)]
pub fn individual_grant(
    sm: &mut TrunkSm,
    identity: &mut TrunkIdentity,
    counters: &mut Counters,
    slots: &mut [SlotCtx; 2],
    tuner: &mut dyn TunerHook,
    opts: &Options,
    channel: u16,
    dst: u32,
    src: u32,
    svc: u8,
) -> bool {
    if !opts.trunk_enable || !opts.p25_trunk {
        return false;
    }
    sm.individual_grant(
        identity,
        counters,
        slots,
        tuner,
        &policy_from_opts(opts),
        channel,
        dst,
        src,
        svc_bits(svc),
        opts.samples_per_symbol,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::hooks::test_support::{CapturedTuner, TunerCall};
    use crate::trunk::iden::{IdenEntry, Trust};
    use crate::trunk::sm::TrunkFlavor;

    #[test]
    fn test_svc_octet_decode() {
        assert_eq!(svc_bits(0x00), SvcBits::default());
        assert!(svc_bits(0x80).emergency);
        assert!(svc_bits(0x40).encrypted);
        assert!(svc_bits(0x10).data);
    }

    #[test]
    fn test_mac_vpdu_grant_scenario() {
        // MAC opcode 0x44 with channel 0x100A against IDEN 1
        // (FDMA, base 170200000 x5, spac 100 x125) from CC 851.000000
        let mut sm = TrunkSm::new(TrunkFlavor::P25);
        let mut id = TrunkIdentity {
            cc_freq: 851_000_000,
            on_cc: true,
            ..TrunkIdentity::default()
        };
        id.seed_iden(
            1,
            IdenEntry {
                base: 170_200_000,
                spac: 100,
                tdma: false,
                slots: 1,
                trust: Trust::Confirmed,
                seeded: true,
                ..IdenEntry::default()
            },
        );
        let mut ctr = Counters::default();
        let mut slots = [SlotCtx::default(), SlotCtx::default()];
        let mut tuner = CapturedTuner::default();
        let opts = Options {
            trunk_enable: true,
            p25_trunk: true,
            ..Options::default()
        };
        assert!(individual_grant(
            &mut sm, &mut id, &mut ctr, &mut slots, &mut tuner, &opts, 0x100A, 1, 2, 0x00,
        ));
        assert_eq!(
            tuner.calls()[0],
            TunerCall::Freq(851_125_000, opts.samples_per_symbol)
        );
    }

    #[test]
    fn test_trunking_disabled_ignores_grant() {
        let mut sm = TrunkSm::new(TrunkFlavor::P25);
        let mut id = TrunkIdentity::default();
        let mut ctr = Counters::default();
        let mut slots = [SlotCtx::default(), SlotCtx::default()];
        let mut tuner = CapturedTuner::default();
        let opts = Options {
            trunk_enable: false,
            ..Options::default()
        };
        assert!(!group_grant(
            &mut sm, &mut id, &mut ctr, &mut slots, &mut tuner, &opts, 0x100A, 1001, 222, 0,
        ));
        assert!(tuner.calls().is_empty());
    }
}
