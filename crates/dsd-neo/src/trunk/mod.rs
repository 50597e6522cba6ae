// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Trunking state machines.
//!
//! DMR Tier III and P25 share one state machine core: grants resolve a
//! channel to a frequency, policy and trust gates decide whether to tune,
//! voice sync refreshes the hang timer, and release/tick return to the
//! control channel only when every slot is quiet and the hangtime has
//! elapsed. All retune side effects go through the installed
//! [`crate::io::TunerHook`], so the machines run identically against a real
//! tuner or a capturing test double.

pub mod cc_cache;
pub mod dmr_t3;
pub mod iden;
pub mod p25;
pub mod sm;

pub use cc_cache::CcCandidates;
pub use iden::{ChannelError, IdenEntry, Site, TrunkIdentity, Trust};
pub use sm::{GrantPolicy, ReleaseReason, SvcBits, TrunkFlavor, TrunkSm, TrunkState};
