// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol frame handlers and the central dispatcher.
//!
//! Each protocol implements [`FrameHandler`]: `matches` claims synctypes,
//! `handle_frame` runs the protocol state machine from the current bit
//! offset until a terminal event (voice frame emitted, signaling block
//! decoded, or frame drop). The dispatcher scans a static ordered handler
//! table and falls back to P25 Phase 1 when nothing matches, preserving
//! the historical behavior for unlabeled C4FM.
//!
//! Handlers pull symbols through [`DibitFeed`], so the same code runs
//! against the live slicer or a test vector.

pub mod dmr;
pub mod dstar;
pub mod m17;
pub mod nxdn;
pub mod p25;
pub mod ysf;

use crate::config::EnvSwitches;
use crate::io::{TunerHook, Vocoder};
use crate::state::{DecoderState, Options};
use crate::sync::{SlicedSymbol, SyncType};
use crate::trunk::TrunkSm;

/// Pull-based symbol source for frame handlers.
pub trait DibitFeed {
    /// Next sliced symbol; `None` at end of input.
    fn next_symbol(&mut self) -> Option<SlicedSymbol>;

    /// Convenience: next dibit value, 0 when the stream ends.
    fn next_dibit(&mut self) -> u8 {
        self.next_symbol().map(|s| s.dibit).unwrap_or(0)
    }

    /// Read `n` dibits with reliabilities into parallel vectors.
    fn read_dibits(&mut self, n: usize) -> (Vec<u8>, Vec<u8>) {
        let mut dibits = Vec::with_capacity(n);
        let mut rel = Vec::with_capacity(n);
        for _ in 0..n {
            match self.next_symbol() {
                Some(s) => {
                    dibits.push(s.dibit);
                    rel.push(s.reliability);
                }
                None => break,
            }
        }
        (dibits, rel)
    }
}

/// A vector-backed feed for tests and capture replay.
pub struct VecFeed {
    symbols: Vec<SlicedSymbol>,
    pos: usize,
}

impl VecFeed {
    pub fn from_dibits(dibits: &[u8]) -> Self {
        Self {
            symbols: dibits
                .iter()
                .map(|&d| SlicedSymbol {
                    dibit: d & 3,
                    reliability: 255,
                    soft: 0.0,
                    analog: 0.0,
                })
                .collect(),
            pos: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.symbols.len() - self.pos
    }
}

impl DibitFeed for VecFeed {
    fn next_symbol(&mut self) -> Option<SlicedSymbol> {
        let s = self.symbols.get(self.pos).copied();
        if s.is_some() {
            self.pos += 1;
        }
        s
    }
}

/// Everything a frame handler may touch, split-borrowed from the demod
/// thread's owned state.
pub struct FrameCtx<'a> {
    pub opts: &'a mut Options,
    pub state: &'a mut DecoderState,
    pub sm: &'a mut TrunkSm,
    pub tuner: &'a mut dyn TunerHook,
    pub env: &'a EnvSwitches,
    /// Black-box MBE decoder; `None` runs signaling-only (no audio).
    pub vocoder: Option<&'a mut dyn Vocoder>,
}

/// Terminal event of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Voice frame(s) pushed toward the audio path.
    Voice,
    /// Signaling decoded (trunking/control).
    Signaling,
    /// Frame unusable; counters updated, stream continues.
    Drop,
}

/// Per-protocol frame state machine.
pub trait FrameHandler: Send {
    fn matches(&self, synctype: SyncType) -> bool;
    fn handle_frame(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome;
}

/// Static ordered dispatcher.
pub struct Dispatcher {
    handlers: Vec<Box<dyn FrameHandler>>,
    /// Fallback handler index (P25 Phase 1).
    fallback: usize,
}

impl Dispatcher {
    pub fn new() -> Self {
        let handlers: Vec<Box<dyn FrameHandler>> = vec![
            Box::new(dmr::DmrHandler::new()),
            Box::new(p25::p2::P25p2Handler::new()),
            Box::new(nxdn::NxdnHandler::new()),
            Box::new(nxdn::DpmrHandler::new()),
            Box::new(dstar::DstarHandler::new()),
            Box::new(ysf::YsfHandler::new()),
            Box::new(ysf::ProVoiceHandler::new()),
            Box::new(m17::M17Handler::new()),
            Box::new(p25::p1::P25p1Handler::new()),
        ];
        let fallback = handlers.len() - 1;
        Self { handlers, fallback }
    }

    /// Route one synced frame. Preamble/dotting syncs are hints only and
    /// never commit to a handler.
    pub fn dispatch(
        &mut self,
        ctx: &mut FrameCtx<'_>,
        synctype: SyncType,
        feed: &mut dyn DibitFeed,
    ) -> FrameOutcome {
        if synctype.is_preamble() {
            return FrameOutcome::Drop;
        }
        for h in self.handlers.iter_mut() {
            if h.matches(synctype) {
                return h.handle_frame(ctx, synctype, feed);
            }
        }
        // historical fallback: treat unknown C4FM as P25 Phase 1
        self.handlers[self.fallback].handle_frame(ctx, synctype, feed)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::io::NullTuner;
    use crate::trunk::{TrunkFlavor, TrunkSm};

    /// Bundle for handler tests; split-borrows into a FrameCtx.
    pub struct CtxBundle {
        pub opts: Options,
        pub state: DecoderState,
        pub sm: TrunkSm,
        pub tuner: NullTuner,
        pub env: EnvSwitches,
    }

    impl CtxBundle {
        pub fn new() -> Self {
            Self {
                opts: Options::default(),
                state: DecoderState::new(),
                sm: TrunkSm::new(TrunkFlavor::P25),
                tuner: NullTuner,
                env: EnvSwitches::all_enabled(),
            }
        }

        pub fn ctx(&mut self) -> FrameCtx<'_> {
            FrameCtx {
                opts: &mut self.opts,
                state: &mut self.state,
                sm: &mut self.sm,
                tuner: &mut self.tuner,
                env: &self.env,
                vocoder: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::CtxBundle;
    use super::*;

    #[test]
    fn test_preamble_never_commits() {
        let mut d = Dispatcher::new();
        let mut b = CtxBundle::new();
        let mut feed = VecFeed::from_dibits(&[0; 64]);
        let out = d.dispatch(&mut b.ctx(), SyncType::NxdnPreamble, &mut feed);
        assert_eq!(out, FrameOutcome::Drop);
        assert_eq!(feed.remaining(), 64, "no symbols consumed on a hint");
    }

    #[test]
    fn test_every_frame_sync_has_a_claimant() {
        // every tabled non-preamble sync must be claimed by a dedicated
        // handler; nothing real may ride the fallback
        let d = Dispatcher::new();
        for p in crate::sync::PATTERNS {
            if p.synctype.is_preamble() {
                continue;
            }
            assert!(
                d.handlers.iter().any(|h| h.matches(p.synctype)),
                "{:?} has no claiming handler",
                p.synctype
            );
        }
    }

    #[test]
    fn test_edacs_dispatches_to_provoice_not_p25() {
        let mut d = Dispatcher::new();
        let mut b = CtxBundle::new();
        let mut feed = VecFeed::from_dibits(&[1; 200]);
        let out = d.dispatch(&mut b.ctx(), SyncType::Edacs, &mut feed);
        assert_eq!(out, FrameOutcome::Voice);
        assert_eq!(b.state.counters.p1_total_bits, 0, "no P25 NID was read");
    }

    #[test]
    fn test_unclaimed_sync_falls_back_to_p25p1() {
        // the historical fallback still exists for a table with gaps: a
        // dispatcher carrying only the P25p1 handler routes anything
        // unclaimed through it
        let mut d = Dispatcher {
            handlers: vec![Box::new(p25::p1::P25p1Handler::new())],
            fallback: 0,
        };
        let mut b = CtxBundle::new();
        let mut feed = VecFeed::from_dibits(&[0; 400]);
        let before = b.state.counters.p1_total_bits;
        let _ = d.dispatch(&mut b.ctx(), SyncType::Ysf, &mut feed);
        assert!(
            b.state.counters.p1_total_bits > before,
            "fallback consumed a P25p1 NID"
        );
    }
}
