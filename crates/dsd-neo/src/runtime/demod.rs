// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The demod thread: symbol batches through sync to frame dispatch.
//!
//! One [`Decoder`] owns the decoder state, options, trunking SM and the
//! protocol dispatcher. Each batch:
//!
//! 1. drain UI commands (insertion order, single well-defined point)
//! 2. run the symbol stream: slicer -> history -> sync scan
//! 3. on sync: warm-start thresholds when eligible, dispatch the handler
//! 4. tick the trunking SM against the runtime-config snapshot
//! 5. publish a whole-state snapshot for the UI thread
//!
//! The symbol-capture path feeds dibits straight into the same flow,
//! bypassing the DSP front-end entirely.

use crate::config::{runtime, EnvSwitches};
use crate::io::{CommandQueue, MetricsHook, TunerHook, UiCommand, Vocoder};
use crate::proto::{DibitFeed, Dispatcher, FrameCtx};
use crate::state::{DecoderState, DmrBurst, Options};
use crate::sync::{warm_start, SlicedSymbol, SyncScanner, WarmStart, PATTERNS};
use crate::telemetry::{EventRecord, SnapshotHub, StateSnapshot, Watchdog};
use crate::trunk::{TrunkFlavor, TrunkSm};
use crate::{debug, info};
use std::collections::VecDeque;
use std::time::Duration;

/// Capability hooks installed at startup.
pub struct DecoderHooks {
    pub tuner: Box<dyn TunerHook>,
    pub vocoder: Option<Box<dyn Vocoder>>,
    pub snapshots: std::sync::Arc<SnapshotHub>,
    /// Optional signal-quality readout consumer.
    pub metrics: Option<Box<dyn MetricsHook>>,
}

/// Voice inactivity before a call is force-finalized.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Coerces away the `'static` bound `Box<dyn Vocoder>` carries by default so
/// the reference can be stored in a `FrameCtx<'a>` with a shorter `'a`.
fn shrink_vocoder_lifetime<'a>(v: &'a mut (dyn Vocoder + 'static)) -> &'a mut (dyn Vocoder + 'a) {
    v
}

/// Queue-backed feed draining symbols buffered by the batch loop.
struct QueueFeed<'a> {
    queue: &'a mut VecDeque<SlicedSymbol>,
}

impl DibitFeed for QueueFeed<'_> {
    fn next_symbol(&mut self) -> Option<SlicedSymbol> {
        self.queue.pop_front()
    }
}

/// The demod-thread decoder.
pub struct Decoder {
    pub opts: Options,
    pub state: DecoderState,
    pub(crate) sm: TrunkSm,
    scanner: SyncScanner,
    dispatcher: Dispatcher,
    hooks: DecoderHooks,
    env: EnvSwitches,
    commands: CommandQueue,
    /// Symbols sliced but not yet claimed by a frame handler.
    pending: VecDeque<SlicedSymbol>,
    /// Sync waiting for its frame body to accumulate.
    armed: Option<crate::sync::SyncMatch>,
    /// Per-slot call activity watchdogs.
    call_watchdogs: [Watchdog; 2],
}

impl Decoder {
    pub fn new(opts: Options, env: EnvSwitches, hooks: DecoderHooks) -> Self {
        let flavor = if opts.p25_trunk {
            TrunkFlavor::P25
        } else {
            TrunkFlavor::DmrTier3
        };
        Self {
            scanner: SyncScanner::new(false),
            dispatcher: Dispatcher::new(),
            sm: TrunkSm::new(flavor),
            commands: CommandQueue::default(),
            pending: VecDeque::new(),
            armed: None,
            call_watchdogs: [Watchdog::new(CALL_TIMEOUT), Watchdog::new(CALL_TIMEOUT)],
            opts,
            state: DecoderState::new(),
            hooks,
            env,
        }
    }

    /// Posting handle for UI threads.
    pub fn command_poster(&self) -> crossbeam_channel::Sender<UiCommand> {
        self.commands.poster()
    }

    /// Audio frames rescued by a P25 release flush, oldest first. The
    /// audio pump drains these ahead of the jitter rings so the tail of a
    /// released call still reaches the backend.
    pub fn take_flushed_audio(&mut self) -> Vec<(usize, crate::audio::jitter::Frame)> {
        self.sm.take_flushed()
    }

    /// Feed one batch of symbol-rate values (post-DSP or capture floats).
    pub fn process_symbols(&mut self, values: &[f32]) {
        self.drain_commands();
        for &v in values {
            let sym = self.state.reader.read(v);
            self.state.history.push(v);
            self.push_symbol(sym);
        }
        self.finish_batch();
    }

    /// Feed one batch of raw IQ bytes through the DSP front-end.
    pub fn process_iq(&mut self, chain: &mut crate::dsp::DspChain, bytes: &[u8]) {
        let mut symbols = Vec::new();
        chain.process_iq(bytes, &mut symbols);
        self.process_symbols(&symbols);
    }

    /// Feed one batch of capture dibits (bypasses the slicer thresholds).
    pub fn process_dibits(&mut self, dibits: &[u8]) {
        self.drain_commands();
        for &d in dibits {
            let sym = SlicedSymbol {
                dibit: d & 3,
                reliability: 255,
                soft: 0.0,
                analog: 0.0,
            };
            // keep the history fed so warm-start still sees sync symbols
            let level = match d & 3 {
                0 => 1.0,
                1 => 3.0,
                2 => -1.0,
                _ => -3.0,
            };
            self.state.history.push(level);
            self.push_symbol(sym);
        }
        self.finish_batch();
    }

    /// Dibits a handler pulls for one frame body of the given sync.
    ///
    /// Once synced, the body is consumed without re-scanning (a frame
    /// payload may coincidentally contain a sync-shaped run); scanning
    /// resumes after dispatch.
    fn body_len(synctype: crate::sync::SyncType) -> usize {
        use crate::sync::Protocol::*;
        match synctype.protocol() {
            Dmr => 108,
            P25Phase1 => 520,
            P25Phase2 => 200,
            DStar => {
                if synctype == crate::sync::SyncType::DstarHd {
                    334
                } else {
                    48
                }
            }
            M17 => 120,
            Nxdn => 130,
            Dpmr => 72,
            Ysf => 220,
            ProVoice | Edacs => 144,
        }
    }

    fn push_symbol(&mut self, sym: SlicedSymbol) {
        if let Some(m) = self.armed {
            self.pending.push_back(sym);
            if self.pending.len() >= Self::body_len(m.synctype) {
                self.dispatch_armed();
            }
            return;
        }
        if let Some(m) = self.scanner.push(sym.dibit) {
            if !m.synctype.is_preamble() {
                self.on_sync(m);
            }
        }
    }

    fn on_sync(&mut self, m: crate::sync::SyncMatch) {
        self.state.sync.last = Some(m);
        self.state.sync.modulation = Some(m.modulation);

        if !self.state.sync.ever_synced {
            self.state.sync.ever_synced = true;
            info!("sync acquired: {:?} ({:?})", m.synctype, m.modulation);
        }

        // warm-start the slicer from the sync symbols themselves
        if let Some(pattern) = PATTERNS.iter().find(|p| p.synctype == m.synctype) {
            match warm_start(
                &self.env,
                Some(&mut self.state.reader.cal),
                &self.state.history,
                pattern,
            ) {
                WarmStart::Ok => debug!("slicer warm-started from {:?}", m.synctype),
                WarmStart::Disabled | WarmStart::Degenerate | WarmStart::NoHistory
                | WarmStart::NullState => {}
            }
        }

        self.pending.clear();
        self.armed = Some(m);
    }

    /// Run the handler over the buffered frame body.
    fn dispatch_armed(&mut self) {
        let Some(m) = self.armed.take() else {
            return;
        };
        let mut feed = QueueFeed {
            queue: &mut self.pending,
        };
        let mut ctx = FrameCtx {
            opts: &mut self.opts,
            state: &mut self.state,
            sm: &mut self.sm,
            tuner: self.hooks.tuner.as_mut(),
            env: &self.env,
            vocoder: self
                .hooks
                .vocoder
                .as_mut()
                .map(|v| shrink_vocoder_lifetime(&mut **v)),
        };
        let _ = self.dispatcher.dispatch(&mut ctx, m.synctype, &mut feed);
        self.pending.clear();
    }

    fn drain_commands(&mut self) {
        for cmd in self.commands.drain() {
            match cmd {
                UiCommand::TgHold(tg) => self.opts.tg_hold = tg,
                UiCommand::UseAllowList(on) => self.opts.use_allow_list = on,
                UiCommand::GroupUpdate(tg, name, mode) => {
                    if !self.opts.upsert_group(tg, &name, &mode) {
                        debug!("group table full; update for TG {} dropped", tg);
                    }
                }
                UiCommand::Retune(hz) => {
                    self.hooks
                        .tuner
                        .tune_to_freq(hz, self.opts.samples_per_symbol);
                    self.state.on_retune();
                    self.scanner.clear();
                }
                UiCommand::AudioGain(g) => self.opts.audio_gain = g,
                UiCommand::Verbose(v) => self.opts.verbose = v,
                UiCommand::SetRuntime(cfg) => crate::config::set_runtime(cfg),
            }
        }
    }

    fn finish_batch(&mut self) {
        if self.armed.is_some() {
            self.dispatch_armed();
        }
        self.run_watchdogs();
        let cfg = runtime();
        self.sm.tick(
            &mut self.state.trunk,
            &mut self.state.counters,
            &mut self.state.slots,
            self.hooks.tuner.as_mut(),
            &cfg,
        );
        if let Some(m) = self.hooks.metrics.as_mut() {
            m.ber(self.state.counters.p1_ber());
        }
        self.publish();
    }

    /// Finalize calls whose voice stopped without a terminator.
    fn run_watchdogs(&mut self) {
        for slot in 0..2 {
            let active = self.state.slots[slot].voice_active();
            let idle = self.state.slots[slot].burst == DmrBurst::IDLE;
            let wd = &mut self.call_watchdogs[slot];
            if active {
                wd.feed();
            } else if idle {
                // a handler already finalized the call normally
                wd.clear();
            }
            if wd.armed() && wd.expired() {
                wd.clear();
                let s = &mut self.state.slots[slot];
                s.burst = DmrBurst::IDLE;
                self.state.events[slot].push(EventRecord {
                    proto: "UNK",
                    target: s.tg,
                    source: s.src,
                    cc_freq: self.state.trunk.cc_freq,
                    flags: "CLEAR".into(),
                    tx: "TX END".into(),
                    ..EventRecord::default()
                });
                debug!("call watchdog expired on slot {}", slot);
            }
        }
    }

    fn publish(&mut self) {
        let snap = StateSnapshot {
            epoch: 0,
            events: [
                self.state.events[0].items().to_vec(),
                self.state.events[1].items().to_vec(),
            ],
            slot_tg: [self.state.slots[0].tg, self.state.slots[1].tg],
            slot_voice: [
                self.state.slots[0].voice_active(),
                self.state.slots[1].voice_active(),
            ],
            cc_freq: self.state.trunk.cc_freq,
            vc_freq: self.state.trunk.vc_freq,
            tunes: self.state.counters.tunes,
            releases: self.state.counters.releases,
            p1_ber: self.state.counters.p1_ber(),
        };
        self.hooks.snapshots.publish(snap);
        self.hooks.snapshots.request_redraw();
    }
}
