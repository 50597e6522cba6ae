// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event history and snapshot publishing.
//!
//! The demod thread appends records to per-slot rings it owns exclusively.
//! UI readers never touch the rings; they load the last published
//! [`StateSnapshot`], which copies the record arrays in whole, so a reader
//! can never observe a torn element mid-update.

use super::event::EventRecord;
use crate::config::EVENT_HISTORY_LEN;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Bounded ring of event records, newest last.
#[derive(Debug, Clone, Default)]
pub struct EventHistory {
    items: Vec<EventRecord>,
}

impl EventHistory {
    /// Append, discarding the oldest beyond capacity.
    pub fn push(&mut self, rec: EventRecord) {
        if self.items.len() == EVENT_HISTORY_LEN {
            self.items.remove(0);
        }
        self.items.push(rec);
    }

    pub fn items(&self) -> &[EventRecord] {
        &self.items
    }

    pub fn latest(&self) -> Option<&EventRecord> {
        self.items.last()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Read-mostly snapshot of decoder state for the UI thread.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    /// Monotonic publish sequence.
    pub epoch: u64,
    /// Per-slot event history copies.
    pub events: [Vec<EventRecord>; 2],
    /// Per-slot current talkgroup.
    pub slot_tg: [u32; 2],
    /// Per-slot voice-active flags.
    pub slot_voice: [bool; 2],
    /// Control channel frequency.
    pub cc_freq: u64,
    /// Tuned voice channel frequencies.
    pub vc_freq: [u64; 2],
    /// Tune/release counters.
    pub tunes: u64,
    pub releases: u64,
    /// P25p1 BER estimate.
    pub p1_ber: f64,
}

/// Publish/subscribe hub for state snapshots.
///
/// `publish` swaps in a complete new snapshot; `load` on the UI side gets a
/// consistent Arc. `request_redraw` just bumps a counter the UI can poll.
pub struct SnapshotHub {
    snap: ArcSwap<StateSnapshot>,
    epoch: AtomicU64,
    redraws: AtomicU64,
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self {
            snap: ArcSwap::from_pointee(StateSnapshot::default()),
            epoch: AtomicU64::new(0),
            redraws: AtomicU64::new(0),
        }
    }

    /// Publish a whole snapshot (demod thread only).
    pub fn publish(&self, mut snapshot: StateSnapshot) {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        snapshot.epoch = epoch;
        self.snap.store(Arc::new(snapshot));
    }

    /// Load the latest snapshot (any thread).
    pub fn load(&self) -> Arc<StateSnapshot> {
        self.snap.load_full()
    }

    /// Ask the UI to repaint.
    pub fn request_redraw(&self) {
        self.redraws.fetch_add(1, Ordering::Release);
    }

    /// Redraw counter for UI polling.
    pub fn redraws(&self) -> u64 {
        self.redraws.load(Ordering::Acquire)
    }
}

impl Default for SnapshotHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_bounded() {
        let mut h = EventHistory::default();
        for i in 0..(EVENT_HISTORY_LEN + 10) as u32 {
            h.push(EventRecord {
                target: i,
                ..EventRecord::default()
            });
        }
        assert_eq!(h.items().len(), EVENT_HISTORY_LEN);
        assert_eq!(h.latest().map(|r| r.target), Some(EVENT_HISTORY_LEN as u32 + 9));
        assert_eq!(h.items()[0].target, 10, "oldest records dropped");
    }

    #[test]
    fn test_snapshot_epoch_advances() {
        let hub = SnapshotHub::new();
        hub.publish(StateSnapshot::default());
        let a = hub.load();
        hub.publish(StateSnapshot::default());
        let b = hub.load();
        assert!(b.epoch > a.epoch);
    }

    #[test]
    fn test_snapshot_is_stable_after_publish() {
        let hub = SnapshotHub::new();
        let mut snap = StateSnapshot {
            slot_tg: [1001, 0],
            ..StateSnapshot::default()
        };
        snap.events[0].push(EventRecord::default());
        hub.publish(snap);
        let held = hub.load();
        // a later publish must not mutate what the reader already holds
        hub.publish(StateSnapshot::default());
        assert_eq!(held.slot_tg[0], 1001);
        assert_eq!(held.events[0].len(), 1);
    }

    #[test]
    fn test_redraw_counter() {
        let hub = SnapshotHub::new();
        assert_eq!(hub.redraws(), 0);
        hub.request_redraw();
        hub.request_redraw();
        assert_eq!(hub.redraws(), 2);
    }
}
