// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-call watchdog timers.
//!
//! A call without voice or signaling refreshes for longer than its timeout
//! is considered ended; the demod thread polls the watchdog once per batch
//! and finalizes the call (event record, WAV rotation) on expiry.

use std::time::{Duration, Instant};

/// Single-shot activity watchdog.
#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    last_feed: Option<Instant>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_feed: None,
        }
    }

    /// Record activity now; arms the watchdog if idle.
    pub fn feed(&mut self) {
        self.last_feed = Some(Instant::now());
    }

    /// True when armed and the timeout has elapsed since the last feed.
    pub fn expired(&self) -> bool {
        match self.last_feed {
            Some(t) => t.elapsed() >= self.timeout,
            None => false,
        }
    }

    /// Disarm (call finalized).
    pub fn clear(&mut self) {
        self.last_feed = None;
    }

    /// True while armed (a call is in progress).
    pub fn armed(&self) -> bool {
        self.last_feed.is_some()
    }
}
