// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UI-to-demod command queue.
//!
//! Bounded MPSC: any UI/control thread posts, the demod thread drains at a
//! single well-defined point per symbol batch. Order within a batch is
//! insertion order. A full queue rejects the command rather than blocking
//! the UI.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

/// Commands the UI may post to the demod thread.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    /// Set or clear the talkgroup hold.
    TgHold(u32),
    /// Toggle allow-list gating.
    UseAllowList(bool),
    /// Update a group entry (tg, name, mode).
    GroupUpdate(u32, String, String),
    /// Manual retune request in Hz.
    Retune(u64),
    /// Change manual audio gain (0 = AGC).
    AudioGain(f32),
    /// Change verbosity.
    Verbose(u8),
    /// Replace the runtime trunking tunables.
    SetRuntime(crate::config::RuntimeConfig),
}

/// Bounded MPSC command queue.
pub struct CommandQueue {
    tx: Sender<UiCommand>,
    rx: Receiver<UiCommand>,
}

impl CommandQueue {
    pub fn new(depth: usize) -> Self {
        let (tx, rx) = bounded(depth.max(1));
        Self { tx, rx }
    }

    /// A cloneable posting handle for UI threads.
    pub fn poster(&self) -> Sender<UiCommand> {
        self.tx.clone()
    }

    /// Post without blocking; false when the queue is full.
    pub fn post(&self, cmd: UiCommand) -> bool {
        !matches!(self.tx.try_send(cmd), Err(TrySendError::Full(_)))
    }

    /// Drain everything queued, in insertion order (demod thread only).
    pub fn drain(&self) -> Vec<UiCommand> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(cmd) => out.push(cmd),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let q = CommandQueue::new(8);
        q.post(UiCommand::TgHold(1));
        q.post(UiCommand::Verbose(2));
        q.post(UiCommand::TgHold(0));
        let drained = q.drain();
        assert_eq!(
            drained,
            vec![UiCommand::TgHold(1), UiCommand::Verbose(2), UiCommand::TgHold(0)]
        );
        assert!(q.drain().is_empty());
    }

    #[test]
    fn test_full_queue_rejects() {
        let q = CommandQueue::new(2);
        assert!(q.post(UiCommand::Verbose(0)));
        assert!(q.post(UiCommand::Verbose(1)));
        assert!(!q.post(UiCommand::Verbose(2)), "full queue must not block");
        assert_eq!(q.drain().len(), 2);
    }

    #[test]
    fn test_multi_producer() {
        let q = CommandQueue::new(64);
        let mut handles = Vec::new();
        for t in 0..4u8 {
            let tx = q.poster();
            handles.push(std::thread::spawn(move || {
                for i in 0..8 {
                    tx.send(UiCommand::Verbose(t * 8 + i)).expect("send");
                }
            }));
        }
        for h in handles {
            h.join().expect("join");
        }
        assert_eq!(q.drain().len(), 32);
    }
}
