// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-producer single-consumer input ring.
//!
//! The capture thread pushes raw sample bytes; the demod thread pops. The
//! data path is lock-free (atomic head/tail, power-of-two capacity); a
//! mutex guards only the wake condition. The producer never blocks: when
//! the ring is full it drops the chunk and counts it. The consumer blocks
//! on a 10 ms timed wait and re-checks the process exit flag on wake.

use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Consumer wake timeout.
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(10);

/// SPSC byte ring with condvar wake.
///
/// SAFETY:
/// - SPSC constraint: only ONE thread calls `push`, ONE calls `pop_into`.
/// - Acquire/Release on head/tail orders the buffer writes between them.
/// - Capacity is a power of two (mask-based wrapping).
pub struct InputRing {
    buf: UnsafeCell<Vec<u8>>,
    mask: usize,
    /// Producer writes, consumer reads.
    head: AtomicUsize,
    /// Consumer writes, producer reads. The producer never advances this.
    tail: AtomicUsize,
    /// Chunks dropped because the ring was full.
    drops: AtomicU64,
    data_ready: AtomicBool,
    sleep_lock: Mutex<bool>,
    wake: Condvar,
}

// SAFETY: the SPSC protocol plus atomic head/tail makes the UnsafeCell
// buffer safe to share; only disjoint regions are touched concurrently.
unsafe impl Send for InputRing {}
unsafe impl Sync for InputRing {}

impl InputRing {
    /// Allocate with capacity rounded up to a power of two.
    ///
    /// # Errors
    /// [`crate::Error::RingInit`] on zero capacity.
    pub fn with_capacity(n: usize) -> crate::Result<Self> {
        if n == 0 {
            return Err(crate::Error::RingInit("capacity must be > 0".into()));
        }
        let cap = n.next_power_of_two();
        Ok(Self {
            buf: UnsafeCell::new(vec![0u8; cap]),
            mask: cap - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            drops: AtomicU64::new(0),
            data_ready: AtomicBool::new(false),
            sleep_lock: Mutex::new(false),
            wake: Condvar::new(),
        })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Bytes currently readable.
    pub fn len(&self) -> usize {
        self.head
            .load(Ordering::Acquire)
            .wrapping_sub(self.tail.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Producer-side drop counter.
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Push a whole chunk (producer thread only).
    ///
    /// All-or-nothing: a chunk that does not fit is dropped and counted,
    /// so the producer never blocks on the consumer.
    pub fn push(&self, chunk: &[u8]) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let free = self.capacity() - head.wrapping_sub(tail);
        if chunk.len() > free {
            self.drops.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        // SAFETY: producer-exclusive region [head, head+len) by SPSC protocol
        let buf = unsafe { &mut *self.buf.get() };
        for (i, &b) in chunk.iter().enumerate() {
            buf[(head.wrapping_add(i)) & self.mask] = b;
        }
        self.head.store(head.wrapping_add(chunk.len()), Ordering::Release);

        self.data_ready.store(true, Ordering::Release);
        if *self.sleep_lock.lock() {
            self.wake.notify_one();
        }
        true
    }

    /// Pop up to `out.len()` bytes (consumer thread only). Returns count.
    pub fn pop_into(&self, out: &mut [u8]) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let avail = head.wrapping_sub(tail);
        let take = avail.min(out.len());
        if take == 0 {
            return 0;
        }
        // SAFETY: consumer-exclusive region [tail, tail+take)
        let buf = unsafe { &*self.buf.get() };
        for (i, o) in out.iter_mut().take(take).enumerate() {
            *o = buf[(tail.wrapping_add(i)) & self.mask];
        }
        self.tail.store(tail.wrapping_add(take), Ordering::Release);
        take
    }

    /// Block until data is available, the timeout passes, or `exit`.
    ///
    /// Returns true when data may be available. The caller re-checks the
    /// exit flag after every wake.
    pub fn wait_for_data(&self) -> bool {
        if self.data_ready.swap(false, Ordering::Acquire) || !self.is_empty() {
            return true;
        }
        let mut sleeping = self.sleep_lock.lock();
        if self.data_ready.swap(false, Ordering::Acquire) {
            return true;
        }
        *sleeping = true;
        let _ = self.wake.wait_for(&mut sleeping, WAIT_TIMEOUT);
        *sleeping = false;
        self.data_ready.swap(false, Ordering::Acquire) || !self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_push_pop_roundtrip() {
        let ring = InputRing::with_capacity(64).expect("ring");
        assert!(ring.push(&[1, 2, 3, 4]));
        let mut out = [0u8; 8];
        assert_eq!(ring.pop_into(&mut out), 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_full_ring_drops_whole_chunk() {
        let ring = InputRing::with_capacity(8).expect("ring");
        assert!(ring.push(&[0; 8]));
        assert!(!ring.push(&[1, 2]));
        assert_eq!(ring.drops(), 1);
        // nothing partial was written
        let mut out = [9u8; 8];
        assert_eq!(ring.pop_into(&mut out), 8);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wraparound() {
        let ring = InputRing::with_capacity(8).expect("ring");
        let mut out = [0u8; 8];
        for round in 0..10u8 {
            assert!(ring.push(&[round; 5]));
            assert_eq!(ring.pop_into(&mut out), 5);
            assert!(out[..5].iter().all(|&b| b == round));
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(InputRing::with_capacity(0).is_err());
    }

    #[test]
    fn test_wait_times_out_when_idle() {
        let ring = InputRing::with_capacity(8).expect("ring");
        let start = std::time::Instant::now();
        assert!(!ring.wait_for_data());
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_producer_consumer_threads() {
        let ring = Arc::new(InputRing::with_capacity(1 << 12).expect("ring"));
        let producer = {
            let ring = ring.clone();
            std::thread::spawn(move || {
                for i in 0..1000u32 {
                    let b = (i % 251) as u8;
                    while !ring.push(&[b]) {
                        std::thread::yield_now();
                    }
                }
            })
        };
        let mut got = Vec::new();
        let mut buf = [0u8; 64];
        while got.len() < 1000 {
            if ring.wait_for_data() {
                let n = ring.pop_into(&mut buf);
                got.extend_from_slice(&buf[..n]);
            }
        }
        producer.join().expect("producer");
        for (i, &b) in got.iter().enumerate() {
            assert_eq!(b, (i % 251) as u8);
        }
    }
}
