//! Reference retainer — time-boxed hard references for in-flight payloads.
//!
//! The retainer is the sole owner of a pinned payload copy between enqueue
//! and flush. Expiry is an explicit sweep over a min-heap keyed by
//! deadline, not a collector artifact: the clock is passed in, so tests
//! drive time directly. A flush (`release`) and the expiry sweep may race
//! over the same key; removal is idempotent, so whichever loses simply
//! finds nothing.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;

/// Default pin lifetime. Long enough to survive ordinary reconnect delays,
/// short enough that a permanently dead node cannot hold memory hostage.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(20);

/// Default cadence of the expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to a pinned payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RetainKey(u64);

struct Pinned {
    payload: Bytes,
    deadline: Instant,
}

/// Holds hard references to payloads for a bounded window.
pub struct ReferenceRetainer {
    entries: DashMap<RetainKey, Pinned>,
    deadlines: Mutex<BinaryHeap<Reverse<(Instant, RetainKey)>>>,
    next_key: AtomicU64,
    retention: Duration,
}

impl ReferenceRetainer {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            deadlines: Mutex::new(BinaryHeap::new()),
            next_key: AtomicU64::new(1),
            retention,
        }
    }

    /// Pin a payload until `now + retention`, or until released.
    pub fn retain(&self, payload: Bytes, now: Instant) -> RetainKey {
        let key = RetainKey(self.next_key.fetch_add(1, Ordering::Relaxed));
        let deadline = now + self.retention;
        self.entries.insert(key, Pinned { payload, deadline });
        self.deadlines
            .lock()
            .expect("retainer heap poisoned")
            .push(Reverse((deadline, key)));
        key
    }

    /// Take ownership back. Idempotent: the second caller gets `None`,
    /// whether the first was a flush or the expiry sweep.
    pub fn release(&self, key: RetainKey) -> Option<Bytes> {
        self.entries.remove(&key).map(|(_, pinned)| pinned.payload)
    }

    /// Non-consuming read of a still-pinned payload.
    pub fn peek(&self, key: RetainKey) -> Option<Bytes> {
        self.entries.get(&key).map(|p| p.payload.clone())
    }

    /// How many payloads are currently pinned.
    pub fn pinned(&self) -> usize {
        self.entries.len()
    }

    /// Drop every pin whose deadline has passed. Returns how many were
    /// reclaimed. Safe to run concurrently with retain and release.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut due = Vec::new();
        {
            let mut heap = self.deadlines.lock().expect("retainer heap poisoned");
            while let Some(&Reverse((deadline, key))) = heap.peek() {
                if deadline > now {
                    break;
                }
                heap.pop();
                due.push(key);
            }
        }
        let mut reclaimed = 0;
        for key in due {
            // A released key leaves a stale heap entry; removing it twice
            // is a no-op.
            if self.entries.remove(&key).is_some() {
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            tracing::debug!(reclaimed, "retainer sweep reclaimed expired payloads");
        }
        reclaimed
    }

    /// Spawn the periodic production sweeper.
    pub fn run_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep(Instant::now());
            }
        })
    }
}
