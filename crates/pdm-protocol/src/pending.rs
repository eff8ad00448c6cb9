//! Outstanding settings requests
//!
//! Every request that expects a settings response is tracked under
//! `(base_id, prefix, index)` until the response arrives or the retry budget
//! runs out. Deadlines live in a single min-heap; re-arming an entry bumps its
//! generation so older heap items are skipped when they surface.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::frame::Frame;
use crate::prefix::MessagePrefix;

/// Identity of a settings request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingKey {
    pub base_id: u32,
    pub prefix: MessagePrefix,
    pub index: u8,
}

impl PendingKey {
    pub fn new(base_id: u32, prefix: MessagePrefix, index: u8) -> Self {
        Self {
            base_id,
            prefix,
            index,
        }
    }
}

/// How a tracked request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed,
    TimedOut { retries: u32 },
}

/// Result of a deadline passing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    /// Send `frame` again
    Retry { key: PendingKey, frame: Frame, attempt: u32 },
    /// Retry budget exhausted; the entry is gone
    Failed { key: PendingKey, retries: u32 },
}

/// Timeout and retry budget for settings requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            max_retries: 3,
        }
    }
}

/// Snapshot of one entry, for inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingStatus {
    pub frame: Frame,
    pub sent: bool,
    pub received: bool,
    pub retries: u32,
}

struct PendingEntry {
    frame: Frame,
    sent: bool,
    received: bool,
    retries: u32,
    generation: u64,
    waiter: Option<oneshot::Sender<RequestOutcome>>,
}

impl PendingEntry {
    fn complete(mut self, outcome: RequestOutcome) {
        if let Some(waiter) = self.waiter.take() {
            // Receiver may have been dropped by a fire-and-forget caller
            let _ = waiter.send(outcome);
        }
    }
}

struct Deadline {
    at: Instant,
    generation: u64,
    key: PendingKey,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.generation == other.generation
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then(self.generation.cmp(&other.generation))
    }
}

enum Decision {
    Stale,
    Retry(Expiry, Deadline),
    Fail,
}

/// Table of outstanding settings requests
pub struct PendingRequests {
    entries: DashMap<PendingKey, PendingEntry>,
    deadlines: Mutex<BinaryHeap<Reverse<Deadline>>>,
    policy: RequestPolicy,
    generation: AtomicU64,
}

impl PendingRequests {
    pub fn new(policy: RequestPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            deadlines: Mutex::new(BinaryHeap::new()),
            policy,
            generation: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> RequestPolicy {
        self.policy
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, AtomicOrdering::Relaxed)
    }

    fn schedule(&self, deadline: Deadline) {
        self.deadlines.lock().push(Reverse(deadline));
    }

    /// Track a request; the deadline runs from `now` even before sending
    ///
    /// A second insert under the same key replaces the first entry, whose
    /// waiter then sees its sender dropped.
    pub fn insert(
        &self,
        key: PendingKey,
        frame: Frame,
        now: Instant,
    ) -> oneshot::Receiver<RequestOutcome> {
        let (tx, rx) = oneshot::channel();
        let generation = self.next_generation();
        let entry = PendingEntry {
            frame,
            sent: false,
            received: false,
            retries: 0,
            generation,
            waiter: Some(tx),
        };
        if self.entries.insert(key, entry).is_some() {
            debug!(?key, "Replaced outstanding request");
        }
        self.schedule(Deadline {
            at: now + self.policy.timeout,
            generation,
            key,
        });
        rx
    }

    /// Record that the request went out and restart its deadline
    pub fn mark_sent(&self, key: &PendingKey, now: Instant) -> bool {
        let generation = self.next_generation();
        let rearmed = match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.sent = true;
                entry.generation = generation;
                true
            }
            None => false,
        };
        if rearmed {
            self.schedule(Deadline {
                at: now + self.policy.timeout,
                generation,
                key: *key,
            });
        }
        rearmed
    }

    /// Complete a request; false when nothing was outstanding under `key`
    pub fn resolve(&self, key: &PendingKey) -> bool {
        match self.entries.remove(key) {
            Some((_, mut entry)) => {
                entry.received = true;
                entry.complete(RequestOutcome::Completed);
                true
            }
            None => false,
        }
    }

    /// Drop a request without completing it; its waiter sees the sender dropped
    pub fn cancel(&self, key: &PendingKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Handle every deadline at or before `now`
    pub fn poll_expired(&self, now: Instant) -> Vec<Expiry> {
        let due: Vec<Deadline> = {
            let mut deadlines = self.deadlines.lock();
            let mut due = Vec::new();
            while deadlines.peek().is_some_and(|Reverse(d)| d.at <= now) {
                if let Some(Reverse(deadline)) = deadlines.pop() {
                    due.push(deadline);
                }
            }
            due
        };

        let mut expired = Vec::new();
        let mut rearmed = Vec::new();
        for deadline in due {
            match self.decide(&deadline, now) {
                Decision::Stale => {}
                Decision::Retry(expiry, next) => {
                    expired.push(expiry);
                    rearmed.push(next);
                }
                Decision::Fail => {
                    let removed = self
                        .entries
                        .remove_if(&deadline.key, |_, e| e.generation == deadline.generation);
                    if let Some((key, entry)) = removed {
                        let retries = entry.retries;
                        warn!(?key, retries, "Request failed after retries");
                        entry.complete(RequestOutcome::TimedOut { retries });
                        expired.push(Expiry::Failed { key, retries });
                    }
                }
            }
        }

        if !rearmed.is_empty() {
            let mut deadlines = self.deadlines.lock();
            deadlines.extend(rearmed.into_iter().map(Reverse));
        }
        expired
    }

    fn decide(&self, deadline: &Deadline, now: Instant) -> Decision {
        let Some(mut entry) = self.entries.get_mut(&deadline.key) else {
            return Decision::Stale;
        };
        if entry.generation != deadline.generation {
            return Decision::Stale;
        }
        if entry.retries >= self.policy.max_retries {
            return Decision::Fail;
        }

        entry.retries += 1;
        entry.sent = false;
        let generation = self.next_generation();
        entry.generation = generation;
        debug!(key = ?deadline.key, attempt = entry.retries, "Request timed out, retrying");
        Decision::Retry(
            Expiry::Retry {
                key: deadline.key,
                frame: entry.frame,
                attempt: entry.retries,
            },
            Deadline {
                at: now + self.policy.timeout,
                generation,
                key: deadline.key,
            },
        )
    }

    pub fn contains(&self, key: &PendingKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn status(&self, key: &PendingKey) -> Option<PendingStatus> {
        self.entries.get(key).map(|entry| PendingStatus {
            frame: entry.frame,
            sent: entry.sent,
            received: entry.received,
            retries: entry.retries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry for one device; waiters see their sender dropped
    pub fn clear_device(&self, base_id: u32) {
        self.entries.retain(|key, _| key.base_id != base_id);
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
        self.deadlines.lock().clear();
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new(RequestPolicy::default())
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("outstanding", &self.entries.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(index: u8) -> PendingKey {
        PendingKey::new(200, MessagePrefix::Outputs, index)
    }

    fn frame() -> Frame {
        Frame::new(199, &[15, 0]).unwrap()
    }

    fn table(max_retries: u32) -> PendingRequests {
        PendingRequests::new(RequestPolicy {
            timeout: Duration::from_millis(100),
            max_retries,
        })
    }

    #[test]
    fn test_resolve_completes_waiter() {
        let pending = table(3);
        let mut rx = pending.insert(key(0), frame(), Instant::now());
        assert!(pending.contains(&key(0)));

        assert!(pending.resolve(&key(0)));
        assert!(!pending.contains(&key(0)));
        assert_eq!(rx.try_recv().unwrap(), RequestOutcome::Completed);
        assert!(!pending.resolve(&key(0)));
    }

    #[test]
    fn test_unsent_request_still_expires() {
        let pending = table(1);
        let start = Instant::now();
        let _rx = pending.insert(key(0), frame(), start);

        assert!(pending.poll_expired(start + Duration::from_millis(99)).is_empty());
        let expired = pending.poll_expired(start + Duration::from_millis(100));
        assert_eq!(
            expired,
            vec![Expiry::Retry {
                key: key(0),
                frame: frame(),
                attempt: 1
            }]
        );
    }

    #[test]
    fn test_retries_then_fails() {
        let pending = table(2);
        let start = Instant::now();
        let mut rx = pending.insert(key(3), frame(), start);
        let ms = |n| start + Duration::from_millis(n);

        assert!(matches!(
            pending.poll_expired(ms(100)).as_slice(),
            [Expiry::Retry { attempt: 1, .. }]
        ));
        assert!(pending.mark_sent(&key(3), ms(110)));
        assert!(pending.status(&key(3)).unwrap().sent);

        // the rearmed deadline from the retry at 100 is stale after mark_sent
        assert!(pending.poll_expired(ms(200)).is_empty());
        assert!(matches!(
            pending.poll_expired(ms(210)).as_slice(),
            [Expiry::Retry { attempt: 2, .. }]
        ));
        assert_eq!(
            pending.poll_expired(ms(310)),
            vec![Expiry::Failed {
                key: key(3),
                retries: 2
            }]
        );
        assert!(pending.is_empty());
        assert_eq!(
            rx.try_recv().unwrap(),
            RequestOutcome::TimedOut { retries: 2 }
        );
    }

    #[test]
    fn test_resolved_entry_never_expires() {
        let pending = table(0);
        let start = Instant::now();
        let _rx = pending.insert(key(1), frame(), start);
        pending.resolve(&key(1));
        assert!(pending
            .poll_expired(start + Duration::from_secs(5))
            .is_empty());
    }

    #[test]
    fn test_reinsert_replaces_entry() {
        let pending = table(0);
        let start = Instant::now();
        let mut first = pending.insert(key(1), frame(), start);
        let _second = pending.insert(key(1), frame(), start + Duration::from_millis(50));

        assert_eq!(pending.len(), 1);
        assert!(first.try_recv().is_err());
        // only the second entry's deadline is live
        assert!(pending
            .poll_expired(start + Duration::from_millis(100))
            .is_empty());
        assert_eq!(
            pending.poll_expired(start + Duration::from_millis(150)).len(),
            1
        );
    }

    #[test]
    fn test_clear_device() {
        let pending = table(3);
        let now = Instant::now();
        let _a = pending.insert(key(0), frame(), now);
        let _b = pending.insert(
            PendingKey::new(300, MessagePrefix::Outputs, 0),
            frame(),
            now,
        );
        pending.clear_device(200);
        assert_eq!(pending.len(), 1);
        assert!(!pending.contains(&key(0)));
    }

    #[test]
    fn test_cancel_drops_waiter() {
        let pending = table(3);
        let mut rx = pending.insert(key(1), frame(), Instant::now());

        assert!(pending.cancel(&key(1)));
        assert!(pending.is_empty());
        assert_eq!(rx.try_recv(), Err(oneshot::error::TryRecvError::Closed));
        assert!(!pending.cancel(&key(1)));
        assert!(pending.poll_expired(Instant::now() + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_clear_drops_every_waiter() {
        let pending = table(3);
        let now = Instant::now();
        let mut a = pending.insert(key(0), frame(), now);
        let mut b = pending.insert(key(1), frame(), now);

        pending.clear();
        assert!(pending.is_empty());
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_mark_sent_unknown_key() {
        let pending = table(3);
        assert!(!pending.mark_sent(&key(9), Instant::now()));
    }
}
