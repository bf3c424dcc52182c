//! Bounded fault queue mirrored to a durable store.

use crate::QueueStore;
use fault_record::{fingerprint, FaultRecord};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Result of pushing a record onto the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Record appended.
    Queued,
    /// Record appended after evicting the oldest entry.
    QueuedWithEviction(FaultRecord),
    /// A record with the same fingerprint is already pending.
    Duplicate,
}

/// Ordered queue of pending fault records.
///
/// Capacity is bounded with FIFO eviction. Every mutation is mirrored to the
/// [`QueueStore`]; persistence failures are logged and never affect the
/// in-memory state.
pub struct ErrorQueue {
    records: VecDeque<FaultRecord>,
    max_len: usize,
    deduplicate: bool,
    store: QueueStore,
}

impl ErrorQueue {
    /// Create an empty queue.
    ///
    /// A zero `max_len` is raised to one so the queue can always hold the
    /// latest record.
    pub fn new(max_len: usize, deduplicate: bool, store: QueueStore) -> Self {
        Self {
            records: VecDeque::new(),
            max_len: max_len.max(1),
            deduplicate,
            store,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// Seed the queue from durable storage at startup.
    ///
    /// Persisted records go in front of anything already queued, the most
    /// recent `max_len` entries are kept, and the persisted copy is cleared.
    /// It is rewritten on the next mutation.
    pub fn load_persisted(&mut self) -> usize {
        let persisted = self.store.load();
        let loaded = persisted.len();
        if loaded > 0 {
            let current = std::mem::take(&mut self.records);
            self.records = persisted.into_iter().chain(current).collect();
            self.trim_front();
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear persisted queue after load");
            }
            debug!(loaded, queued = self.records.len(), "Seeded queue from durable store");
        }
        loaded
    }

    /// Append a record.
    pub fn push(&mut self, record: FaultRecord) -> PushOutcome {
        if self.deduplicate {
            let key = fingerprint(&record);
            if self.records.iter().any(|r| fingerprint(r) == key) {
                return PushOutcome::Duplicate;
            }
        }

        let evicted = if self.records.len() >= self.max_len {
            self.records.pop_front()
        } else {
            None
        };

        self.records.push_back(record);
        self.persist();

        match evicted {
            Some(old) => PushOutcome::QueuedWithEviction(old),
            None => PushOutcome::Queued,
        }
    }

    /// Take everything for sending and leave an empty queue behind.
    ///
    /// The cleared state is persisted immediately, so captures that arrive
    /// while the send is in flight start a fresh queue.
    pub fn drain_for_send(&mut self) -> Vec<FaultRecord> {
        let snapshot: Vec<FaultRecord> = self.records.drain(..).collect();
        self.persist();
        snapshot
    }

    /// Put a failed snapshot back in front of records queued since.
    ///
    /// With dedup on, a record queued since the drain that matches one in
    /// the snapshot is dropped; the snapshot holds the first occurrence.
    pub fn restore_on_failure(&mut self, snapshot: Vec<FaultRecord>) {
        if snapshot.is_empty() {
            return;
        }
        let mut since = std::mem::take(&mut self.records);
        if self.deduplicate {
            let restored: HashSet<String> = snapshot.iter().map(fingerprint).collect();
            since.retain(|r| !restored.contains(&fingerprint(r)));
        }
        self.records = snapshot.into_iter().chain(since).collect();
        self.trim_front();
        self.persist();
    }

    /// Read-only copy of the pending records.
    pub fn snapshot(&self) -> Vec<FaultRecord> {
        self.records.iter().cloned().collect()
    }

    /// Write the current queue to the durable store.
    pub fn persist(&self) {
        if let Err(e) = self.store.persist(&self.records) {
            warn!(error = %e, "Failed to persist queue");
        }
    }

    /// Drop the durable copy without touching the in-memory queue.
    pub fn clear_persisted(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted queue");
        }
    }

    /// Empty the queue and its durable copy.
    pub fn clear(&mut self) {
        self.records.clear();
        self.clear_persisted();
    }

    fn trim_front(&mut self) {
        while self.records.len() > self.max_len {
            self.records.pop_front();
        }
    }
}
