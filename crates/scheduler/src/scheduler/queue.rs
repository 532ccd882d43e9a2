use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::request::{Priority, ReportRequest};

/// Total dequeue order: priority descending, then request timestamp
/// ascending, then insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueKey {
    priority: Reverse<Priority>,
    requested_at: DateTime<Utc>,
    sequence: u64,
}

/// Pending requests in dequeue order, indexed by identifier.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: BTreeMap<QueueKey, ReportRequest>,
    index: HashMap<Uuid, QueueKey>,
    next_sequence: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a request. A request already pending under the same
    /// identifier is replaced and re-sorted. Requests without an identifier
    /// are refused.
    pub fn push(&mut self, request: ReportRequest) -> bool {
        let Some(uuid) = request.uuid() else {
            return false;
        };
        self.remove(&uuid);
        let key = QueueKey {
            priority: Reverse(request.priority),
            requested_at: request.requested_at,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.index.insert(uuid, key);
        self.entries.insert(key, request);
        true
    }

    /// Remove and return the head of the queue.
    pub fn pop(&mut self) -> Option<ReportRequest> {
        let (_, request) = self.entries.pop_first()?;
        if let Some(uuid) = request.uuid() {
            self.index.remove(&uuid);
        }
        Some(request)
    }

    pub fn peek(&self) -> Option<&ReportRequest> {
        self.entries.values().next()
    }

    pub fn remove(&mut self, uuid: &Uuid) -> Option<ReportRequest> {
        let key = self.index.remove(uuid)?;
        self.entries.remove(&key)
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.index.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending requests in dequeue order.
    pub fn snapshot(&self) -> Vec<ReportRequest> {
        self.entries.values().cloned().collect()
    }
}
