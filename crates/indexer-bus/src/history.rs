//! # Event History
//!
//! Fixed-capacity ring buffer of recently broadcast events, used to serve
//! replay requests from new subscribers. The broadcast task is the only
//! writer; replay takes an oldest-first snapshot.

use crate::events::ChainEvent;
use chrono::{DateTime, Utc};

/// A recorded event plus the wall-clock instant it was broadcast.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// The broadcast event.
    pub event: ChainEvent,
    /// When the broadcast task recorded it.
    pub recorded_at: DateTime<Utc>,
}

/// Fixed-capacity ring of the most recent broadcast events.
///
/// Capacity is set at construction and never changes; the write cursor
/// wraps, overwriting the oldest entry.
#[derive(Debug)]
pub struct EventHistory {
    entries: Vec<Option<HistoryEntry>>,
    cursor: usize,
    len: usize,
}

impl EventHistory {
    /// Create a ring with the given capacity. A capacity of zero disables
    /// history (every push is dropped, snapshots are empty).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(|_| None).collect(),
            cursor: 0,
            len: 0,
        }
    }

    /// The fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of recorded entries, at most `capacity`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record an event at the cursor, overwriting the oldest entry once
    /// the ring is full.
    pub fn push(&mut self, event: ChainEvent) {
        if self.entries.is_empty() {
            return;
        }
        self.entries[self.cursor] = Some(HistoryEntry {
            event,
            recorded_at: Utc::now(),
        });
        self.cursor = (self.cursor + 1) % self.entries.len();
        if self.len < self.entries.len() {
            self.len += 1;
        }
    }

    /// Snapshot the recorded entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        if self.entries.is_empty() || self.len == 0 {
            return Vec::new();
        }
        let cap = self.entries.len();
        // When full, the cursor points at the oldest entry; when partially
        // filled, entry 0 is the oldest.
        let start = if self.len == cap { self.cursor } else { 0 };
        (0..self.len)
            .filter_map(|i| self.entries[(start + i) % cap].clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BlockEvent;
    use indexer_types::primitives::Hash;

    fn block(n: u64) -> ChainEvent {
        BlockEvent::new(n, Hash::repeat_byte(n as u8), 0).into()
    }

    fn numbers(entries: &[HistoryEntry]) -> Vec<u64> {
        entries
            .iter()
            .map(|e| e.event.block_number().unwrap())
            .collect()
    }

    #[test]
    fn test_partial_fill_snapshot() {
        let mut history = EventHistory::new(5);
        assert!(history.is_empty());

        history.push(block(1));
        history.push(block(2));
        assert_eq!(history.len(), 2);
        assert_eq!(numbers(&history.snapshot()), vec![1, 2]);
    }

    #[test]
    fn test_wraparound_keeps_newest() {
        let mut history = EventHistory::new(3);
        for n in 1..=5 {
            history.push(block(n));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(numbers(&history.snapshot()), vec![3, 4, 5]);
    }

    #[test]
    fn test_exact_capacity_boundary() {
        let mut history = EventHistory::new(3);
        for n in 1..=3 {
            history.push(block(n));
        }
        assert_eq!(numbers(&history.snapshot()), vec![1, 2, 3]);

        history.push(block(4));
        assert_eq!(numbers(&history.snapshot()), vec![2, 3, 4]);
    }

    #[test]
    fn test_zero_capacity_disables_history() {
        let mut history = EventHistory::new(0);
        history.push(block(1));
        assert!(history.is_empty());
        assert!(history.snapshot().is_empty());
    }
}
