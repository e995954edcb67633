//! Ordered event scheduler on a monotonic cycle timeline.
//!
//! Events carry an absolute 64-bit deadline. The queue is kept sorted by
//! deadline; events with equal deadlines keep their insertion order, so two
//! events due on the same cycle fire first-in first-out.
//!
//! Policy (duplicate handling, how deadlines map to a guest counter) belongs
//! to the owner. The queue only orders.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A pending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent<K> {
    pub kind: K,
    pub deadline: u64,
}

/// Deadline-ordered queue.
#[derive(Debug, Clone)]
pub struct EventQueue<K> {
    events: VecDeque<ScheduledEvent<K>>,
}

impl<K> Default for EventQueue<K> {
    fn default() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }
}

impl<K: Copy + PartialEq> EventQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
        }
    }

    /// Insert after every event due at or before `deadline`.
    pub fn insert(&mut self, kind: K, deadline: u64) {
        let pos = self.events.partition_point(|e| e.deadline <= deadline);
        self.events.insert(pos, ScheduledEvent { kind, deadline });
    }

    pub fn contains(&self, kind: K) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }

    /// Remove the first pending event of `kind`. Returns whether one existed.
    pub fn remove(&mut self, kind: K) -> bool {
        match self.events.iter().position(|e| e.kind == kind) {
            Some(pos) => {
                self.events.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn deadline_of(&self, kind: K) -> Option<u64> {
        self.events
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.deadline)
    }

    pub fn peek(&self) -> Option<&ScheduledEvent<K>> {
        self.events.front()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.events.front().map(|e| e.deadline)
    }

    /// Pop the head if its deadline has been reached.
    ///
    /// Callers loop on this to catch up after running past several deadlines.
    pub fn pop_due(&mut self, now: u64) -> Option<ScheduledEvent<K>> {
        match self.events.front() {
            Some(head) if head.deadline <= now => self.events.pop_front(),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in firing order
    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent<K>> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        A,
        B,
        C,
    }

    #[test]
    fn test_insert_keeps_deadline_order() {
        let mut q = EventQueue::new();
        q.insert(Kind::A, 300);
        q.insert(Kind::B, 100);
        q.insert(Kind::C, 200);

        let order: Vec<_> = q.iter().map(|e| e.kind).collect();
        assert_eq!(order, vec![Kind::B, Kind::C, Kind::A]);
        assert_eq!(q.next_deadline(), Some(100));
    }

    #[test]
    fn test_equal_deadlines_fire_in_insertion_order() {
        let mut q = EventQueue::new();
        q.insert(Kind::C, 50);
        q.insert(Kind::A, 50);
        q.insert(Kind::B, 50);

        assert_eq!(q.pop_due(50).map(|e| e.kind), Some(Kind::C));
        assert_eq!(q.pop_due(50).map(|e| e.kind), Some(Kind::A));
        assert_eq!(q.pop_due(50).map(|e| e.kind), Some(Kind::B));
        assert!(q.pop_due(50).is_none());
    }

    #[test]
    fn test_pop_due_respects_now() {
        let mut q = EventQueue::new();
        q.insert(Kind::A, 10);
        q.insert(Kind::B, 20);

        assert!(q.pop_due(9).is_none(), "nothing due before the first deadline");
        assert_eq!(q.pop_due(25).map(|e| e.kind), Some(Kind::A));
        assert_eq!(q.pop_due(25).map(|e| e.kind), Some(Kind::B));
        assert!(q.is_empty());
    }

    #[test]
    fn test_remove_and_lookup() {
        let mut q = EventQueue::new();
        q.insert(Kind::A, 10);
        q.insert(Kind::B, 20);

        assert_eq!(q.deadline_of(Kind::B), Some(20));
        assert!(q.remove(Kind::B));
        assert!(!q.remove(Kind::B), "second removal finds nothing");
        assert_eq!(q.deadline_of(Kind::B), None);
        assert!(q.contains(Kind::A));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_deadlines_beyond_32_bits() {
        let mut q = EventQueue::new();
        q.insert(Kind::A, u32::MAX as u64 + 10);
        q.insert(Kind::B, u32::MAX as u64 - 10);

        assert_eq!(q.peek().map(|e| e.kind), Some(Kind::B));
        assert!(q.pop_due(u32::MAX as u64).is_some());
        assert!(q.pop_due(u32::MAX as u64).is_none());
    }
}
