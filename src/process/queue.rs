// FIFO ready queue over process table slots
use alloc::vec;
use alloc::vec::Vec;
use crossbeam_queue::ArrayQueue;

/// Round-robin ready queue.
///
/// Holds slot indices, never PCBs, and tracks membership so a slot can be
/// present at most once.
pub struct ReadyQueue {
    queue: ArrayQueue<usize>,
    queued: Vec<bool>,
}

impl ReadyQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            queued: vec![false; capacity],
        }
    }

    /// Append `slot` at the tail. Returns `false` if it is already queued
    /// or outside the table.
    pub fn push(&mut self, slot: usize) -> bool {
        match self.queued.get(slot) {
            Some(false) => {}
            _ => return false,
        }
        if self.queue.push(slot).is_err() {
            return false;
        }
        self.queued[slot] = true;
        true
    }

    /// Take the head.
    pub fn pop(&mut self) -> Option<usize> {
        let slot = self.queue.pop()?;
        self.queued[slot] = false;
        Some(slot)
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.queued.get(slot).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_arrival_order() {
        let mut queue = ReadyQueue::new(4);
        assert!(queue.push(2));
        assert!(queue.push(0));
        assert!(queue.push(3));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(0));
        assert!(queue.push(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn refuses_double_insertion() {
        let mut queue = ReadyQueue::new(4);
        assert!(queue.push(1));
        assert!(!queue.push(1));
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(1));
        queue.pop();
        assert!(!queue.contains(1));
    }

    #[test]
    fn refuses_slots_outside_table() {
        let mut queue = ReadyQueue::new(2);
        assert!(!queue.push(2));
        assert!(queue.is_empty());
    }
}
