//! Ordered queue of invocations with stable per-entry sequence numbers.

use std::cmp::Ordering;

use crate::invocation::{Invocation, Position, QueueSeq};

/// Comparator moving "lesser" entries toward the front of the queue.
///
/// Handed to [`InvocationQueue::sort`], usually obtained from a
/// [`crate::prioritizer::Prioritizer`].
pub type Sorter<'a> = Box<dyn Fn(&Invocation, &Invocation) -> Ordering + 'a>;

/// A queue of invocations waiting for a seat.
///
/// Beside the classic enqueue/dequeue operations it maintains per-entry state
/// (`queue_seq`) so the position of any entry can be derived from that value
/// alone, and it accepts an externally supplied total ordering so
/// prioritization policies can be plugged in without the queue knowing about
/// them.
#[derive(Debug, Default)]
pub struct InvocationQueue(Vec<Invocation>);

impl InvocationQueue {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends at the tail, assigning the next sequence number (head's
    /// sequence + current length, or 1 on an empty queue). Returns the
    /// 1-based position of the new entry.
    pub fn enqueue(&mut self, mut inv: Invocation) -> Position {
        let offset = self.0.first().map_or(1, |head| head.queue_seq);
        inv.queue_seq = offset + self.0.len() as QueueSeq;
        self.0.push(inv);
        self.0.len() as Position
    }

    /// Removes and returns the head entry, clearing its sequence number.
    pub fn dequeue(&mut self) -> Option<Invocation> {
        if self.0.is_empty() {
            return None;
        }
        let mut inv = self.0.remove(0);
        inv.queue_seq = 0;
        Some(inv)
    }

    /// Removes every entry the predicate matches, compacting surviving
    /// sequence numbers downward by the count of removed predecessors so
    /// they stay contiguous. Returns the number of entries removed.
    pub fn filter<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(Position, &Invocation) -> bool,
    {
        let mut removed: QueueSeq = 0;
        let mut kept = Vec::with_capacity(self.0.len());
        for (idx, mut inv) in self.0.drain(..).enumerate() {
            if pred((idx + 1) as Position, &inv) {
                removed += 1;
                continue;
            }
            inv.queue_seq -= removed;
            kept.push(inv);
        }
        self.0 = kept;
        removed as usize
    }

    /// Removes the entry with the given id, compacting the sequence numbers
    /// of everything behind it. Returns the removed entry, no longer queued.
    pub fn forget(&mut self, id: &str) -> Option<Invocation> {
        let idx = self.0.iter().position(|inv| inv.id == id)?;
        let mut inv = self.0.remove(idx);
        inv.queue_seq = 0;
        for later in &mut self.0[idx..] {
            later.queue_seq -= 1;
        }
        Some(inv)
    }

    /// Stable-sorts the queue by the supplied comparator, then reassigns
    /// sequence numbers to match the new order. `None` is a no-op, as is a
    /// comparator that reports every pair equal (stability preserves arrival
    /// order).
    pub fn sort(&mut self, sorter: Option<Sorter<'_>>) {
        let Some(cmp) = sorter else { return };
        let Some(offset) = self.0.first().map(|head| head.queue_seq) else {
            return;
        };
        self.0.sort_by(|a, b| cmp(a, b));
        for (idx, inv) in self.0.iter_mut().enumerate() {
            inv.queue_seq = offset + idx as QueueSeq;
        }
    }

    /// Position of an invocation, derived from its sequence number alone.
    /// Returns 0 on an empty queue.
    pub fn position(&self, inv: &Invocation) -> Position {
        match self.0.first() {
            Some(head) => (1 + inv.queue_seq).saturating_sub(head.queue_seq),
            None => 0,
        }
    }

    /// Linear scan lookup by id.
    pub fn get(&self, id: &str) -> Option<(&Invocation, Position)> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, inv)| inv.id == id)
            .map(|(idx, inv)| (inv, (idx + 1) as Position))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<(&mut Invocation, Position)> {
        self.0
            .iter_mut()
            .enumerate()
            .find(|(_, inv)| inv.id == id)
            .map(|(idx, inv)| (inv, (idx + 1) as Position))
    }

    /// Iterates entries in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &Invocation> {
        self.0.iter()
    }
}
