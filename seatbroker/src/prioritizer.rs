//! Queue prioritization policies.

use std::collections::HashMap;

use serde::Deserialize;

use crate::invocation::Invocation;
use crate::queue::Sorter;

/// Fairness policy selected per license pool in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    #[default]
    Fifo,
    EvenOwners,
}

impl Policy {
    pub fn prioritizer(self) -> Box<dyn Prioritizer> {
        match self {
            Policy::Fifo => Box::new(Fifo),
            Policy::EvenOwners => Box::new(EvenOwners::new()),
        }
    }
}

/// A policy object capable of reordering a pool's queue.
///
/// To have enough data for the decision, a prioritizer is notified every time
/// an entry is queued or dequeued and every time a seat is allocated or
/// released. State lives on the policy instance itself; instances are owned
/// by their pool, never shared ambiently.
pub trait Prioritizer: Send {
    /// Called every time an invocation is queued.
    fn on_enqueue(&mut self, _inv: &Invocation) {}

    /// Called every time an invocation leaves the queue: expiry, withdrawal,
    /// or as the precursor to an allocation (in which case `on_allocate`
    /// follows immediately).
    fn on_dequeue(&mut self, _inv: &Invocation) {}

    /// Called every time an invocation is allocated a seat.
    fn on_allocate(&mut self, _inv: &Invocation) {}

    /// Called every time an invocation loses its seat, whether it released
    /// voluntarily or timed out while holding it.
    fn on_release(&mut self, _inv: &Invocation) {}

    /// Comparator handed to [`crate::queue::InvocationQueue::sort`].
    /// `None` keeps arrival order.
    fn sorter(&self) -> Option<Sorter<'_>>;
}

/// Keeps entries in the order they were queued. The default, and
/// behaviorally indistinguishable from having no policy at all.
pub struct Fifo;

impl Prioritizer for Fifo {
    fn sorter(&self) -> Option<Sorter<'_>> {
        None
    }
}

/// Spreads seat allocations evenly across owners.
///
/// Time is not part of the equation: if owner A holds 10 seats and owner B
/// walks up with none, B's requests are ranked ahead of A's until the
/// distribution evens out. Per-entry rank is
///
/// ```text
/// rank = position - dequeued(owner) + allocated(owner)
/// ```
///
/// where `position` is the owner's enqueue counter snapshot (1 for the
/// owner's first entry) taken when the entry was queued. `position -
/// dequeued` restarts at one for each owner's oldest still-pending request,
/// so sorting by it alone interleaves owners round-robin; adding the
/// owner's live seat count pushes owners who already hold seats toward the
/// back. With A holding 10 seats:
///
/// ```text
///        queue:  A  A  A  A  A  B  A  A  B  B
///  pos - deq:    1  2  3  4  5  1  6  7  2  3
///        rank:  11 12 13 14 15  1 16 17  2  3
/// ```
///
/// so every pending B request sorts ahead of every A request.
pub struct EvenOwners {
    /// Per-invocation-id snapshot of the owner's enqueued counter at
    /// enqueue time.
    position: HashMap<String, u64>,
    /// Per-owner count of requests ever queued, monotonically increasing
    /// while the owner has in-flight entries.
    enqueued: HashMap<String, u64>,
    /// Per-owner count of requests ever dequeued, monotonically increasing
    /// while the owner has in-flight entries.
    dequeued: HashMap<String, u64>,
    /// Per-owner count of seats currently held.
    allocated: HashMap<String, u64>,
}

impl EvenOwners {
    pub fn new() -> Self {
        Self {
            position: HashMap::new(),
            enqueued: HashMap::new(),
            dequeued: HashMap::new(),
            allocated: HashMap::new(),
        }
    }

    // Signed arithmetic: an out-of-order dequeue (expiry of a younger entry)
    // can push dequeued past an older entry's snapshot.
    fn rank(&self, inv: &Invocation) -> i128 {
        let pos = self.position.get(&inv.id).copied().unwrap_or(0) as i128;
        let deq = self.dequeued.get(&inv.owner).copied().unwrap_or(0) as i128;
        let held = self.allocated.get(&inv.owner).copied().unwrap_or(0) as i128;
        pos - deq + held
    }
}

impl Default for EvenOwners {
    fn default() -> Self {
        Self::new()
    }
}

impl Prioritizer for EvenOwners {
    fn on_enqueue(&mut self, inv: &Invocation) {
        let count = self.enqueued.entry(inv.owner.clone()).or_insert(0);
        *count += 1;
        self.position.insert(inv.id.clone(), *count);
    }

    fn on_dequeue(&mut self, inv: &Invocation) {
        let deq = self.dequeued.entry(inv.owner.clone()).or_insert(0);
        *deq += 1;
        self.position.remove(&inv.id);
        // No in-flight entries left for this owner; drop its counters.
        if *deq >= self.enqueued.get(&inv.owner).copied().unwrap_or(0) {
            self.enqueued.remove(&inv.owner);
            self.dequeued.remove(&inv.owner);
        }
    }

    fn on_allocate(&mut self, inv: &Invocation) {
        *self.allocated.entry(inv.owner.clone()).or_insert(0) += 1;
    }

    fn on_release(&mut self, inv: &Invocation) {
        match self.allocated.get_mut(&inv.owner) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.allocated.remove(&inv.owner);
            }
            None => {}
        }
    }

    fn sorter(&self) -> Option<Sorter<'_>> {
        Some(Box::new(move |a: &Invocation, b: &Invocation| {
            self.rank(a).cmp(&self.rank(b))
        }))
    }
}
