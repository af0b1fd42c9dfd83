//! Per-license-type seat pool: one queue plus the set of current allocations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::invocation::{Invocation, Position};
use crate::prioritizer::Prioritizer;
use crate::queue::InvocationQueue;

/// Manages allocations and queued invocations for a single license type.
///
/// An invocation id appears in at most one of {queue, allocations} at any
/// time, and the allocation count never exceeds the fixed capacity.
pub struct LicensePool {
    name: String,
    total: usize,
    queue: InvocationQueue,
    allocations: HashMap<String, Invocation>,
    prioritizer: Box<dyn Prioritizer>,
}

impl LicensePool {
    /// `name` is the `vendor::feature` key from configuration; `total` is the
    /// fixed seat capacity.
    pub fn new(name: impl Into<String>, total: usize, prioritizer: Box<dyn Prioritizer>) -> Self {
        Self {
            name: name.into(),
            total,
            queue: InvocationQueue::new(),
            allocations: HashMap::new(),
            prioritizer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn allocated_count(&self) -> usize {
        self.allocations.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Puts the invocation at the back of the queue. Returns its 1-based
    /// position after any policy reordering.
    pub fn enqueue(&mut self, inv: Invocation) -> Position {
        let id = inv.id.clone();
        self.queue.enqueue(inv);
        if let Some((queued, _)) = self.queue.get(&id) {
            self.prioritizer.on_enqueue(queued);
        }
        let sorter = self.prioritizer.sorter();
        self.queue.sort(sorter);
        self.queue.get(&id).map(|(_, pos)| pos).unwrap_or(0)
    }

    /// Associates the invocation with a seat iff one is free. Returns whether
    /// a seat was taken; `false` means "no capacity", not an error.
    pub fn allocate(&mut self, inv: Invocation) -> bool {
        if self.allocations.len() >= self.total {
            return false;
        }
        self.prioritizer.on_allocate(&inv);
        self.allocations.insert(inv.id.clone(), inv);
        true
    }

    /// Like [`allocate`](Self::allocate), but first surrenders any queue
    /// spot the id holds, keeping the id in at most one of
    /// {queue, allocations}. A full pool leaves the queue spot untouched.
    pub fn adopt(&mut self, inv: Invocation) -> bool {
        if self.allocations.len() >= self.total {
            return false;
        }
        if let Some(queued) = self.queue.forget(&inv.id) {
            self.prioritizer.on_dequeue(&queued);
        }
        self.prioritizer.on_allocate(&inv);
        self.allocations.insert(inv.id.clone(), inv);
        true
    }

    /// Promotes queued invocations into free seats until either seats or
    /// queued entries run out. The queue is re-sorted before every dequeue so
    /// the policy sees the effect of each promotion.
    pub fn promote(&mut self) {
        let free = self.total.saturating_sub(self.allocations.len());
        for _ in 0..free {
            let sorter = self.prioritizer.sorter();
            self.queue.sort(sorter);
            let Some(inv) = self.queue.dequeue() else { break };
            self.prioritizer.on_dequeue(&inv);
            self.prioritizer.on_allocate(&inv);
            tracing::debug!(license = %self.name, invocation = %inv.id, "promoted to allocation");
            self.allocations.insert(inv.id.clone(), inv);
        }
    }

    pub fn get_allocated(&self, id: &str) -> Option<&Invocation> {
        self.allocations.get(id)
    }

    pub fn get_allocated_mut(&mut self, id: &str) -> Option<&mut Invocation> {
        self.allocations.get_mut(id)
    }

    pub fn get_queued(&self, id: &str) -> Option<(&Invocation, Position)> {
        self.queue.get(id)
    }

    pub fn get_queued_mut(&mut self, id: &str) -> Option<(&mut Invocation, Position)> {
        self.queue.get_mut(id)
    }

    /// Drops every allocation that has not checked in since `cutoff`.
    pub fn expire_allocations(&mut self, cutoff: DateTime<Utc>) {
        let name = self.name.as_str();
        let prioritizer = &mut self.prioritizer;
        self.allocations.retain(|id, inv| {
            if inv.last_checkin > cutoff {
                return true;
            }
            tracing::info!(license = %name, invocation = %id, "expiring stale allocation");
            prioritizer.on_release(inv);
            false
        });
    }

    /// Drops every queued invocation that has not checked in since `cutoff`.
    pub fn expire_queued(&mut self, cutoff: DateTime<Utc>) {
        let name = self.name.as_str();
        let prioritizer = &mut self.prioritizer;
        self.queue.filter(|_, inv| {
            if inv.last_checkin > cutoff {
                return false;
            }
            tracing::info!(license = %name, invocation = %inv.id, "expiring stale queue entry");
            prioritizer.on_dequeue(inv);
            true
        });
    }

    /// Removes the id from whichever of {queue, allocations} holds it.
    /// Returns the number of entries removed (0 or 1).
    pub fn forget(&mut self, id: &str) -> usize {
        let mut count = 0;
        if let Some(inv) = self.allocations.remove(id) {
            self.prioritizer.on_release(&inv);
            count += 1;
        }
        if let Some(inv) = self.queue.forget(id) {
            self.prioritizer.on_dequeue(&inv);
            count += 1;
        }
        count
    }

    /// Read-only projection of the pool for status reporting.
    pub fn stats(&self, now: DateTime<Utc>) -> LicenseStats {
        let (vendor, feature) = match self.name.split_once("::") {
            Some((v, f)) => (v.to_string(), f.to_string()),
            None => ("<UNKNOWN>".to_string(), self.name.clone()),
        };
        let mut allocated: Vec<InvocationStats> =
            self.allocations.values().map(InvocationStats::from).collect();
        allocated.sort_by(|a, b| a.id.cmp(&b.id));
        let queued: Vec<InvocationStats> = self.queue.iter().map(InvocationStats::from).collect();
        LicenseStats {
            vendor,
            feature,
            timestamp: now,
            total: self.total as u32,
            allocated_count: allocated.len() as u32,
            queued_count: queued.len() as u32,
            allocated,
            queued,
        }
    }
}

/// Invocation fields exposed in status snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationStats {
    pub id: String,
    pub owner: String,
    pub build_tag: String,
}

impl From<&Invocation> for InvocationStats {
    fn from(inv: &Invocation) -> Self {
        Self {
            id: inv.id.clone(),
            owner: inv.owner.clone(),
            build_tag: inv.build_tag.clone(),
        }
    }
}

/// Point-in-time snapshot of one license pool.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseStats {
    pub vendor: String,
    pub feature: String,
    pub timestamp: DateTime<Utc>,
    pub total: u32,
    pub allocated_count: u32,
    pub queued_count: u32,
    pub allocated: Vec<InvocationStats>,
    pub queued: Vec<InvocationStats>,
}
