//! Ordering helpers shared by the priority-discipline primitives (`PriorityQueue`, `PriorityPool`).

use std::cmp::Ordering;

use crate::value::Value;

/// A total-order wrapper over `f64`, used wherever the kernel needs a priority key.
///
/// Like [`simrs_core::VirtualTime`], `NaN` is never produced by anything in this crate; seeing one
/// here means a model constructed a priority from a NaN source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityKey(pub f64);

impl Eq for PriorityKey {}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).expect("priority must never be NaN")
    }
}

/// The mandatory `(priority, payload)` wrapper for polymorphic `PriorityQueue` items: ordering is
/// solely by `priority`, so items that have no intrinsic `Ord` of their own can still be queued.
#[derive(Debug, Clone)]
pub struct PriorityItem {
    pub priority: PriorityKey,
    pub payload: Value,
}

impl PriorityItem {
    pub fn new(priority: f64, payload: Value) -> Self {
        Self { priority: PriorityKey(priority), payload }
    }
}

impl PartialEq for PriorityItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for PriorityItem {}

impl PartialOrd for PriorityItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority)
    }
}
