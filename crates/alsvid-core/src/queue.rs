//! The priority-ordered backfill queue.
//!
//! Strategies scan the queue repeatedly within one pass and need to reject
//! jobs without touching the underlying job table. Each slot is a tagged
//! variant, so a rejected job is distinguishable from a live reference and is
//! never rescanned; the end of the vector replaces the original's trailing
//! sentinel.

use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// One slot in the backfill queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueSlot {
    /// Job is still a backfill candidate.
    Eligible(JobId),
    /// Job was rejected for the remainder of the pass.
    Ineligible,
}

/// A priority-ordered queue of backfill candidates.
///
/// Order is supplied by the caller (highest priority first) and never changes
/// within a pass; strategies only mark slots ineligible. Strategies that
/// re-invoke per iteration clone the queue so the caller's copy survives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackfillQueue {
    slots: Vec<QueueSlot>,
}

impl BackfillQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue from jobs in priority order.
    pub fn from_ids(ids: impl IntoIterator<Item = JobId>) -> Self {
        Self {
            slots: ids.into_iter().map(QueueSlot::Eligible).collect(),
        }
    }

    /// Append a job at the back of the queue.
    pub fn push(&mut self, id: JobId) {
        self.slots.push(QueueSlot::Eligible(id));
    }

    /// Number of slots (eligible or not).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check whether the queue has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The job in slot `index`, if it is still eligible.
    pub fn get(&self, index: usize) -> Option<JobId> {
        match self.slots.get(index) {
            Some(QueueSlot::Eligible(id)) => Some(*id),
            _ => None,
        }
    }

    /// Mark a slot ineligible for the remainder of the pass.
    pub fn mark_ineligible(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = QueueSlot::Ineligible;
        }
    }

    /// Iterate over the eligible slots in queue order.
    pub fn eligible(&self) -> impl Iterator<Item = (usize, JobId)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            QueueSlot::Eligible(id) => Some((i, *id)),
            QueueSlot::Ineligible => None,
        })
    }

    /// Drop all slots past `max`.
    pub fn truncate(&mut self, max: usize) {
        self.slots.truncate(max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_queue(n: u32) -> BackfillQueue {
        BackfillQueue::from_ids((0..n).map(JobId))
    }

    #[test]
    fn test_eligible_iteration_order() {
        let queue = make_queue(3);
        let ids: Vec<_> = queue.eligible().map(|(_, id)| id).collect();
        assert_eq!(ids, vec![JobId(0), JobId(1), JobId(2)]);
    }

    #[test]
    fn test_marked_slots_are_skipped() {
        let mut queue = make_queue(3);
        queue.mark_ineligible(1);

        assert_eq!(queue.get(1), None);
        let ids: Vec<_> = queue.eligible().map(|(_, id)| id).collect();
        assert_eq!(ids, vec![JobId(0), JobId(2)]);
        // marking does not shrink the queue
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_clone_is_independent() {
        let queue = make_queue(2);
        let mut copy = queue.clone();
        copy.mark_ineligible(0);

        assert_eq!(queue.get(0), Some(JobId(0)));
        assert_eq!(copy.get(0), None);
    }

    #[test]
    fn test_truncate() {
        let mut queue = make_queue(5);
        queue.truncate(2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(4), None);
    }
}
