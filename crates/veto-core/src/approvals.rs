use crate::{ApprovalStatus, PendingApproval, Resolution};
use std::collections::VecDeque;

/// Human-approval requests, most recent first. Resolved entries stay in the queue.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApprovalQueue {
    entries: VecDeque<PendingApproval>,
}

impl ApprovalQueue {
    pub fn push(&mut self, approval: PendingApproval) {
        self.entries.push_front(approval);
    }

    /// Marks the first entry with `id` as resolved. Returns false when no entry matches.
    /// Resolving an already-resolved entry overwrites its status.
    pub fn resolve(&mut self, id: &str, resolution: Resolution) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.status = ApprovalStatus::from(resolution);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&PendingApproval> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn first_unresolved(&self) -> Option<&PendingApproval> {
        self.entries.iter().find(|entry| !entry.status.is_resolved())
    }

    pub fn has_unresolved(&self) -> bool {
        self.first_unresolved().is_some()
    }

    pub fn unresolved_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.status.is_resolved())
            .count()
    }

    /// Unresolved entries first, then resolved ones, each keeping queue order.
    pub fn partitioned(&self) -> Vec<&PendingApproval> {
        let (mut unresolved, resolved): (Vec<_>, Vec<_>) = self
            .entries
            .iter()
            .partition(|entry| !entry.status.is_resolved());
        unresolved.extend(resolved);
        unresolved
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingApproval> + '_ {
        self.entries.iter()
    }
}
