use crate::Decision;
use std::collections::VecDeque;

/// Append-only decision history, most recent first. Unbounded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecisionLog {
    entries: VecDeque<Decision>,
}

impl DecisionLog {
    pub fn push(&mut self, decision: Decision) {
        self.entries.push_front(decision);
    }

    pub fn latest(&self) -> Option<&Decision> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decision> + '_ {
        self.entries.iter()
    }
}
