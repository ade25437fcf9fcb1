//! Bounded undo history owned by one updater.

use std::collections::VecDeque;

use crate::domain::models::config::MAX_UNDO_HISTORY;
use crate::domain::models::{UndoOperation, UndoSummary};

/// Most-recent-last ring buffer of reversible operations.
///
/// Holds at most `limit` entries (never more than ten); pushing onto a
/// full history evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct UndoHistory {
    entries: VecDeque<UndoOperation>,
    limit: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(MAX_UNDO_HISTORY)
    }
}

impl UndoHistory {
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_UNDO_HISTORY);
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, operation: UndoOperation) {
        while self.entries.len() >= self.limit {
            if let Some(evicted) = self.entries.pop_front() {
                tracing::debug!(sequence = evicted.sequence, "evicted oldest undo entry");
            }
        }
        self.entries.push_back(operation);
    }

    pub fn pop(&mut self) -> Option<UndoOperation> {
        self.entries.pop_back()
    }

    pub fn peek(&self) -> Option<&UndoOperation> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Summaries, most recent first.
    pub fn summaries(&self) -> Vec<UndoSummary> {
        self.entries.iter().rev().map(UndoOperation::summary).collect()
    }
}
