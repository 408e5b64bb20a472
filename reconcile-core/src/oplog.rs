//! Append-only log of committed edits.
//!
//! The log is the source of truth for a document: folding every payload over
//! an empty string, in log order, reproduces the canonical text. Entries are
//! never reordered or removed.

use crate::edit::Edit;

#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    entries: Vec<Edit>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a committed edit at the tail.
    pub fn append(&mut self, edit: Edit) {
        self.entries.push(edit);
    }

    /// Materialize the text by folding the whole log.
    ///
    /// O(log length) on every call; pure and idempotent.
    pub fn replay(&self) -> String {
        let mut text = String::new();
        for edit in &self.entries {
            edit.payload.apply_to(&mut text);
        }
        text
    }

    /// Longest suffix whose entries all satisfy `pred`, oldest first.
    ///
    /// Scans backwards from the tail without touching the log.
    pub fn tail_run(&self, mut pred: impl FnMut(&Edit) -> bool) -> &[Edit] {
        let start = self
            .entries
            .iter()
            .rposition(|edit| !pred(edit))
            .map_or(0, |i| i + 1);
        &self.entries[start..]
    }

    pub fn entries(&self) -> &[Edit] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edit> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Edit> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a OperationLog {
    type Item = &'a Edit;
    type IntoIter = std::slice::Iter<'a, Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
