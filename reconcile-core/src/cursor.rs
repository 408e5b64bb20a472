//! Cursor corrections reported by the client apply loop.

use serde::{Deserialize, Serialize};

/// Shift to apply to any cursor at or after `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorOffset {
    pub index: usize,
    pub offset: i64,
}

impl CursorOffset {
    pub fn new(index: usize, offset: i64) -> Self {
        Self { index, offset }
    }

    /// Move `cursor` by this correction.
    ///
    /// A negative offset never pulls the cursor before `index`.
    pub fn apply(&self, cursor: usize) -> usize {
        if cursor < self.index {
            return cursor;
        }
        if self.offset >= 0 {
            cursor + self.offset as usize
        } else {
            cursor
                .saturating_sub(self.offset.unsigned_abs() as usize)
                .max(self.index)
        }
    }
}

/// Fold `corrections`, in order, over `cursor`.
pub fn reconcile_cursor(cursor: usize, corrections: &[CursorOffset]) -> usize {
    corrections.iter().fold(cursor, |cursor, c| c.apply(cursor))
}
