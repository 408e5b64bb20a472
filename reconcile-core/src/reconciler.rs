//! Client-side apply loop.
//!
//! A single FIFO queue receives both optimistic local edits and committed
//! edits echoed from other authors. Each call to [`ClientReconciler::tick`]
//! does exactly one step:
//!
//! ```text
//!            enqueue                  tick: queue non-empty
//!   Idle ─────────────▸ Draining ◂──────────────────────────┐
//!    ▲                     │  dequeue + apply one edit      │
//!    │                     └────────────────────────────────┘
//!    │                     │  tick: queue empty
//!    │   flush callback    ▼
//!    └──────────────── Flushing
//! ```
//!
//! The content callback fires only once the queue has drained, with the
//! text and every cursor correction accumulated since the previous flush.

use std::collections::VecDeque;
use std::fmt;

use crate::cursor::CursorOffset;
use crate::edit::{DocumentId, Edit, OperationKind};

/// Receives `(text, corrections)` when the queue drains.
pub type ContentCallback = Box<dyn FnMut(&str, &[CursorOffset]) + Send>;

/// Observable phase of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    /// Nothing queued, nothing to report.
    Idle,
    /// Edits waiting to be applied.
    Draining,
    /// Queue drained; the next tick flushes to the callback.
    Flushing,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Idle,
    Applied(OperationKind),
    Flushed,
}

pub struct ClientReconciler {
    document_id: DocumentId,
    queue: VecDeque<Edit>,
    text: String,
    corrections: Vec<CursorOffset>,
    /// At least one edit applied since the last flush.
    dirty: bool,
    applied: u64,
    on_content: Option<ContentCallback>,
}

impl ClientReconciler {
    pub fn new(document_id: impl Into<DocumentId>) -> Self {
        Self::with_text(document_id, String::new())
    }

    /// Start from already materialized text.
    pub fn with_text(document_id: impl Into<DocumentId>, text: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            queue: VecDeque::new(),
            text: text.into(),
            corrections: Vec::new(),
            dirty: false,
            applied: 0,
            on_content: None,
        }
    }

    /// Register the flush callback, replacing any previous one.
    pub fn on_content(&mut self, callback: impl FnMut(&str, &[CursorOffset]) + Send + 'static) {
        self.on_content = Some(Box::new(callback));
    }

    /// Append an edit to the queue. Never applies it in place.
    pub fn enqueue(&mut self, edit: Edit) {
        self.queue.push_back(edit);
    }

    /// Advance the loop by one step.
    pub fn tick(&mut self) -> Tick {
        if let Some(edit) = self.queue.pop_front() {
            if let Some(correction) = edit.payload.apply_to(&mut self.text) {
                self.corrections.push(correction);
            }
            self.dirty = true;
            self.applied += 1;
            return Tick::Applied(edit.kind());
        }

        if !self.dirty {
            return Tick::Idle;
        }

        if let Some(callback) = self.on_content.as_mut() {
            callback(&self.text, &self.corrections);
        }
        self.corrections.clear();
        self.dirty = false;
        Tick::Flushed
    }

    pub fn state(&self) -> ReconcilerState {
        if !self.queue.is_empty() {
            ReconcilerState::Draining
        } else if self.dirty {
            ReconcilerState::Flushing
        } else {
            ReconcilerState::Idle
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Corrections accumulated since the last flush.
    pub fn corrections(&self) -> &[CursorOffset] {
        &self.corrections
    }

    /// Total edits applied over the lifetime of the loop.
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

impl fmt::Debug for ClientReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientReconciler")
            .field("document_id", &self.document_id)
            .field("pending", &self.queue.len())
            .field("text", &self.text)
            .field("state", &self.state())
            .finish()
    }
}
