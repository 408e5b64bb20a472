//! Edit model shared by the authority and its clients.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::author::{Author, Origin};
use crate::cursor::CursorOffset;
use crate::unicount;

/// Identifier of a shared document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Discriminant of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Delete,
    Undo,
    Redo,
}

impl OperationKind {
    /// Wire event name.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Delete => "delete",
            OperationKind::Undo => "undo",
            OperationKind::Redo => "redo",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an edit does at its position.
///
/// `Undo` and `Redo` are accepted everywhere and change nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert { text: String },
    Delete { length: usize },
    Undo,
    Redo,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Insert { .. } => OperationKind::Insert,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Undo => OperationKind::Undo,
            Operation::Redo => OperationKind::Redo,
        }
    }
}

/// Position plus operation, in chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPayload {
    pub position: usize,
    pub operation: Operation,
}

impl EditPayload {
    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Self {
            position,
            operation: Operation::Insert { text: text.into() },
        }
    }

    pub fn delete(position: usize, length: usize) -> Self {
        Self {
            position,
            operation: Operation::Delete { length },
        }
    }

    pub fn undo(position: usize) -> Self {
        Self {
            position,
            operation: Operation::Undo,
        }
    }

    pub fn redo(position: usize) -> Self {
        Self {
            position,
            operation: Operation::Redo,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    /// Fold this payload into `text`.
    ///
    /// Out-of-range positions and lengths are clamped to the text. Returns the
    /// cursor correction the change implies, or `None` when the text did not
    /// change.
    pub fn apply_to(&self, text: &mut String) -> Option<CursorOffset> {
        match &self.operation {
            Operation::Insert { text: inserted } => {
                let at = unicount::insert_at(text, self.position, inserted);
                let len = unicount::count_chars(inserted);
                (len > 0).then(|| CursorOffset::new(at, len as i64))
            }
            Operation::Delete { length } => {
                let (at, removed) = unicount::remove_at(text, self.position, *length);
                (removed > 0).then(|| CursorOffset::new(at, -(removed as i64)))
            }
            Operation::Undo | Operation::Redo => None,
        }
    }

    /// Clamp position (and delete length) into a text of `text_len` chars.
    pub fn clamped(mut self, text_len: usize) -> Self {
        self.position = self.position.min(text_len);
        if let Operation::Delete { length } = &mut self.operation {
            *length = (*length).min(text_len - self.position);
        }
        self
    }
}

/// One edit, stamped with the causal clock its author had observed.
///
/// Once committed, `origin` is the document clock immediately before the
/// edit was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
    pub author: Author,
    pub document_id: DocumentId,
    pub payload: EditPayload,
    pub origin: Origin,
}

impl Edit {
    pub fn new(
        author: Author,
        document_id: impl Into<DocumentId>,
        payload: EditPayload,
        origin: Origin,
    ) -> Self {
        Self {
            author,
            document_id: document_id.into(),
            payload,
            origin,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }
}
