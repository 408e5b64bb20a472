//! Authoritative per-document state.
//!
//! ```text
//! ConversationStore
//!   └── RwLock<HashMap<DocumentId, Arc<Mutex<DocumentState>>>>
//!                                         │
//!                                         ├── CausalClock
//!                                         ├── OperationLog
//!                                         ├── materialized text
//!                                         └── last committed edit
//! ```
//!
//! The registry lock is held only to look up or insert a document. Commits
//! take the per-document mutex, so edits to one document are strictly
//! serialized while different documents commit in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::author::Origin;
use crate::clock::CausalClock;
use crate::edit::{DocumentId, Edit};
use crate::oplog::OperationLog;
use crate::transform::ConflictResolver;
use crate::unicount;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(DocumentId),
}

/// Read-only view of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    pub id: DocumentId,
    pub text: String,
    pub last_committed: Option<Edit>,
}

/// Result of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// The edit as appended to the log, stamped with the pre-commit clock.
    pub edit: Edit,
    /// Document clock after the commit.
    pub origin: Origin,
    /// Materialized text after the commit.
    pub text: String,
}

/// Clock, log and cached text of one document.
#[derive(Debug)]
pub struct DocumentState {
    id: DocumentId,
    clock: CausalClock,
    log: OperationLog,
    text: String,
    last_committed: Option<Edit>,
    /// Set once the document has been removed from the registry.
    retired: bool,
}

impl DocumentState {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            clock: CausalClock::new(),
            log: OperationLog::new(),
            text: String::new(),
            last_committed: None,
            retired: false,
        }
    }

    /// Transform, append, advance the clock and re-materialize.
    pub fn commit(&mut self, incoming: &Edit) -> CommitReceipt {
        let payload = ConflictResolver::transform(incoming, &self.log)
            .clamped(unicount::count_chars(&self.text));

        let committed = Edit {
            author: incoming.author,
            document_id: self.id.clone(),
            payload,
            origin: self.clock.current(),
        };

        self.log.append(committed.clone());
        let origin = self.clock.advance(incoming.author);
        self.text = self.log.replay();
        self.last_committed = Some(committed.clone());

        CommitReceipt {
            edit: committed,
            origin,
            text: self.text.clone(),
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn origin(&self) -> Origin {
        self.clock.current()
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn last_committed(&self) -> Option<&Edit> {
        self.last_committed.as_ref()
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            id: self.id.clone(),
            text: self.text.clone(),
            last_committed: self.last_committed.clone(),
        }
    }
}

/// Registry of documents owned by the authority.
#[derive(Debug, Default)]
pub struct ConversationStore {
    documents: RwLock<HashMap<DocumentId, Arc<Mutex<DocumentState>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the state for `id`.
    fn document(&self, id: &DocumentId) -> Arc<Mutex<DocumentState>> {
        // Fast path: read lock
        if let Some(doc) = self.documents.read().get(id) {
            return doc.clone();
        }

        let mut documents = self.documents.write();
        documents
            .entry(id.clone())
            .or_insert_with(|| {
                log::debug!("Created document {id}");
                Arc::new(Mutex::new(DocumentState::new(id.clone())))
            })
            .clone()
    }

    fn existing(&self, id: &DocumentId) -> Option<Arc<Mutex<DocumentState>>> {
        self.documents.read().get(id).cloned()
    }

    /// Commit `edit` to its document, creating the document on first use.
    ///
    /// Never rejects a well-formed edit.
    pub fn commit(&self, edit: &Edit) -> CommitReceipt {
        self.commit_with(edit, |_| ()).0
    }

    /// Commit `edit` and run `after` while the document is still locked.
    ///
    /// Whatever `after` does (typically fanning the committed edit out) is
    /// ordered exactly like the commits themselves.
    pub fn commit_with<R>(
        &self,
        edit: &Edit,
        after: impl FnOnce(&CommitReceipt) -> R,
    ) -> (CommitReceipt, R) {
        loop {
            let doc = self.document(&edit.document_id);
            let mut state = doc.lock();
            // Lost a race with `delete`; the next lookup creates a fresh state.
            if state.retired {
                continue;
            }

            let receipt = state.commit(edit);
            log::debug!(
                "Committed {} by {} to {} at {} (position {} -> {})",
                edit.kind(),
                edit.author,
                edit.document_id,
                receipt.edit.origin,
                edit.payload.position,
                receipt.edit.payload.position,
            );
            let output = after(&receipt);
            return (receipt, output);
        }
    }

    /// Snapshot of one document, if it exists.
    pub fn snapshot(&self, id: &DocumentId) -> Option<DocumentSnapshot> {
        self.existing(id).map(|doc| doc.lock().snapshot())
    }

    /// Current clock of a document; zero for unknown ids.
    pub fn origin(&self, id: &DocumentId) -> Origin {
        self.existing(id)
            .map_or(Origin::ZERO, |doc| doc.lock().origin())
    }

    /// Copy of a document's log.
    pub fn operation_log(&self, id: &DocumentId) -> Option<OperationLog> {
        self.existing(id).map(|doc| doc.lock().log().clone())
    }

    /// Remove a document with its clock, log and cached text.
    pub fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        let doc = self
            .documents
            .write()
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        doc.lock().retired = true;
        log::info!("Deleted document {id}");
        Ok(())
    }

    /// Snapshots of every known document, in no particular order.
    pub fn list_snapshots(&self) -> Vec<DocumentSnapshot> {
        let docs: Vec<_> = self.documents.read().values().cloned().collect();
        docs.iter().map(|doc| doc.lock().snapshot()).collect()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}
