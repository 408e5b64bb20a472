//! # reconcile-core — Operational-transform engine for shared plain text
//!
//! Several editors modify one document concurrently. Every edit carries the
//! causal clock its author last observed; the authority rewrites its position
//! against the committed edits the author could not have seen, appends it to
//! an append-only log and advances the clock. Clients replay committed edits
//! through a paced, single-consumer apply loop.
//!
//! ## Architecture
//!
//! ```text
//!  client edit (origin = last observed clock)
//!        │
//!        ▼
//! ┌──────────────────┐   unseen tail run   ┌──────────────────┐
//! │ ConversationStore│ ──────────────────► │ ConflictResolver │
//! │ (per-doc mutex)  │ ◄────────────────── │ (position shift) │
//! └────────┬─────────┘   transformed edit  └──────────────────┘
//!          │ append + advance
//!          ▼
//! ┌──────────────────┐     ┌──────────────┐
//! │ OperationLog     │     │ CausalClock  │
//! │ (replay → text)  │     │ {alice, bob} │
//! └──────────────────┘     └──────────────┘
//!          │ broadcast committed edit
//!          ▼
//! ┌──────────────────┐
//! │ ClientReconciler │  one dequeue per tick, flush when drained
//! └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`author`] — closed author set and the `Origin` counters
//! - [`clock`] — per-document causal clock
//! - [`edit`] — edits, payloads and the shared fold
//! - [`oplog`] — append-only log and replay
//! - [`transform`] — conflict detection and position rewrite
//! - [`store`] — authoritative per-document registry
//! - [`reconciler`] — client apply loop
//! - [`cursor`] — cursor corrections

pub mod author;
pub mod clock;
pub mod cursor;
pub mod edit;
pub mod oplog;
pub mod reconciler;
pub mod store;
pub mod transform;
pub mod unicount;

// Re-exports for convenience
pub use author::{Author, Origin};
pub use clock::CausalClock;
pub use cursor::{reconcile_cursor, CursorOffset};
pub use edit::{DocumentId, Edit, EditPayload, Operation, OperationKind};
pub use oplog::OperationLog;
pub use reconciler::{ClientReconciler, ContentCallback, ReconcilerState, Tick};
pub use store::{CommitReceipt, ConversationStore, DocumentSnapshot, DocumentState, StoreError};
pub use transform::ConflictResolver;
