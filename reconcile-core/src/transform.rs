//! Operational transform of incoming edits against the committed log.
//!
//! ```text
//!   log:  c0  c1  c2 │ c3  c4      e.origin dominated by c3.origin, c4.origin
//!                    └── unseen ──┘
//!   e.position ── shifted by c3, then c4 (skipping e.author's own edits)
//! ```
//!
//! A committed edit `c` is unseen by `e` when `e.origin <= c.origin` for
//! every author. Because `c.origin` is the clock *before* `c` was applied,
//! this means `c` landed on a state at least as new as anything `e`'s author
//! had observed. Log order is causal, so the unseen edits always form a
//! contiguous run at the tail.

use crate::author::Origin;
use crate::edit::{Edit, EditPayload, Operation};
use crate::oplog::OperationLog;

/// Rewrites incoming edit positions so they apply to the current text.
pub struct ConflictResolver;

impl ConflictResolver {
    /// True when an author at `observed` cannot have seen `committed`.
    pub fn is_unseen(observed: &Origin, committed: &Edit) -> bool {
        observed.dominated_by(&committed.origin)
    }

    /// Committed edits `incoming` was not authored against, oldest first.
    pub fn unseen<'a>(incoming: &Edit, log: &'a OperationLog) -> &'a [Edit] {
        log.tail_run(|committed| Self::is_unseen(&incoming.origin, committed))
    }

    /// Transform `incoming` against every unseen edit of the other authors.
    ///
    /// Positions saturate at zero when a concurrent delete removed the text
    /// `incoming` targeted.
    pub fn transform(incoming: &Edit, log: &OperationLog) -> EditPayload {
        let mut payload = incoming.payload.clone();

        for committed in Self::unseen(incoming, log) {
            if committed.author == incoming.author {
                continue;
            }
            if committed.payload.position <= payload.position {
                payload.position = shift(payload.position, &committed.payload.operation);
            }
        }

        payload
    }
}

fn shift(position: usize, by: &Operation) -> usize {
    match by {
        Operation::Insert { text } => position + crate::unicount::count_chars(text),
        Operation::Delete { length } => position.saturating_sub(*length),
        Operation::Undo | Operation::Redo => position,
    }
}
