//! Author identities and the per-author causal counters (`Origin`).
//!
//! The author set is closed: every algorithm in this crate iterates
//! [`Author::ALL`] and indexes counters through [`Author::index`], so widening
//! the set to N authors only touches this file.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the fixed editing identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    Alice,
    Bob,
}

impl Author {
    /// Width of the causal clock.
    pub const COUNT: usize = 2;

    /// Every author, in counter order.
    pub const ALL: [Author; Author::COUNT] = [Author::Alice, Author::Bob];

    /// Slot of this author inside an [`Origin`].
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Author::Alice => 0,
            Author::Bob => 1,
        }
    }

    /// Author occupying slot `seat % COUNT`.
    pub fn from_seat(seat: u64) -> Self {
        Author::ALL[(seat % Author::COUNT as u64) as usize]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Author::Alice => "alice",
            Author::Bob => "bob",
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-author commit counters.
///
/// Serialized as a map (`{"alice": 1, "bob": 0}`) so the wire shape does not
/// depend on the counter layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Author, u64>", into = "BTreeMap<Author, u64>")]
pub struct Origin {
    counters: [u64; Author::COUNT],
}

impl Origin {
    /// All counters at zero.
    pub const ZERO: Origin = Origin { counters: [0; Author::COUNT] };

    /// Counter for `author`.
    #[inline]
    pub fn get(&self, author: Author) -> u64 {
        self.counters[author.index()]
    }

    /// Copy of `self` with `author`'s counter set to `count`.
    pub fn with(mut self, author: Author, count: u64) -> Self {
        self.counters[author.index()] = count;
        self
    }

    /// Bump `author`'s counter by one.
    #[inline]
    pub fn increment(&mut self, author: Author) {
        self.counters[author.index()] += 1;
    }

    /// Copy of `self` with `author`'s counter bumped by one.
    pub fn advanced(mut self, author: Author) -> Self {
        self.increment(author);
        self
    }

    /// True when every counter of `self` is `<=` the matching counter of `other`.
    pub fn dominated_by(&self, other: &Origin) -> bool {
        Author::ALL
            .iter()
            .all(|&author| self.get(author) <= other.get(author))
    }

    /// Pointwise maximum.
    pub fn merge(&mut self, other: &Origin) {
        for author in Author::ALL {
            let slot = &mut self.counters[author.index()];
            *slot = (*slot).max(other.get(author));
        }
    }

    /// Number of commits this origin accounts for.
    pub fn total(&self) -> u64 {
        self.counters.iter().sum()
    }
}

impl From<BTreeMap<Author, u64>> for Origin {
    fn from(map: BTreeMap<Author, u64>) -> Self {
        map.into_iter()
            .fold(Origin::ZERO, |origin, (author, count)| origin.with(author, count))
    }
}

impl From<Origin> for BTreeMap<Author, u64> {
    fn from(origin: Origin) -> Self {
        Author::ALL
            .iter()
            .map(|&author| (author, origin.get(author)))
            .collect()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, author) in Author::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", author, self.get(*author))?;
        }
        f.write_str("}")
    }
}
