//! Pending Match Set
//!
//! Unordered list of joinable match ids. Removal scans for the id, moves the
//! last element into its slot and pops, so enumeration order is not stable.
//! Nothing may depend on that order.

use serde::{Serialize, Deserialize};

use super::state::MatchId;

/// Joinable match ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSet {
    ids: Vec<MatchId>,
}

impl PendingSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Append an id.
    pub fn push(&mut self, id: MatchId) {
        self.ids.push(id);
    }

    /// Swap-remove `id`. Returns false when absent.
    pub fn remove(&mut self, id: MatchId) -> bool {
        match self.ids.iter().position(|&pending| pending == id) {
            Some(index) => {
                self.ids.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Membership test.
    pub fn contains(&self, id: MatchId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of pending ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// No pending ids.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Current contents, unordered.
    pub fn as_slice(&self) -> &[MatchId] {
        &self.ids
    }
}
