//! Deferred parent/child links.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Children waiting for a parent record that has not been indexed yet.
///
/// Created when a child names a missing parent and consumed when the parent arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HangingRelationship {
    /// The missing parent.
    pub parent_id: u64,
    /// Children that declared the parent.
    pub children: BTreeSet<u64>,
    /// Upstream lookups that came back without the parent.
    #[serde(default)]
    pub misses: u32,
}

impl HangingRelationship {
    /// Creates a hanging relationship with a single waiting child.
    pub fn new(parent_id: u64, child_id: u64) -> Self {
        Self {
            parent_id,
            children: BTreeSet::from([child_id]),
            misses: 0,
        }
    }

    /// Records another waiting child.
    pub fn add_child(&mut self, child_id: u64) {
        self.children.insert(child_id);
    }

    /// Drops a child that no longer points at this parent. Returns true when none remain.
    pub fn remove_child(&mut self, child_id: u64) -> bool {
        self.children.remove(&child_id);
        self.children.is_empty()
    }
}
