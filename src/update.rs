//! Update manager — accumulates component change records between syncs.
//!
//! DESIGN
//! ======
//! Application callbacks record structure and property changes as they mutate
//! the component tree. On each synchronization cycle `drain` yields the
//! ordered, deduplicated batch exactly once and leaves the accumulator empty.
//! Structure records carry the ids removed from the affected subtree so the
//! session's render-state sweep can drop entries for removed descendants.
//!
//! Dedup policy: property records collapse per (component, property), keeping
//! the latest value at the position of the first record; structure records
//! collapse per component, merging removed-descendant sets. Records for
//! distinct targets keep their relative recording order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::component::ComponentId;

// =============================================================================
// CHANGE RECORDS
// =============================================================================

/// Kind of a component change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    StructureChanged,
    PropertyChanged,
}

/// A change being recorded against one component.
#[derive(Debug, Clone)]
pub enum Change {
    /// Children added, removed, or reordered. Carries every id removed from
    /// the subtree (empty for pure add/reorder).
    Structure { removed_descendants: Vec<ComponentId> },
    /// One property value updated.
    Property { name: String, value: serde_json::Value },
}

/// One entry of a drained [`UpdateBatch`].
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRecord {
    pub component_id: ComponentId,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub removed_descendants: Vec<ComponentId>,
}

// =============================================================================
// BATCH
// =============================================================================

/// The ordered change set produced by one application turn. Consumed exactly
/// once by the synchronization protocol.
#[derive(Debug, Default)]
pub struct UpdateBatch {
    pub records: Vec<UpdateRecord>,
}

impl UpdateBatch {
    /// True if any structure record in the batch reports `component` as a
    /// removed target or removed descendant.
    #[must_use]
    pub fn has_removed_descendant(&self, component: ComponentId) -> bool {
        self.records.iter().any(|record| {
            record.kind == ChangeKind::StructureChanged
                && record.removed_descendants.contains(&component)
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// =============================================================================
// MANAGER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Structure(ComponentId),
    Property(ComponentId, String),
}

/// Accumulator of change records for one session.
#[derive(Debug, Default)]
pub struct UpdateManager {
    records: Vec<UpdateRecord>,
    index: HashMap<DedupKey, usize>,
}

impl UpdateManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change against a component, deduplicating against earlier
    /// records in the same accumulation window.
    pub fn record_change(&mut self, component_id: ComponentId, change: Change) {
        match change {
            Change::Structure { removed_descendants } => {
                let key = DedupKey::Structure(component_id);
                if let Some(&pos) = self.index.get(&key) {
                    let existing = &mut self.records[pos].removed_descendants;
                    for id in removed_descendants {
                        if !existing.contains(&id) {
                            existing.push(id);
                        }
                    }
                } else {
                    self.index.insert(key, self.records.len());
                    self.records.push(UpdateRecord {
                        component_id,
                        kind: ChangeKind::StructureChanged,
                        property: None,
                        value: None,
                        removed_descendants,
                    });
                }
            }
            Change::Property { name, value } => {
                let key = DedupKey::Property(component_id, name.clone());
                if let Some(&pos) = self.index.get(&key) {
                    self.records[pos].value = Some(value);
                } else {
                    self.index.insert(key, self.records.len());
                    self.records.push(UpdateRecord {
                        component_id,
                        kind: ChangeKind::PropertyChanged,
                        property: Some(name),
                        value: Some(value),
                        removed_descendants: Vec::new(),
                    });
                }
            }
        }
    }

    /// Yield the accumulated batch and reset the accumulator. Exactly-once:
    /// a second drain with no intervening records yields an empty batch.
    pub fn drain(&mut self) -> UpdateBatch {
        self.index.clear();
        UpdateBatch { records: std::mem::take(&mut self.records) }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.records.is_empty()
    }
}

#[cfg(test)]
#[path = "update_test.rs"]
mod tests;
