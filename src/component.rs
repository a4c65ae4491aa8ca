//! Component tree — the server-side UI node hierarchy.
//!
//! DESIGN
//! ======
//! A mutable ownership tree of UI nodes, owned by a `UserSession`. Nodes are
//! stored flat in a registry keyed by render id; parent/child links are ids,
//! not references. The tree itself has no synchronization logic — it is a
//! collaborator data structure mutated only while the session's cycle lock is
//! held.
//!
//! Render ids are numeric and unique within the tree. The client-visible form
//! prefixes them with `"C."`; reversing that mapping fails explicitly when the
//! remainder does not resolve to a registered component, since a stale client
//! reference indicates a desync rather than something to ignore.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Marker prefixed to server render ids to form client render ids.
pub const CLIENT_RENDER_ID_PREFIX: &str = "C.";

/// Server-side component identity, unique within one tree.
pub type ComponentId = u64;

// =============================================================================
// ERRORS
// =============================================================================

/// A client-supplied render id did not resolve to a live, registered
/// component. Indicates a desync between client and server views.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid client render id: {0}")]
pub struct InvalidRenderId(pub String);

// =============================================================================
// NODE
// =============================================================================

/// One UI node. Leaf data holder — rendering semantics live elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentNode {
    pub id: ComponentId,
    /// Component kind tag, e.g. `"button"` or `"text_field"`.
    pub kind: String,
    pub parent: Option<ComponentId>,
    pub children: Vec<ComponentId>,
    /// Local visibility flag. Render visibility is transitive over ancestors.
    pub visible: bool,
    pub properties: HashMap<String, serde_json::Value>,
}

// =============================================================================
// TREE
// =============================================================================

/// Flat registry of nodes plus the root pointer.
#[derive(Debug, Default)]
pub struct ComponentTree {
    nodes: HashMap<ComponentId, ComponentNode>,
    root: Option<ComponentId>,
    next_id: ComponentId,
}

impl ComponentTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the root component. Replaces any existing root.
    pub fn create_root(&mut self, kind: impl Into<String>) -> ComponentId {
        let id = self.allocate_id();
        self.nodes.insert(
            id,
            ComponentNode {
                id,
                kind: kind.into(),
                parent: None,
                children: Vec::new(),
                visible: true,
                properties: HashMap::new(),
            },
        );
        self.root = Some(id);
        id
    }

    /// Create a component under `parent`. Returns `None` if the parent is not
    /// registered.
    pub fn add_child(&mut self, parent: ComponentId, kind: impl Into<String>) -> Option<ComponentId> {
        if !self.nodes.contains_key(&parent) {
            return None;
        }
        let id = self.allocate_id();
        self.nodes.insert(
            id,
            ComponentNode {
                id,
                kind: kind.into(),
                parent: Some(parent),
                children: Vec::new(),
                visible: true,
                properties: HashMap::new(),
            },
        );
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(id);
        }
        Some(id)
    }

    /// Remove a component and its entire subtree. Returns the removed ids,
    /// the target first. Removing an unregistered id yields an empty vec
    /// (already-removed is not a fault).
    pub fn remove(&mut self, id: ComponentId) -> Vec<ComponentId> {
        let Some(parent) = self.nodes.get(&id).map(|node| node.parent) else {
            return Vec::new();
        };
        if let Some(parent) = parent {
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.children.retain(|child| *child != id);
            }
        }
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                removed.push(current);
                stack.extend(node.children);
            }
        }
        if self.root == Some(id) {
            self.root = None;
        }
        removed
    }

    pub fn set_visible(&mut self, id: ComponentId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.visible = visible;
        }
    }

    /// Set a property value, returning the previous value if any.
    pub fn set_property(
        &mut self,
        id: ComponentId,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.nodes
            .get_mut(&id)
            .and_then(|node| node.properties.insert(name.into(), value))
    }

    #[must_use]
    pub fn get(&self, id: ComponentId) -> Option<&ComponentNode> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn root(&self) -> Option<ComponentId> {
        self.root
    }

    #[must_use]
    pub fn is_registered(&self, id: ComponentId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// A component is render-visible only if it and every ancestor are
    /// visible and registered.
    #[must_use]
    pub fn is_render_visible(&self, id: ComponentId) -> bool {
        let mut current = id;
        loop {
            let Some(node) = self.nodes.get(&current) else {
                return false;
            };
            if !node.visible {
                return false;
            }
            match node.parent {
                Some(parent) => current = parent,
                None => return true,
            }
        }
    }

    /// Ids of all registered components, in no particular order.
    #[must_use]
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.nodes.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn allocate_id(&mut self) -> ComponentId {
        self.next_id += 1;
        self.next_id
    }

    // =========================================================================
    // CLIENT RENDER IDS
    // =========================================================================

    /// Resolve a client render id (`"C.42"`) back to the registered
    /// component.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRenderId`] if the prefix is missing, the suffix does
    /// not parse, or no registered component carries the id.
    pub fn component_by_client_render_id(&self, client_id: &str) -> Result<ComponentId, InvalidRenderId> {
        let suffix = client_id
            .strip_prefix(CLIENT_RENDER_ID_PREFIX)
            .ok_or_else(|| InvalidRenderId(client_id.to_string()))?;
        let id: ComponentId = suffix
            .parse()
            .map_err(|_| InvalidRenderId(client_id.to_string()))?;
        if !self.nodes.contains_key(&id) {
            return Err(InvalidRenderId(client_id.to_string()));
        }
        Ok(id)
    }
}

/// Derive the client-visible render id for a component.
#[must_use]
pub fn client_render_id(id: ComponentId) -> String {
    format!("{CLIENT_RENDER_ID_PREFIX}{id}")
}

#[cfg(test)]
#[path = "component_test.rs"]
mod tests;
