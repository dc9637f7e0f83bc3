//! Layer tree state
//!
//! Client-side mirror of the remote project document, stored as an owned
//! arena of slots addressed by [`NodeKey`] plus an id → key index.
//!
//! ## Identifiers
//!
//! Layers keep the durable backend id. Groups have no id on the backend, so
//! the tree synthesizes `group:<path>` client keys (`#2`, `#3`... appended on
//! collisions). Those keys never leave the client:
//! [`LayerTree::remote_identifier`] is the only place that maps a node to its
//! backend address (groups by name, layers by id).
//!
//! ## Lifecycle
//!
//! Built from a full fetch, mutated in place by the sync engine, replaced
//! wholesale on refetch. Expanded groups and the active layer survive a
//! replacement when their ids still exist.

mod node;
mod view;

use std::collections::{BTreeSet, HashMap};

use layer_types::{ObjectType, ProjectNode, ProjectTree};
use serde::{Deserialize, Serialize};

use crate::error::TreeError;

pub use node::{LayerNode, NodeKey, NodeKind, SourceKind};
pub use view::TreeView;

// ============================================================================
// Drop targets
// ============================================================================

/// Where a dragged node is dropped
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum DropTarget {
    /// Main level drop zone; the node is appended to the root list
    Root,
    /// A node, by client id
    Node(String),
}

impl DropTarget {
    pub fn node(id: impl Into<String>) -> Self {
        Self::Node(id.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPosition {
    Before,
    After,
    /// First child of a group
    Inside,
}

impl std::fmt::Display for DropPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Before => write!(f, "before"),
            Self::After => write!(f, "after"),
            Self::Inside => write!(f, "inside"),
        }
    }
}

/// Resolved destination of a move: parent (None = root) and index in the
/// parent's children after the dragged node has been detached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub parent: Option<NodeKey>,
    pub index: usize,
}

/// Backend address of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentifier {
    pub object_type: ObjectType,
    pub object_id: String,
}

// ============================================================================
// Arena
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    node: LayerNode,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerTree {
    slots: Vec<Slot>,
    roots: Vec<NodeKey>,
    index: HashMap<String, NodeKey>,
    expanded: BTreeSet<String>,
    active: Option<String>,
}

impl LayerTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the backend document; fails on a repeated layer id
    pub fn from_project(project: &ProjectTree) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        tree.roots = tree.insert_nodes(&project.children, None, "")?;
        tracing::debug!(nodes = tree.slots.len(), "built layer tree");
        Ok(tree)
    }

    fn insert_nodes(
        &mut self,
        nodes: &[ProjectNode],
        parent: Option<NodeKey>,
        path: &str,
    ) -> Result<Vec<NodeKey>, TreeError> {
        let mut keys = Vec::with_capacity(nodes.len());
        for project_node in nodes {
            let node_path = if path.is_empty() {
                project_node.name.clone()
            } else {
                format!("{}/{}", path, project_node.name)
            };

            let id = if project_node.node_type.is_group() {
                self.unique_group_id(&node_path)
            } else {
                let id = match &project_node.id {
                    Some(id) if !id.is_empty() => id.clone(),
                    _ => {
                        tracing::warn!(layer = %project_node.name, "layer without id, using its name");
                        project_node.name.clone()
                    }
                };
                if self.index.contains_key(&id) {
                    return Err(TreeError::DuplicateLayerId(id));
                }
                id
            };

            let key = NodeKey(self.slots.len());
            self.slots.push(Slot {
                node: LayerNode::from_project(project_node, id.clone()),
                parent,
                children: Vec::new(),
            });
            self.index.insert(id, key);

            if project_node.node_type.is_group() {
                let children = self.insert_nodes(&project_node.children, Some(key), &node_path)?;
                self.slots[key.0].children = children;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    fn unique_group_id(&self, path: &str) -> String {
        let base = format!("group:{}", path);
        if !self.index.contains_key(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}#{}", base, n);
            if !self.index.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    pub fn get(&self, key: NodeKey) -> Option<&LayerNode> {
        self.slots.get(key.0).map(|slot| &slot.node)
    }

    pub fn key_of(&self, id: &str) -> Option<NodeKey> {
        self.index.get(id).copied()
    }

    /// Node by client id
    pub fn node(&self, id: &str) -> Option<&LayerNode> {
        self.key_of(id).and_then(|key| self.get(key))
    }

    /// Key of `id` or [`TreeError::NodeNotFound`]
    pub fn resolve(&self, id: &str) -> Result<NodeKey, TreeError> {
        self.key_of(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.slots.get(key.0).and_then(|slot| slot.parent)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.slots
            .get(key.0)
            .map(|slot| slot.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    /// Child list of `parent`, the root list for `None`
    pub fn siblings(&self, parent: Option<NodeKey>) -> &[NodeKey] {
        match parent {
            Some(key) => self.children(key),
            None => &self.roots,
        }
    }

    fn siblings_mut(&mut self, parent: Option<NodeKey>) -> &mut Vec<NodeKey> {
        match parent {
            Some(key) => &mut self.slots[key.0].children,
            None => &mut self.roots,
        }
    }

    /// True if `ancestor` is a proper ancestor of `key`
    pub fn is_ancestor(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        let mut current = self.parent(key);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// `key` and all its descendants, pre-order
    pub fn subtree(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key];
        while let Some(next) = stack.pop() {
            if self.get(next).is_none() {
                continue;
            }
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Every layer, depth-first top to bottom
    pub fn layer_order(&self) -> Vec<NodeKey> {
        self.roots
            .iter()
            .flat_map(|root| self.subtree(*root))
            .filter(|key| self.get(*key).is_some_and(|n| !n.is_group()))
            .collect()
    }

    /// First layer (depth-first) with exactly this name
    pub fn find_layer_by_name(&self, name: &str) -> Option<NodeKey> {
        self.layer_order()
            .into_iter()
            .find(|key| self.get(*key).is_some_and(|n| n.name == name))
    }

    /// First group (depth-first) with exactly this name
    pub fn find_group_by_name(&self, name: &str) -> Option<NodeKey> {
        self.roots
            .iter()
            .flat_map(|root| self.subtree(*root))
            .find(|key| self.get(*key).is_some_and(|n| n.is_group() && n.name == name))
    }

    // ------------------------------------------------------------------------
    // Remote addressing
    // ------------------------------------------------------------------------

    /// Backend address: groups by name, layers by durable id
    ///
    /// Two groups sharing a name are indistinguishable to the backend.
    pub fn remote_identifier(&self, key: NodeKey) -> Option<RemoteIdentifier> {
        let node = self.get(key)?;
        Some(match node.kind {
            NodeKind::Group => RemoteIdentifier {
                object_type: ObjectType::Group,
                object_id: node.name.clone(),
            },
            NodeKind::Layer => RemoteIdentifier {
                object_type: ObjectType::Layer,
                object_id: node.id.clone(),
            },
        })
    }

    /// Parent group name as the backend expects it, `""` for the root list
    pub fn remote_parent_name(&self, parent: Option<NodeKey>) -> String {
        parent
            .and_then(|key| self.get(key))
            .map(|node| node.name.clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Reorder
    // ------------------------------------------------------------------------

    /// Resolve a drop into `(parent, index)` without changing the tree
    ///
    /// Rejects drops onto the dragged node or into its subtree, and `Inside`
    /// drops on layers. When the dragged node moves forward within its own
    /// sibling list the index is shifted left by one for its removal.
    pub fn placement(
        &self,
        dragged: NodeKey,
        target: &DropTarget,
        position: DropPosition,
    ) -> Result<Placement, TreeError> {
        let dragged_node = self
            .get(dragged)
            .ok_or_else(|| TreeError::NodeNotFound(dragged.to_string()))?;

        let (parent, raw_index) = match target {
            DropTarget::Root => (None, self.roots.len()),
            DropTarget::Node(target_id) => {
                let target_key = self.resolve(target_id)?;
                if target_key == dragged || self.is_ancestor(dragged, target_key) {
                    return Err(TreeError::CyclicMove {
                        dragged: dragged_node.id.clone(),
                        target: target_id.clone(),
                    });
                }
                match position {
                    DropPosition::Inside => {
                        if self.get(target_key).is_some_and(|n| !n.is_group()) {
                            return Err(TreeError::NotAGroup(target_id.clone()));
                        }
                        (Some(target_key), 0)
                    }
                    DropPosition::Before | DropPosition::After => {
                        let parent = self.parent(target_key);
                        let target_index = self
                            .siblings(parent)
                            .iter()
                            .position(|k| *k == target_key)
                            .ok_or_else(|| TreeError::NodeNotFound(target_id.clone()))?;
                        let index = match position {
                            DropPosition::After => target_index + 1,
                            _ => target_index,
                        };
                        (parent, index)
                    }
                }
            }
        };

        let current_parent = self.parent(dragged);
        let index = if current_parent == parent {
            match self.siblings(parent).iter().position(|k| *k == dragged) {
                Some(current) if current < raw_index => raw_index - 1,
                _ => raw_index,
            }
        } else {
            raw_index
        };

        Ok(Placement { parent, index })
    }

    /// Move `dragged` to the resolved drop location
    pub fn move_node(
        &mut self,
        dragged: NodeKey,
        target: &DropTarget,
        position: DropPosition,
    ) -> Result<Placement, TreeError> {
        let placement = self.placement(dragged, target, position)?;
        self.place(dragged, placement.parent, placement.index)
    }

    /// Current parent and sibling index of a node
    pub fn position_of(&self, key: NodeKey) -> Option<Placement> {
        self.get(key)?;
        let parent = self.parent(key);
        let index = self.siblings(parent).iter().position(|k| *k == key)?;
        Some(Placement { parent, index })
    }

    /// Detach `key` and insert it at `index` under `parent` (None = root)
    ///
    /// The index is clamped to the destination list after detaching.
    pub fn place(
        &mut self,
        key: NodeKey,
        parent: Option<NodeKey>,
        index: usize,
    ) -> Result<Placement, TreeError> {
        let node = self
            .get(key)
            .ok_or_else(|| TreeError::NodeNotFound(key.to_string()))?;
        if let Some(parent_key) = parent {
            let parent_node = self
                .get(parent_key)
                .ok_or_else(|| TreeError::NodeNotFound(parent_key.to_string()))?;
            if !parent_node.is_group() {
                return Err(TreeError::NotAGroup(parent_node.id.clone()));
            }
            if parent_key == key || self.is_ancestor(key, parent_key) {
                return Err(TreeError::CyclicMove {
                    dragged: node.id.clone(),
                    target: parent_node.id.clone(),
                });
            }
        }

        let old_parent = self.parent(key);
        self.siblings_mut(old_parent).retain(|k| *k != key);

        let siblings = self.siblings_mut(parent);
        let index = index.min(siblings.len());
        siblings.insert(index, key);
        self.slots[key.0].parent = parent;

        Ok(Placement { parent, index })
    }

    // ------------------------------------------------------------------------
    // Presentation state
    // ------------------------------------------------------------------------

    /// Set one node's visibility, returning the previous value
    pub fn set_visible(&mut self, key: NodeKey, visible: bool) -> Option<bool> {
        let node = &mut self.slots.get_mut(key.0)?.node;
        Some(std::mem::replace(&mut node.visible, visible))
    }

    /// Set `key` and every descendant to `visible`; returns the nodes touched
    pub fn cascade_visibility(&mut self, key: NodeKey, visible: bool) -> usize {
        let keys = self.subtree(key);
        for k in &keys {
            self.slots[k.0].node.visible = visible;
        }
        keys.len()
    }

    /// Set opacity clamped to `0.0..=1.0`, returning the previous value
    pub fn set_opacity(&mut self, key: NodeKey, opacity: f32) -> Option<f32> {
        let node = &mut self.slots.get_mut(key.0)?.node;
        Some(std::mem::replace(&mut node.opacity, opacity.clamp(0.0, 1.0)))
    }

    pub fn expanded(&self, key: NodeKey) -> bool {
        self.get(key)
            .is_some_and(|node| self.expanded.contains(&node.id))
    }

    /// Flip a group's expansion; returns the new state (layers never expand)
    pub fn toggle_expanded(&mut self, key: NodeKey) -> bool {
        let Some(node) = self.get(key) else {
            return false;
        };
        if !node.is_group() {
            return false;
        }
        let id = node.id.clone();
        if self.expanded.remove(&id) {
            false
        } else {
            self.expanded.insert(id);
            true
        }
    }

    pub fn expand_all(&mut self) {
        self.expanded = self
            .slots
            .iter()
            .filter(|slot| slot.node.is_group())
            .map(|slot| slot.node.id.clone())
            .collect();
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    pub fn active_layer(&self) -> Option<NodeKey> {
        self.active.as_deref().and_then(|id| self.key_of(id))
    }

    /// Select the active layer; groups are rejected with `false`
    pub fn set_active_layer(&mut self, key: Option<NodeKey>) -> bool {
        match key {
            None => {
                self.active = None;
                true
            }
            Some(key) => match self.get(key) {
                Some(node) if !node.is_group() => {
                    self.active = Some(node.id.clone());
                    true
                }
                _ => false,
            },
        }
    }

    /// Replace the structure with a freshly fetched tree
    ///
    /// Expanded groups and the active layer carry over when their ids exist
    /// in `next`.
    pub fn replace(&mut self, next: LayerTree) {
        let expanded = std::mem::take(&mut self.expanded);
        let active = self.active.take();
        *self = next;
        self.expanded = expanded
            .into_iter()
            .filter(|id| self.index.contains_key(id))
            .collect();
        self.active = active.filter(|id| self.index.contains_key(id));
    }

    /// Convert back to the backend document shape
    pub fn to_project(&self) -> ProjectTree {
        ProjectTree::new(self.roots.iter().map(|k| self.to_project_node(*k)).collect())
    }

    fn to_project_node(&self, key: NodeKey) -> ProjectNode {
        let slot = &self.slots[key.0];
        let node = &slot.node;
        let node_type = match (node.kind, node.source_kind) {
            (NodeKind::Group, _) => layer_types::NodeType::Group,
            (NodeKind::Layer, Some(SourceKind::Raster)) => layer_types::NodeType::RasterLayer,
            (NodeKind::Layer, Some(SourceKind::Tiled)) => layer_types::NodeType::WmsLayer,
            (NodeKind::Layer, _) => layer_types::NodeType::VectorLayer,
        };
        ProjectNode {
            node_type,
            name: node.name.clone(),
            id: (!node.is_group()).then(|| node.id.clone()),
            visible: node.visible,
            opacity: (!node.is_group()).then(|| f64::from(node.opacity) * 255.0),
            extent: node.extent.map(|e| e.to_vec()).unwrap_or_default(),
            geometry: node.geometry.clone(),
            children: slot
                .children
                .iter()
                .map(|k| self.to_project_node(*k))
                .collect(),
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn position() -> impl Strategy<Value = DropPosition> {
        prop_oneof![Just(DropPosition::Before), Just(DropPosition::After)]
    }

    proptest! {
        #[test]
        fn prop_sibling_move_is_a_permutation(
            len in 2usize..12,
            from_seed in any::<usize>(),
            to_seed in any::<usize>(),
            position in position(),
        ) {
            let ids: Vec<String> = (0..len).map(|i| format!("l{}", i)).collect();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            let mut tree = tests::flat(&refs);

            let from = from_seed % len;
            let to = to_seed % len;
            prop_assume!(from != to);

            let dragged = tree.resolve(&ids[from]).unwrap();
            let placement = tree
                .move_node(dragged, &DropTarget::node(ids[to].clone()), position)
                .unwrap();

            let order: Vec<String> = tree.roots().iter().map(|k| tree.get(*k).unwrap().id.clone()).collect();
            prop_assert_eq!(order.len(), len);
            prop_assert_eq!(&order[placement.index], &ids[from]);

            // dragged lands directly beside the target
            let target_at = order.iter().position(|id| id == &ids[to]).unwrap();
            match position {
                DropPosition::Before => prop_assert_eq!(target_at, placement.index + 1),
                _ => prop_assert_eq!(target_at + 1, placement.index),
            }

            // everyone else keeps their relative order
            let rest: Vec<&String> = order.iter().filter(|id| *id != &ids[from]).collect();
            let expected: Vec<&String> = ids.iter().filter(|id| *id != &ids[from]).collect();
            prop_assert_eq!(rest, expected);
        }
    }
}
