//! Nested render view of the layer tree

use serde::Serialize;

use super::{LayerTree, NodeKey, NodeKind, SourceKind};

/// One node of the nested view handed to the layer panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeView {
    pub key: NodeKey,
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub visible: bool,
    pub opacity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<SourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    pub expanded: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeView>,
}

impl TreeView {
    /// Depth-first count of nodes in this view
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeView::count).sum::<usize>()
    }
}

impl LayerTree {
    /// Whole tree as nested views, root list order
    pub fn to_nested(&self) -> Vec<TreeView> {
        self.roots()
            .iter()
            .filter_map(|key| self.view(*key, &|_| true))
            .collect()
    }

    /// Nodes whose name contains `term` (case-insensitive) plus their
    /// ancestors; a matching group keeps all its children
    pub fn filter_by_name(&self, term: &str) -> Vec<TreeView> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return self.to_nested();
        }
        self.roots()
            .iter()
            .filter_map(|key| self.filtered_view(*key, &term))
            .collect()
    }

    fn filtered_view(&self, key: NodeKey, term: &str) -> Option<TreeView> {
        let node = self.get(key)?;
        let children: Vec<TreeView> = self
            .children(key)
            .iter()
            .filter_map(|child| self.filtered_view(*child, term))
            .collect();

        if node.name.to_lowercase().contains(term) {
            let mut view = self.view(key, &|_| true)?;
            if !children.is_empty() {
                view.children = children;
            }
            Some(view)
        } else if !children.is_empty() {
            let mut view = self.view(key, &|_| false)?;
            view.children = children;
            Some(view)
        } else {
            None
        }
    }

    /// Layers of one source kind plus the groups that contain them
    pub fn filter_by_source_kind(&self, kind: SourceKind) -> Vec<TreeView> {
        let keep = |key: NodeKey| {
            self.subtree(key)
                .into_iter()
                .any(|k| self.get(k).is_some_and(|n| n.source_kind == Some(kind)))
        };
        self.roots()
            .iter()
            .filter(|key| keep(**key))
            .filter_map(|key| self.view(*key, &keep))
            .collect()
    }

    /// View of `key` with the children accepted by `include`
    fn view(&self, key: NodeKey, include: &dyn Fn(NodeKey) -> bool) -> Option<TreeView> {
        let node = self.get(key)?;
        Some(TreeView {
            key,
            id: node.id.clone(),
            name: node.name.clone(),
            kind: node.kind,
            visible: node.visible,
            opacity: node.opacity,
            source_kind: node.source_kind,
            geometry: node.geometry.clone(),
            expanded: self.expanded(key),
            active: self.active_layer() == Some(key),
            children: self
                .children(key)
                .iter()
                .filter(|child| include(**child))
                .filter_map(|child| self.view(*child, include))
                .collect(),
        })
    }
}
