//! In-process project backend
//!
//! Holds project trees in memory and applies every mutation the way the real
//! service does, so a refetch after a confirmed call reflects it. Every call
//! is recorded; failures can be queued per operation; a gate can hold
//! mutating calls open so callers can observe optimistic state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use layer_types::{
    AddGroupRequest, AddLayerRequest, FeatureCollection, LayerSelectionRequest, ObjectType,
    ProjectNode, ProjectTree, RemoveNodesRequest, RenameGroupRequest, SelectedFeaturesRequest,
    TreeOrderRequest,
};
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use super::{ImportFormat, ImportPayload, ProjectBackend};
use crate::error::{BackendError, BackendResult};

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    FetchTree(String),
    ChangeOrder(TreeOrderRequest),
    SetLayerVisibility(LayerSelectionRequest),
    RemoveNodes(RemoveNodesRequest),
    ImportLayer(ImportPayload),
    AddLayer(AddLayerRequest),
    AddGroup(AddGroupRequest),
    RenameGroup(RenameGroupRequest),
    SelectedFeatures(SelectedFeaturesRequest),
}

impl BackendCall {
    /// Operation name, as used by [`InMemoryProjectBackend::fail_next`]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::FetchTree(_) => "fetch_tree",
            Self::ChangeOrder(_) => "change_order",
            Self::SetLayerVisibility(_) => "set_layer_visibility",
            Self::RemoveNodes(_) => "remove_nodes",
            Self::ImportLayer(_) => "import_layer",
            Self::AddLayer(_) => "add_layer",
            Self::AddGroup(_) => "add_group",
            Self::RenameGroup(_) => "rename_group",
            Self::SelectedFeatures(_) => "selected_features",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::FetchTree(_) | Self::SelectedFeatures(_))
    }
}

/// Queued failure: HTTP status plus optional backend message
type QueuedFailure = (u16, Option<String>);

pub struct InMemoryProjectBackend {
    projects: RwLock<HashMap<String, ProjectTree>>,
    /// Feature sets keyed by layer id, EPSG:3857
    features: RwLock<HashMap<String, FeatureCollection>>,
    calls: RwLock<Vec<BackendCall>>,
    failures: RwLock<HashMap<&'static str, VecDeque<QueuedFailure>>>,
    gate: RwLock<Option<Arc<Notify>>>,
}

impl InMemoryProjectBackend {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            features: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
            failures: RwLock::new(HashMap::new()),
            gate: RwLock::new(None),
        }
    }

    pub fn with_project(project: impl Into<String>, tree: ProjectTree) -> Self {
        let mut projects = HashMap::new();
        projects.insert(project.into(), tree);
        Self {
            projects: RwLock::new(projects),
            ..Self::new()
        }
    }

    pub async fn set_project(&self, project: impl Into<String>, tree: ProjectTree) {
        self.projects.write().await.insert(project.into(), tree);
    }

    pub async fn project(&self, project: &str) -> Option<ProjectTree> {
        self.projects.read().await.get(project).cloned()
    }

    pub async fn set_features(&self, layer_id: impl Into<String>, features: FeatureCollection) {
        self.features.write().await.insert(layer_id.into(), features);
    }

    /// Fail the next call of `operation` (see [`BackendCall::operation`])
    pub async fn fail_next(&self, operation: &'static str, status: u16, message: Option<&str>) {
        self.failures
            .write()
            .await
            .entry(operation)
            .or_default()
            .push_back((status, message.map(str::to_string)));
    }

    /// Hold mutating calls until `gate` is notified
    pub async fn set_gate(&self, gate: Option<Arc<Notify>>) {
        *self.gate.write().await = gate;
    }

    pub async fn calls(&self) -> Vec<BackendCall> {
        self.calls.read().await.clone()
    }

    /// Recorded calls that would change the remote project
    pub async fn mutations(&self) -> Vec<BackendCall> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    /// Record the call, wait on the gate, then pop a queued failure
    async fn enter(&self, call: BackendCall) -> BackendResult<()> {
        let operation = call.operation();
        let mutation = call.is_mutation();
        self.calls.write().await.push(call);

        if mutation {
            let gate = self.gate.read().await.clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        }

        let failure = self
            .failures
            .write()
            .await
            .get_mut(operation)
            .and_then(VecDeque::pop_front);
        match failure {
            Some((status, message)) => {
                tracing::debug!(operation, status, "injected backend failure");
                Err(BackendError::Status { status, message })
            }
            None => Ok(()),
        }
    }

    async fn with_tree<T>(
        &self,
        project: &str,
        apply: impl FnOnce(&mut Vec<ProjectNode>) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let mut projects = self.projects.write().await;
        let tree = projects.get_mut(project).ok_or_else(|| not_found("Project not found"))?;
        apply(&mut tree.children)
    }
}

impl Default for InMemoryProjectBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tree editing helpers
// ============================================================================

fn not_found(message: &str) -> BackendError {
    BackendError::Status {
        status: 404,
        message: Some(message.to_string()),
    }
}

fn is_group_named(node: &ProjectNode, name: &str) -> bool {
    node.node_type.is_group() && node.name == name
}

fn is_layer_with_id(node: &ProjectNode, id: &str) -> bool {
    !node.node_type.is_group() && node.id.as_deref() == Some(id)
}

fn find_mut<'a>(
    nodes: &'a mut [ProjectNode],
    pred: &dyn Fn(&ProjectNode) -> bool,
) -> Option<&'a mut ProjectNode> {
    for node in nodes.iter_mut() {
        if pred(node) {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.children, pred) {
            return Some(found);
        }
    }
    None
}

fn take_node(
    nodes: &mut Vec<ProjectNode>,
    pred: &dyn Fn(&ProjectNode) -> bool,
) -> Option<ProjectNode> {
    if let Some(pos) = nodes.iter().position(|n| pred(n)) {
        return Some(nodes.remove(pos));
    }
    nodes
        .iter_mut()
        .find_map(|node| take_node(&mut node.children, pred))
}

fn remove_all(nodes: &mut Vec<ProjectNode>, pred: &dyn Fn(&ProjectNode) -> bool) -> usize {
    let before = nodes.len();
    nodes.retain(|n| !pred(n));
    let mut removed = before - nodes.len();
    for node in nodes.iter_mut() {
        removed += remove_all(&mut node.children, pred);
    }
    removed
}

/// Child list of the group named `parent`, the root list for `""`
fn parent_list<'a>(
    roots: &'a mut Vec<ProjectNode>,
    parent: &str,
) -> BackendResult<&'a mut Vec<ProjectNode>> {
    if parent.is_empty() {
        return Ok(roots);
    }
    find_mut(roots, &|n| is_group_named(n, parent))
        .map(|group| &mut group.children)
        .ok_or_else(|| not_found("Parent group not found"))
}

#[async_trait]
impl ProjectBackend for InMemoryProjectBackend {
    async fn fetch_tree(&self, project: &str) -> BackendResult<ProjectTree> {
        self.enter(BackendCall::FetchTree(project.to_string())).await?;
        self.project(project)
            .await
            .ok_or_else(|| not_found("Project not found"))
    }

    async fn change_order(&self, request: &TreeOrderRequest) -> BackendResult<()> {
        self.enter(BackendCall::ChangeOrder(request.clone())).await?;
        self.with_tree(&request.project, |roots| {
            let id = request.object_id.as_str();
            let node = match request.object_type {
                ObjectType::Group => take_node(roots, &|n| is_group_named(n, id)),
                ObjectType::Layer => take_node(roots, &|n| is_layer_with_id(n, id)),
            }
            .ok_or_else(|| not_found("Object not found"))?;

            let siblings = parent_list(roots, &request.new_parent_name)?;
            let index = request.position.min(siblings.len());
            siblings.insert(index, node);
            Ok(())
        })
        .await
    }

    async fn set_layer_visibility(&self, request: &LayerSelectionRequest) -> BackendResult<()> {
        self.enter(BackendCall::SetLayerVisibility(request.clone()))
            .await?;
        self.with_tree(&request.project, |roots| {
            let layer = find_mut(roots, &|n| is_layer_with_id(n, &request.layer_id))
                .ok_or_else(|| not_found("Layer not found"))?;
            layer.visible = request.checked;
            Ok(())
        })
        .await
    }

    async fn remove_nodes(&self, request: &RemoveNodesRequest) -> BackendResult<()> {
        self.enter(BackendCall::RemoveNodes(request.clone())).await?;
        self.with_tree(&request.project, |roots| {
            let removed = remove_all(roots, &|n| {
                request.groups.iter().any(|g| is_group_named(n, g))
                    || request.layers.iter().any(|l| is_layer_with_id(n, l))
            });
            if removed == 0 {
                return Err(not_found("Nothing to remove"));
            }
            Ok(())
        })
        .await
    }

    async fn import_layer(&self, payload: &ImportPayload) -> BackendResult<()> {
        self.enter(BackendCall::ImportLayer(payload.clone())).await?;
        self.with_tree(&payload.project, |roots| {
            let id = format!("{}_{}", payload.layer_name, Uuid::new_v4().simple());
            let node = match payload.format {
                ImportFormat::GeoTiff => ProjectNode::raster(id, &payload.layer_name),
                _ => ProjectNode::vector(id, &payload.layer_name),
            };
            parent_list(roots, &payload.parent)?.push(node);
            Ok(())
        })
        .await
    }

    async fn add_layer(&self, request: &AddLayerRequest) -> BackendResult<()> {
        self.enter(BackendCall::AddLayer(request.clone())).await?;
        self.with_tree(&request.project, |roots| {
            let id = format!("{}_{}", request.name, Uuid::new_v4().simple());
            let node = ProjectNode::vector(id, &request.name).with_geometry(&request.geometry_type);
            parent_list(roots, &request.parent)?.push(node);
            Ok(())
        })
        .await
    }

    async fn add_group(&self, request: &AddGroupRequest) -> BackendResult<()> {
        self.enter(BackendCall::AddGroup(request.clone())).await?;
        self.with_tree(&request.project, |roots| {
            let siblings = parent_list(roots, &request.parent)?;
            if siblings.iter().any(|n| is_group_named(n, &request.group_name)) {
                return Err(BackendError::Status {
                    status: 400,
                    message: Some(format!("Group '{}' already exists", request.group_name)),
                });
            }
            siblings.push(ProjectNode::group(&request.group_name, Vec::new()));
            Ok(())
        })
        .await
    }

    async fn rename_group(&self, request: &RenameGroupRequest) -> BackendResult<()> {
        self.enter(BackendCall::RenameGroup(request.clone())).await?;
        self.with_tree(&request.project, |roots| {
            let group = find_mut(roots, &|n| is_group_named(n, &request.group_name))
                .ok_or_else(|| not_found("Group not found"))?;
            group.name = request.new_name.clone();
            Ok(())
        })
        .await
    }

    async fn selected_features(
        &self,
        request: &SelectedFeaturesRequest,
    ) -> BackendResult<FeatureCollection> {
        self.enter(BackendCall::SelectedFeatures(request.clone()))
            .await?;
        let features = self.features.read().await;
        let source = features
            .get(&request.layer_id)
            .ok_or_else(|| not_found("Layer not found"))?;

        let selected = source
            .features
            .iter()
            .filter(|feature| {
                let id = feature.id.as_ref().map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
                id.is_some_and(|id| request.label.contains(&id))
            })
            .cloned()
            .collect();

        Ok(FeatureCollection {
            features: selected,
            bbox: None,
            ..source.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use layer_types::NodeType;

    use super::*;

    fn tree() -> ProjectTree {
        ProjectTree::new(vec![
            ProjectNode::group(
                "Base",
                vec![
                    ProjectNode::vector("a", "A"),
                    ProjectNode::vector("b", "B"),
                ],
            ),
            ProjectNode::vector("c", "C"),
        ])
    }

    #[tokio::test]
    async fn test_change_order_moves_into_group() {
        let backend = InMemoryProjectBackend::with_project("demo", tree());
        backend
            .change_order(&TreeOrderRequest {
                project: "demo".into(),
                object_type: ObjectType::Layer,
                object_id: "c".into(),
                new_parent_name: "Base".into(),
                position: 1,
            })
            .await
            .unwrap();

        let project = backend.project("demo").await.unwrap();
        assert_eq!(project.children.len(), 1);
        let ids: Vec<_> = project.children[0]
            .children
            .iter()
            .map(|n| n.id.clone().unwrap())
            .collect();
        assert_eq!(ids, ["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let backend = InMemoryProjectBackend::with_project("demo", tree());
        backend.fail_next("set_layer_visibility", 500, Some("boom")).await;

        let request = LayerSelectionRequest::new("demo", "a", false);
        let err = backend.set_layer_visibility(&request).await.unwrap_err();
        assert_eq!(err.backend_message(), Some("boom"));
        backend.set_layer_visibility(&request).await.unwrap();

        assert_eq!(backend.mutations().await.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_nodes_by_name_and_id() {
        let backend = InMemoryProjectBackend::with_project("demo", tree());
        backend
            .remove_nodes(&RemoveNodesRequest {
                project: "demo".into(),
                groups: vec!["Base".into()],
                layers: vec![],
                remove_from_database: false,
            })
            .await
            .unwrap();
        let project = backend.fetch_tree("demo").await.unwrap();
        assert_eq!(project.children.len(), 1);
        assert_eq!(project.children[0].node_type, NodeType::VectorLayer);
    }

    #[tokio::test]
    async fn test_add_group_rejects_duplicate() {
        let backend = InMemoryProjectBackend::with_project("demo", tree());
        let request = AddGroupRequest {
            project: "demo".into(),
            group_name: "Base".into(),
            parent: String::new(),
        };
        let err = backend.add_group(&request).await.unwrap_err();
        assert!(err.backend_message().unwrap().contains("already exists"));
    }
}
