//! Layer tree sync engine
//!
//! Keeps the client-side [`LayerTree`] consistent with the project backend
//! under optimistic, possibly failing edits.
//!
//! ## Operation lifecycle
//!
//! ```text
//! Idle ──► Optimistic ──► Confirmed ──► Idle
//!   │          └────────► RolledBack ─► Idle
//!   └─(deferred)─► Confirmed | Failed ─► Idle
//! ```
//!
//! | Operation | Local change | On success | On failure |
//! |-----------|--------------|------------|------------|
//! | move | optimistic | keep | [`RollbackPolicy`] |
//! | toggle group | local only | - | - |
//! | toggle layer | optimistic | keep | exact inversion |
//! | delete, import, add, rename | deferred | refetch | untouched |
//!
//! The tree lock is never held across a backend call, so readers observe the
//! optimistic state while the confirmation is in flight.

mod bounds;
mod import;
mod journal;
mod notify;

use std::str::FromStr;
use std::sync::Arc;

use layer_types::{
    AddGroupRequest, AddLayerRequest, ColumnSpec, LayerSelectionRequest, ObjectType,
    RemoveNodesRequest, RenameGroupRequest, SelectedFeaturesRequest, TreeOrderRequest,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::backend::ProjectBackend;
use crate::config::SyncConfig;
use crate::error::{BackendError, SyncError, SyncResult, TreeError};
use crate::tree::{DropPosition, DropTarget, LayerTree, NodeKey, Placement};

pub use bounds::{fit_selection, FitBounds, FIT_DURATION_MS, FIT_MAX_ZOOM, FIT_PADDING};
pub use import::{ImportFile, ImportRequest, DEFAULT_ENCODING, DEFAULT_EPSG};
pub use journal::{Journal, OperationOutcome, OperationSnapshot, PendingOperation};
pub use notify::{Notice, NoticeLevel, Notifier, RecordingNotifier, TracingNotifier};

// ============================================================================
// Operation kinds and policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Move,
    Toggle,
    Delete,
    Import,
    AddLayer,
    AddGroup,
    RenameGroup,
    FeatureLookup,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Move => write!(f, "move"),
            Self::Toggle => write!(f, "visibility toggle"),
            Self::Delete => write!(f, "delete"),
            Self::Import => write!(f, "import"),
            Self::AddLayer => write!(f, "add layer"),
            Self::AddGroup => write!(f, "add group"),
            Self::RenameGroup => write!(f, "rename group"),
            Self::FeatureLookup => write!(f, "feature lookup"),
        }
    }
}

/// How a rejected optimistic move is discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackPolicy {
    /// Replace the tree with a fresh fetch
    Refetch,
    /// Return the moved node to its exact origin
    RestoreSnapshot,
    /// Return the moved node to its origin, then reconcile with a fetch
    #[default]
    RestoreThenRefetch,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown rollback policy '{0}', expected one of: refetch, restore, restore-then-refetch")]
pub struct UnknownRollbackPolicy(pub String);

impl FromStr for RollbackPolicy {
    type Err = UnknownRollbackPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refetch" => Ok(Self::Refetch),
            "restore" | "restore-snapshot" | "snapshot" => Ok(Self::RestoreSnapshot),
            "restore-then-refetch" | "restore+refetch" => Ok(Self::RestoreThenRefetch),
            other => Err(UnknownRollbackPolicy(other.to_string())),
        }
    }
}

impl std::fmt::Display for RollbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refetch => write!(f, "refetch"),
            Self::RestoreSnapshot => write!(f, "restore"),
            Self::RestoreThenRefetch => write!(f, "restore-then-refetch"),
        }
    }
}

/// Empty vector layer to create on the backend
#[derive(Debug, Clone)]
pub struct NewLayer {
    pub name: String,
    /// `Point`, `LineString`, `Polygon`, `MultiPolygon`, ...
    pub geometry_type: String,
    pub columns: Vec<ColumnSpec>,
    /// Client id of the target group; root when unset
    pub parent: Option<String>,
}

impl NewLayer {
    pub fn new(name: impl Into<String>, geometry_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            geometry_type: geometry_type.into(),
            columns: Vec::new(),
            parent: None,
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, column_type: impl Into<String>) -> Self {
        self.columns.push(ColumnSpec::new(name, column_type));
        self
    }

    pub fn with_parent(mut self, group_id: impl Into<String>) -> Self {
        self.parent = Some(group_id.into());
        self
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Sync engine for one project
pub struct LayerTreeSync {
    tree: Arc<RwLock<LayerTree>>,
    backend: Arc<dyn ProjectBackend>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    journal: Mutex<Journal>,
}

impl LayerTreeSync {
    pub fn new(backend: Arc<dyn ProjectBackend>, config: SyncConfig) -> Self {
        Self {
            tree: Arc::new(RwLock::new(LayerTree::new())),
            backend,
            notifier: Arc::new(TracingNotifier),
            journal: Mutex::new(Journal::new(config.journal_capacity)),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Shared handle to the tree for readers
    pub fn tree(&self) -> Arc<RwLock<LayerTree>> {
        Arc::clone(&self.tree)
    }

    /// Copy of the current tree
    pub async fn snapshot(&self) -> LayerTree {
        self.tree.read().await.clone()
    }

    pub fn project(&self) -> &str {
        &self.config.project
    }

    pub fn rollback_policy(&self) -> RollbackPolicy {
        self.config.rollback_policy
    }

    pub async fn pending_operations(&self) -> Vec<PendingOperation> {
        self.journal.lock().await.pending()
    }

    /// Finished operations, oldest first
    pub async fn history(&self) -> Vec<PendingOperation> {
        self.journal.lock().await.completed()
    }

    // ------------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------------

    /// Replace the tree wholesale with the backend's current document
    pub async fn refresh(&self) -> SyncResult<()> {
        let result = self.fetch().await;
        if let Err(err) = &result {
            self.notify_failure(None, "Failed to load project", err);
        }
        result
    }

    async fn fetch(&self) -> SyncResult<()> {
        let project = self
            .backend
            .fetch_tree(&self.config.project)
            .await
            .map_err(SyncError::Refresh)?;
        let next = LayerTree::from_project(&project)?;
        self.tree.write().await.replace(next);
        tracing::info!(project = %self.config.project, "layer tree refreshed");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reorder
    // ------------------------------------------------------------------------

    /// Drag-and-drop move, applied optimistically
    ///
    /// Cycles and `Inside` drops on layers are rejected before any state
    /// change or remote call.
    pub async fn move_node(
        &self,
        dragged_id: &str,
        target: DropTarget,
        position: DropPosition,
    ) -> SyncResult<Placement> {
        let (request, origin, placement, name) = {
            let mut tree = self.tree.write().await;
            let prepared = prepare_move(&mut tree, &self.config.project, dragged_id, &target, position);
            match prepared {
                Ok(prepared) => prepared,
                Err(err) => {
                    drop(tree);
                    let err = SyncError::from(err);
                    self.notify_failure(Some(OperationKind::Move), "Cannot move layer", &err);
                    return Err(err);
                }
            }
        };

        tracing::debug!(
            project = %self.config.project,
            node = dragged_id,
            parent = %request.new_parent_name,
            position = request.position,
            "optimistic move applied"
        );

        let op = self.journal.lock().await.begin(
            OperationKind::Move,
            Some(dragged_id.to_string()),
            origin,
        );

        match self.backend.change_order(&request).await {
            Ok(()) => {
                self.journal.lock().await.finish(op, OperationOutcome::Confirmed);
                self.notifier.notify(Notice::success(
                    OperationKind::Move,
                    format!("Layer \"{}\" moved", name),
                ));
                Ok(placement)
            }
            Err(err) => {
                let reason = failure_text(&err);
                let snapshot = self
                    .journal
                    .lock()
                    .await
                    .finish(op, OperationOutcome::RolledBack { reason });
                self.discard_optimistic(snapshot).await;
                Err(self.remote_failure(OperationKind::Move, "Failed to move layer", err))
            }
        }
    }

    /// Undo an optimistic move according to the rollback policy
    ///
    /// Only the moved node is returned to its origin, so edits that finished
    /// on other nodes while the move was in flight survive.
    async fn discard_optimistic(&self, snapshot: OperationSnapshot) {
        let OperationSnapshot::Position { id, parent, index } = snapshot else {
            return;
        };
        let policy = self.config.rollback_policy;
        tracing::info!(project = %self.config.project, node = %id, %policy, "rolling back optimistic move");

        if matches!(policy, RollbackPolicy::RestoreSnapshot | RollbackPolicy::RestoreThenRefetch) {
            self.return_to_origin(&id, parent.as_deref(), index).await;
        }
        if matches!(policy, RollbackPolicy::Refetch | RollbackPolicy::RestoreThenRefetch) {
            if let Err(err) = self.fetch().await {
                tracing::warn!(error = %err, "refetch after rollback failed");
                if policy == RollbackPolicy::Refetch {
                    self.return_to_origin(&id, parent.as_deref(), index).await;
                }
            }
        }
    }

    async fn return_to_origin(&self, id: &str, parent: Option<&str>, index: usize) {
        let mut tree = self.tree.write().await;
        if let Err(err) = place_by_id(&mut tree, id, parent, index) {
            tracing::warn!(node = id, error = %err, "moved node could not be returned to its origin");
        }
    }

    // ------------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------------

    /// Flip a node's visibility, returning the new value
    ///
    /// Groups cascade to every descendant locally with no remote call.
    /// Layers flip optimistically and are inverted exactly if the backend
    /// rejects the change.
    pub async fn toggle_visibility(&self, id: &str) -> SyncResult<bool> {
        let (request, previous) = {
            let mut tree = self.tree.write().await;
            let key = match tree.resolve(id) {
                Ok(key) => key,
                Err(err) => {
                    drop(tree);
                    let err = SyncError::from(err);
                    self.notify_failure(Some(OperationKind::Toggle), "Cannot change visibility", &err);
                    return Err(err);
                }
            };
            let Some(node) = tree.get(key) else {
                return Err(TreeError::NodeNotFound(id.to_string()).into());
            };
            let visible = !node.visible;

            if node.is_group() {
                let touched = tree.cascade_visibility(key, visible);
                tracing::debug!(node = id, visible, touched, "group visibility cascaded");
                return Ok(visible);
            }

            let layer_id = remote_id(&tree, key, id)?;
            let previous = tree.set_visible(key, visible).unwrap_or(!visible);
            (
                LayerSelectionRequest::new(&self.config.project, layer_id, visible),
                previous,
            )
        };

        let op = self.journal.lock().await.begin(
            OperationKind::Toggle,
            Some(id.to_string()),
            OperationSnapshot::Visibility {
                id: id.to_string(),
                visible: previous,
            },
        );

        match self.backend.set_layer_visibility(&request).await {
            Ok(()) => {
                self.journal.lock().await.finish(op, OperationOutcome::Confirmed);
                Ok(request.checked)
            }
            Err(err) => {
                let reason = failure_text(&err);
                let snapshot = self
                    .journal
                    .lock()
                    .await
                    .finish(op, OperationOutcome::RolledBack { reason });
                if let OperationSnapshot::Visibility { id, visible } = snapshot {
                    let mut tree = self.tree.write().await;
                    if let Some(key) = tree.key_of(&id) {
                        tree.set_visible(key, visible);
                    }
                }
                Err(self.remote_failure(
                    OperationKind::Toggle,
                    "Failed to change layer visibility",
                    err,
                ))
            }
        }
    }

    /// Local opacity change (0.0 to 1.0); the backend keeps its own value
    pub async fn set_opacity(&self, id: &str, opacity: f32) -> SyncResult<f32> {
        let mut tree = self.tree.write().await;
        let key = tree.resolve(id)?;
        tree.set_opacity(key, opacity);
        Ok(tree.get(key).map(|n| n.opacity).unwrap_or(opacity))
    }

    // ------------------------------------------------------------------------
    // Deferred structural operations
    // ------------------------------------------------------------------------

    /// Delete layers and groups in one batched call
    ///
    /// Never optimistic: the tree is only replaced by a refetch after the
    /// backend confirms. `purge_data` also removes the stored data.
    pub async fn delete_nodes(&self, ids: &[String], purge_data: bool) -> SyncResult<()> {
        let request = {
            let tree = self.tree.read().await;
            self.removal_request(&tree, ids, purge_data)
        };
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                self.notify_failure(Some(OperationKind::Delete), "Cannot delete", &err);
                return Err(err);
            }
        };

        let node = match ids {
            [single] => Some(single.clone()),
            _ => None,
        };
        let deleted = request.groups.len() + request.layers.len();
        let result = self
            .deferred(OperationKind::Delete, node, "Failed to delete", || {
                self.backend.remove_nodes(&request)
            })
            .await;
        if result.is_ok() {
            self.notifier.notify(Notice::success(
                OperationKind::Delete,
                format!("Deleted {} item(s)", deleted),
            ));
        }
        result
    }

    fn removal_request(
        &self,
        tree: &LayerTree,
        ids: &[String],
        purge_data: bool,
    ) -> SyncResult<RemoveNodesRequest> {
        if ids.is_empty() {
            return Err(SyncError::Validation("nothing selected for deletion".into()));
        }
        let mut groups = Vec::new();
        let mut layers = Vec::new();
        for id in ids {
            let key = tree.resolve(id)?;
            let remote = tree
                .remote_identifier(key)
                .ok_or_else(|| TreeError::NodeNotFound(id.clone()))?;
            match remote.object_type {
                ObjectType::Group => groups.push(remote.object_id),
                ObjectType::Layer => layers.push(remote.object_id),
            }
        }
        Ok(RemoveNodesRequest {
            project: self.config.project.clone(),
            groups,
            layers,
            remove_from_database: purge_data,
        })
    }

    /// Upload a file-based layer; validated before any remote call
    pub async fn import_layer(&self, request: ImportRequest) -> SyncResult<()> {
        let parent = self.parent_name(request.parent.as_deref()).await;
        let payload = parent
            .and_then(|parent| Ok(request.into_payload(&self.config.project, parent)?));
        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => {
                self.notify_failure(Some(OperationKind::Import), "Cannot import layer", &err);
                return Err(err);
            }
        };

        tracing::info!(
            project = %self.config.project,
            layer = %payload.layer_name,
            format = %payload.format,
            "importing layer"
        );
        self.deferred(OperationKind::Import, None, "Failed to import layer", || {
            self.backend.import_layer(&payload)
        })
        .await?;
        self.notifier.notify(Notice::success(
            OperationKind::Import,
            format!("Layer \"{}\" imported", payload.layer_name),
        ));
        Ok(())
    }

    /// Create an empty vector layer with typed columns
    pub async fn add_layer(&self, layer: NewLayer) -> SyncResult<()> {
        self.non_empty(OperationKind::AddLayer, &layer.name, "layer name")?;
        self.non_empty(OperationKind::AddLayer, &layer.geometry_type, "geometry type")?;
        let parent = self
            .parent_name_or_notify(OperationKind::AddLayer, layer.parent.as_deref())
            .await?;

        let request = AddLayerRequest {
            project: self.config.project.clone(),
            name: layer.name.trim().to_string(),
            format: "vector".to_string(),
            geometry_type: layer.geometry_type,
            properties: layer.columns,
            parent,
        };
        self.deferred(OperationKind::AddLayer, None, "Failed to add layer", || {
            self.backend.add_layer(&request)
        })
        .await?;
        self.notifier.notify(Notice::success(
            OperationKind::AddLayer,
            format!("Layer \"{}\" created", request.name),
        ));
        Ok(())
    }

    /// Create a group under `parent` (a group client id) or at the root
    pub async fn add_group(&self, name: &str, parent: Option<&str>) -> SyncResult<()> {
        self.non_empty(OperationKind::AddGroup, name, "group name")?;
        let parent = self
            .parent_name_or_notify(OperationKind::AddGroup, parent)
            .await?;

        let request = AddGroupRequest {
            project: self.config.project.clone(),
            group_name: name.trim().to_string(),
            parent,
        };
        self.deferred(OperationKind::AddGroup, None, "Failed to add group", || {
            self.backend.add_group(&request)
        })
        .await?;
        self.notifier.notify(Notice::success(
            OperationKind::AddGroup,
            format!("Group \"{}\" created", request.group_name),
        ));
        Ok(())
    }

    pub async fn rename_group(&self, group_id: &str, new_name: &str) -> SyncResult<()> {
        self.non_empty(OperationKind::RenameGroup, new_name, "group name")?;
        let current = {
            let tree = self.tree.read().await;
            tree.resolve(group_id).and_then(|key| match tree.get(key) {
                Some(node) if node.is_group() => Ok(node.name.clone()),
                _ => Err(TreeError::NotAGroup(group_id.to_string())),
            })
        };
        let current = match current {
            Ok(name) => name,
            Err(err) => {
                let err = SyncError::from(err);
                self.notify_failure(Some(OperationKind::RenameGroup), "Cannot rename group", &err);
                return Err(err);
            }
        };

        let request = RenameGroupRequest {
            project: self.config.project.clone(),
            group_name: current,
            new_name: new_name.trim().to_string(),
        };
        self.deferred(
            OperationKind::RenameGroup,
            Some(group_id.to_string()),
            "Failed to rename group",
            || self.backend.rename_group(&request),
        )
        .await?;
        self.notifier.notify(Notice::success(
            OperationKind::RenameGroup,
            format!("Group renamed to \"{}\"", request.new_name),
        ));
        Ok(())
    }

    /// Run a deferred call; success triggers a wholesale refetch
    async fn deferred<F, Fut>(
        &self,
        kind: OperationKind,
        node: Option<String>,
        failure_prefix: &str,
        call: F,
    ) -> SyncResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), BackendError>>,
    {
        let op = self
            .journal
            .lock()
            .await
            .begin(kind, node, OperationSnapshot::None);

        match call().await {
            Ok(()) => {
                self.journal.lock().await.finish(op, OperationOutcome::Confirmed);
                self.refresh().await
            }
            Err(err) => {
                let reason = failure_text(&err);
                self.journal
                    .lock()
                    .await
                    .finish(op, OperationOutcome::Failed { reason });
                Err(self.remote_failure(kind, failure_prefix, err))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Zoom to feature
    // ------------------------------------------------------------------------

    /// Camera fit for one feature of a layer, looked up by layer display name
    ///
    /// `Ok(None)` when the backend matched no feature.
    pub async fn feature_bounds(
        &self,
        layer_name: &str,
        feature_id: &str,
    ) -> SyncResult<Option<FitBounds>> {
        let layer_id = {
            let tree = self.tree.read().await;
            tree.find_layer_by_name(layer_name)
                .and_then(|key| tree.remote_identifier(key))
                .map(|remote| remote.object_id)
                .ok_or_else(|| TreeError::NodeNotFound(layer_name.to_string()))?
        };

        let request = SelectedFeaturesRequest {
            project: self.config.project.clone(),
            layer_id,
            label: vec![feature_id.to_string()],
        };
        let selection = self
            .backend
            .selected_features(&request)
            .await
            .map_err(|err| {
                self.remote_failure(OperationKind::FeatureLookup, "Failed to find feature", err)
            })?;

        let fit = fit_selection(&selection);
        if fit.is_none() {
            tracing::debug!(layer = layer_name, feature = feature_id, "no feature matched");
        }
        Ok(fit)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Backend name of a target group; `""` for the root
    async fn parent_name(&self, group_id: Option<&str>) -> SyncResult<String> {
        let Some(group_id) = group_id else {
            return Ok(String::new());
        };
        let tree = self.tree.read().await;
        let key = tree.resolve(group_id)?;
        match tree.get(key) {
            Some(node) if node.is_group() => Ok(tree.remote_parent_name(Some(key))),
            _ => Err(TreeError::NotAGroup(group_id.to_string()).into()),
        }
    }

    async fn parent_name_or_notify(
        &self,
        kind: OperationKind,
        group_id: Option<&str>,
    ) -> SyncResult<String> {
        let result = self.parent_name(group_id).await;
        if let Err(err) = &result {
            self.notify_failure(Some(kind), "Invalid target group", err);
        }
        result
    }

    fn non_empty(&self, kind: OperationKind, value: &str, what: &str) -> SyncResult<()> {
        if !value.trim().is_empty() {
            return Ok(());
        }
        let err = SyncError::Validation(format!("{} must not be empty", what));
        self.notify_failure(Some(kind), "Invalid request", &err);
        Err(err)
    }

    fn notify_failure(&self, kind: Option<OperationKind>, prefix: &str, err: &SyncError) {
        let message = match err {
            SyncError::Remote { message, .. } => message.clone(),
            SyncError::Refresh(source) => failure_text(source),
            other => other.to_string(),
        };
        self.notifier
            .notify(Notice::error(kind, format!("{}: {}", prefix, message)));
    }

    fn remote_failure(&self, kind: OperationKind, prefix: &str, err: BackendError) -> SyncError {
        tracing::warn!(
            project = %self.config.project,
            operation = %kind,
            error = %err,
            "backend rejected operation"
        );
        let err = SyncError::Remote {
            operation: kind,
            message: failure_text(&err),
            source: err,
        };
        self.notify_failure(Some(kind), prefix, &err);
        err
    }
}

/// Backend message when present, otherwise a generic description
fn failure_text(err: &BackendError) -> String {
    match err.backend_message() {
        Some(message) => message.to_string(),
        None => match err {
            BackendError::Timeout => "the server did not respond in time".to_string(),
            BackendError::Transport(_) => "could not reach the server".to_string(),
            _ => "unknown error".to_string(),
        },
    }
}

fn remote_id(tree: &LayerTree, key: NodeKey, id: &str) -> Result<String, TreeError> {
    tree.remote_identifier(key)
        .map(|remote| remote.object_id)
        .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))
}

fn place_by_id(
    tree: &mut LayerTree,
    id: &str,
    parent: Option<&str>,
    index: usize,
) -> Result<Placement, TreeError> {
    let key = tree.resolve(id)?;
    let parent = parent.map(|p| tree.resolve(p)).transpose()?;
    tree.place(key, parent, index)
}

/// Apply a move locally and build the order request
///
/// Returns the request, the node's origin, the placement and the node name;
/// the tree is untouched on error.
fn prepare_move(
    tree: &mut LayerTree,
    project: &str,
    dragged_id: &str,
    target: &DropTarget,
    position: DropPosition,
) -> Result<(TreeOrderRequest, OperationSnapshot, Placement, String), TreeError> {
    let dragged = tree.resolve(dragged_id)?;
    let remote = tree
        .remote_identifier(dragged)
        .ok_or_else(|| TreeError::NodeNotFound(dragged_id.to_string()))?;
    let origin = tree
        .position_of(dragged)
        .ok_or_else(|| TreeError::NodeNotFound(dragged_id.to_string()))?;
    let name = tree
        .get(dragged)
        .map(|n| n.name.clone())
        .unwrap_or_default();

    let placement = tree.move_node(dragged, target, position)?;
    let snapshot = OperationSnapshot::Position {
        id: dragged_id.to_string(),
        parent: origin
            .parent
            .and_then(|key| tree.get(key))
            .map(|node| node.id.clone()),
        index: origin.index,
    };

    let request = TreeOrderRequest {
        project: project.to_string(),
        object_type: remote.object_type,
        object_id: remote.object_id,
        new_parent_name: tree.remote_parent_name(placement.parent),
        position: placement.index,
    };
    Ok((request, snapshot, placement, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_policy_parse() {
        assert_eq!("refetch".parse::<RollbackPolicy>(), Ok(RollbackPolicy::Refetch));
        assert_eq!("Restore".parse::<RollbackPolicy>(), Ok(RollbackPolicy::RestoreSnapshot));
        assert_eq!(
            "restore-then-refetch".parse::<RollbackPolicy>(),
            Ok(RollbackPolicy::RestoreThenRefetch)
        );
        assert!("undo".parse::<RollbackPolicy>().is_err());
        assert_eq!(RollbackPolicy::default(), RollbackPolicy::RestoreThenRefetch);
    }

    #[test]
    fn test_failure_text_prefers_backend_message() {
        let err = BackendError::Status {
            status: 409,
            message: Some("Layer is locked".into()),
        };
        assert_eq!(failure_text(&err), "Layer is locked");
        assert_eq!(failure_text(&BackendError::Timeout), "the server did not respond in time");
        let err = BackendError::Status {
            status: 500,
            message: None,
        };
        assert_eq!(failure_text(&err), "unknown error");
    }
}
