//! Layer tree sync integration tests
//!
//! Drives LayerTreeSync against the in-memory project backend: optimistic
//! reorder and visibility, deferred structural edits, rollback policies and
//! user notifications.
//!
//! Run with: cargo test --test sync_integration

use std::sync::Arc;
use std::time::Duration;

use layer_types::{Feature, FeatureCollection, Geometry, ObjectType, ProjectNode, ProjectTree};
use serde_json::json;
use tokio::sync::Notify;

use geolayers::backend::{BackendCall, ImportFormat, InMemoryProjectBackend};
use geolayers::config::SyncConfig;
use geolayers::error::{ImportError, SyncError, TreeError};
use geolayers::geo::{self, Frame};
use geolayers::sync::{
    ImportFile, ImportRequest, LayerTreeSync, NewLayer, NoticeLevel, OperationKind,
    OperationOutcome, RecordingNotifier, RollbackPolicy,
};
use geolayers::tree::{DropPosition, DropTarget};

const PROJECT: &str = "demo";

fn city_project() -> ProjectTree {
    ProjectTree::new(vec![
        ProjectNode::group(
            "Base",
            vec![
                ProjectNode::vector("roads", "Roads").with_geometry("LineString"),
                ProjectNode::vector("rivers", "Rivers").with_geometry("LineString"),
            ],
        ),
        ProjectNode::vector("parcels", "Parcels").with_geometry("MultiPolygon"),
        ProjectNode::raster("ortho", "Ortho"),
    ])
}

fn flat_project() -> ProjectTree {
    ProjectTree::new(
        ["a", "b", "c", "d"]
            .iter()
            .map(|id| ProjectNode::vector(*id, id.to_uppercase()))
            .collect(),
    )
}

struct Harness {
    backend: Arc<InMemoryProjectBackend>,
    notices: Arc<RecordingNotifier>,
    sync: LayerTreeSync,
}

async fn harness(tree: ProjectTree, policy: RollbackPolicy) -> Harness {
    let backend = Arc::new(InMemoryProjectBackend::with_project(PROJECT, tree));
    let notices = Arc::new(RecordingNotifier::new());
    let sync = LayerTreeSync::new(
        backend.clone(),
        SyncConfig::new(PROJECT).with_rollback_policy(policy),
    )
    .with_notifier(notices.clone());

    sync.refresh().await.unwrap();
    backend.clear_calls().await;
    Harness {
        backend,
        notices,
        sync,
    }
}

async fn root_ids(sync: &LayerTreeSync) -> Vec<String> {
    let tree = sync.snapshot().await;
    tree.roots()
        .iter()
        .filter_map(|key| tree.get(*key))
        .map(|node| node.id.clone())
        .collect()
}

async fn child_ids(sync: &LayerTreeSync, group_id: &str) -> Vec<String> {
    let tree = sync.snapshot().await;
    let key = tree.resolve(group_id).unwrap();
    tree.children(key)
        .iter()
        .filter_map(|key| tree.get(*key))
        .map(|node| node.id.clone())
        .collect()
}

async fn is_visible(sync: &LayerTreeSync, id: &str) -> bool {
    sync.snapshot().await.node(id).unwrap().visible
}

// =============================================================================
// Reorder
// =============================================================================

#[tokio::test]
async fn test_forward_move_shifts_index_for_removal() {
    let h = harness(flat_project(), RollbackPolicy::default()).await;

    let placement = h
        .sync
        .move_node("a", DropTarget::node("d"), DropPosition::Before)
        .await
        .unwrap();

    assert_eq!(placement.index, 2);
    assert_eq!(placement.parent, None);
    assert_eq!(root_ids(&h.sync).await, ["b", "c", "a", "d"]);

    let calls = h.backend.mutations().await;
    assert_eq!(calls.len(), 1);
    let BackendCall::ChangeOrder(request) = &calls[0] else {
        panic!("expected change_order, got {:?}", calls[0]);
    };
    assert_eq!(request.object_type, ObjectType::Layer);
    assert_eq!(request.object_id, "a");
    assert_eq!(request.new_parent_name, "");
    assert_eq!(request.position, 2);

    // Backend applied the same order
    let remote: Vec<_> = h
        .backend
        .project(PROJECT)
        .await
        .unwrap()
        .children
        .iter()
        .filter_map(|n| n.id.clone())
        .collect();
    assert_eq!(remote, ["b", "c", "a", "d"]);
}

#[tokio::test]
async fn test_backward_move_after_target() {
    let h = harness(flat_project(), RollbackPolicy::default()).await;

    let placement = h
        .sync
        .move_node("d", DropTarget::node("a"), DropPosition::After)
        .await
        .unwrap();

    assert_eq!(placement.index, 1);
    assert_eq!(root_ids(&h.sync).await, ["a", "d", "b", "c"]);
}

#[tokio::test]
async fn test_root_drop_appends() {
    let h = harness(flat_project(), RollbackPolicy::default()).await;

    let placement = h
        .sync
        .move_node("b", DropTarget::Root, DropPosition::Inside)
        .await
        .unwrap();

    assert_eq!(placement.index, 3);
    assert_eq!(root_ids(&h.sync).await, ["a", "c", "d", "b"]);
}

#[tokio::test]
async fn test_move_inside_group_addresses_group_by_name() {
    let h = harness(city_project(), RollbackPolicy::default()).await;

    h.sync
        .move_node("parcels", DropTarget::node("group:Base"), DropPosition::Inside)
        .await
        .unwrap();

    assert_eq!(child_ids(&h.sync, "group:Base").await, ["parcels", "roads", "rivers"]);
    let calls = h.backend.mutations().await;
    let BackendCall::ChangeOrder(request) = &calls[0] else {
        panic!("expected change_order");
    };
    assert_eq!(request.new_parent_name, "Base");
    assert_eq!(request.position, 0);

    // Groups travel by name
    h.backend.clear_calls().await;
    h.sync
        .move_node("group:Base", DropTarget::node("ortho"), DropPosition::After)
        .await
        .unwrap();
    let calls = h.backend.mutations().await;
    let BackendCall::ChangeOrder(request) = &calls[0] else {
        panic!("expected change_order");
    };
    assert_eq!(request.object_type, ObjectType::Group);
    assert_eq!(request.object_id, "Base");
    assert_eq!(root_ids(&h.sync).await, ["ortho", "group:Base"]);
}

#[tokio::test]
async fn test_cyclic_move_is_rejected_without_remote_call() {
    let tree = ProjectTree::new(vec![ProjectNode::group(
        "Outer",
        vec![ProjectNode::group(
            "Inner",
            vec![ProjectNode::vector("roads", "Roads")],
        )],
    )]);
    let h = harness(tree, RollbackPolicy::default()).await;
    let before = h.sync.snapshot().await;

    let err = h
        .sync
        .move_node("group:Outer", DropTarget::node("group:Outer/Inner"), DropPosition::Inside)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Tree(TreeError::CyclicMove { .. })));
    assert!(err.is_local());
    assert_eq!(h.sync.snapshot().await, before);
    assert!(h.backend.mutations().await.is_empty());
    assert_eq!(h.notices.errors().len(), 1);
}

#[tokio::test]
async fn test_drop_inside_layer_is_rejected() {
    let h = harness(flat_project(), RollbackPolicy::default()).await;

    let err = h
        .sync
        .move_node("a", DropTarget::node("b"), DropPosition::Inside)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Tree(TreeError::NotAGroup(ref id)) if id == "b"));
    assert!(h.backend.calls().await.is_empty());
    assert_eq!(root_ids(&h.sync).await, ["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_optimistic_move_is_visible_while_in_flight() {
    let h = harness(flat_project(), RollbackPolicy::default()).await;
    let gate = Arc::new(Notify::new());
    h.backend.set_gate(Some(gate.clone())).await;

    let sync = Arc::new(h.sync);
    let task = {
        let sync = sync.clone();
        tokio::spawn(async move {
            sync.move_node("a", DropTarget::node("d"), DropPosition::Before)
                .await
        })
    };

    for _ in 0..200 {
        if !sync.pending_operations().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let pending = sync.pending_operations().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, OperationKind::Move);
    assert_eq!(pending[0].node.as_deref(), Some("a"));
    assert_eq!(root_ids(&sync).await, ["b", "c", "a", "d"]);

    gate.notify_one();
    task.await.unwrap().unwrap();
    assert!(sync.pending_operations().await.is_empty());
    assert_eq!(
        sync.history().await.last().unwrap().outcome,
        Some(OperationOutcome::Confirmed)
    );
}

// =============================================================================
// Rollback policies
// =============================================================================

#[tokio::test]
async fn test_rejected_move_restores_snapshot() {
    let h = harness(flat_project(), RollbackPolicy::RestoreSnapshot).await;
    let before = h.sync.snapshot().await;
    h.backend
        .fail_next("change_order", 409, Some("Layer is locked"))
        .await;

    let err = h
        .sync
        .move_node("a", DropTarget::node("d"), DropPosition::After)
        .await
        .unwrap_err();

    match &err {
        SyncError::Remote {
            operation, message, ..
        } => {
            assert_eq!(*operation, OperationKind::Move);
            assert_eq!(message, "Layer is locked");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.sync.snapshot().await, before);
    // No reconciliation fetch under this policy
    assert!(h.backend.calls().await.iter().all(|c| c.operation() != "fetch_tree"));

    let errors = h.notices.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("Layer is locked"));
    assert_eq!(errors[0].operation, Some(OperationKind::Move));

    let last = h.sync.history().await.pop().unwrap();
    assert!(matches!(last.outcome, Some(OperationOutcome::RolledBack { .. })));
}

#[tokio::test]
async fn test_refetch_policy_adopts_backend_tree() {
    let h = harness(flat_project(), RollbackPolicy::Refetch).await;
    // Another client reordered the project meanwhile
    let mut remote = flat_project();
    remote.children.reverse();
    h.backend.set_project(PROJECT, remote).await;
    h.backend.fail_next("change_order", 500, None).await;

    h.sync
        .move_node("a", DropTarget::node("b"), DropPosition::After)
        .await
        .unwrap_err();

    assert_eq!(root_ids(&h.sync).await, ["d", "c", "b", "a"]);
}

#[tokio::test]
async fn test_refetch_failure_falls_back_to_snapshot() {
    let h = harness(flat_project(), RollbackPolicy::Refetch).await;
    h.backend.fail_next("change_order", 500, None).await;
    h.backend.fail_next("fetch_tree", 503, None).await;

    h.sync
        .move_node("a", DropTarget::node("d"), DropPosition::After)
        .await
        .unwrap_err();

    assert_eq!(root_ids(&h.sync).await, ["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_restore_then_refetch_reconciles() {
    let h = harness(flat_project(), RollbackPolicy::RestoreThenRefetch).await;
    let mut remote = flat_project();
    remote.children.pop();
    h.backend.set_project(PROJECT, remote).await;
    h.backend.fail_next("change_order", 500, None).await;

    h.sync
        .move_node("a", DropTarget::node("c"), DropPosition::After)
        .await
        .unwrap_err();

    assert_eq!(root_ids(&h.sync).await, ["a", "b", "c"]);
}

/// Hold a move of `a` in flight, complete a toggle of `b` meanwhile, then
/// let the backend reject the move
async fn reject_move_around_confirmed_toggle(h: Harness) -> Arc<LayerTreeSync> {
    let gate = Arc::new(Notify::new());
    h.backend.set_gate(Some(gate.clone())).await;
    h.backend.fail_next("change_order", 500, None).await;

    let sync = Arc::new(h.sync);
    let task = {
        let sync = sync.clone();
        tokio::spawn(async move {
            sync.move_node("a", DropTarget::node("d"), DropPosition::After)
                .await
        })
    };
    for _ in 0..200 {
        if !h.backend.mutations().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(matches!(h.backend.mutations().await[..], [BackendCall::ChangeOrder(_)]));
    assert_eq!(root_ids(&sync).await, ["b", "c", "d", "a"]);

    h.backend.set_gate(None).await;
    assert!(!sync.toggle_visibility("b").await.unwrap());

    gate.notify_one();
    task.await.unwrap().unwrap_err();
    sync
}

async fn remote_visibility(backend: &InMemoryProjectBackend, id: &str) -> bool {
    backend
        .project(PROJECT)
        .await
        .unwrap()
        .children
        .iter()
        .find(|node| node.id.as_deref() == Some(id))
        .unwrap()
        .visible
}

#[tokio::test]
async fn test_move_rollback_keeps_concurrent_toggle() {
    let h = harness(flat_project(), RollbackPolicy::RestoreSnapshot).await;
    let backend = h.backend.clone();

    let sync = reject_move_around_confirmed_toggle(h).await;

    assert_eq!(root_ids(&sync).await, ["a", "b", "c", "d"]);
    assert!(!is_visible(&sync, "b").await);
    assert!(!remote_visibility(&backend, "b").await);
}

#[tokio::test]
async fn test_move_rollback_keeps_concurrent_toggle_when_refetch_fails() {
    let h = harness(flat_project(), RollbackPolicy::RestoreThenRefetch).await;
    let backend = h.backend.clone();
    h.backend.fail_next("fetch_tree", 503, None).await;

    let sync = reject_move_around_confirmed_toggle(h).await;

    assert_eq!(root_ids(&sync).await, ["a", "b", "c", "d"]);
    assert!(!is_visible(&sync, "b").await);
    assert!(!remote_visibility(&backend, "b").await);
}

// =============================================================================
// Visibility
// =============================================================================

#[tokio::test]
async fn test_layer_toggle_is_sent_by_id() {
    let h = harness(city_project(), RollbackPolicy::default()).await;

    let visible = h.sync.toggle_visibility("roads").await.unwrap();

    assert!(!visible);
    assert!(!is_visible(&h.sync, "roads").await);
    let calls = h.backend.mutations().await;
    assert_eq!(calls.len(), 1);
    let BackendCall::SetLayerVisibility(request) = &calls[0] else {
        panic!("expected set_layer_visibility");
    };
    assert_eq!(request.layer_id, "roads");
    assert!(!request.checked);
}

#[tokio::test]
async fn test_rejected_toggle_is_inverted_exactly() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    // Make an unrelated local change that a refetch would wipe out
    h.sync.set_opacity("ortho", 0.5).await.unwrap();
    h.backend
        .fail_next("set_layer_visibility", 403, Some("Project is read-only"))
        .await;

    let err = h.sync.toggle_visibility("parcels").await.unwrap_err();

    assert!(matches!(err, SyncError::Remote { operation: OperationKind::Toggle, .. }));
    assert!(is_visible(&h.sync, "parcels").await);
    assert_eq!(h.sync.snapshot().await.node("ortho").unwrap().opacity, 0.5);
    assert!(h.notices.errors()[0].message.contains("Project is read-only"));
}

#[tokio::test]
async fn test_group_toggle_cascades_locally() {
    let h = harness(city_project(), RollbackPolicy::default()).await;

    let visible = h.sync.toggle_visibility("group:Base").await.unwrap();

    assert!(!visible);
    assert!(!is_visible(&h.sync, "group:Base").await);
    assert!(!is_visible(&h.sync, "roads").await);
    assert!(!is_visible(&h.sync, "rivers").await);
    assert!(is_visible(&h.sync, "parcels").await);
    assert!(h.backend.calls().await.is_empty());
}

#[tokio::test]
async fn test_toggle_unknown_node() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let err = h.sync.toggle_visibility("lakes").await.unwrap_err();
    assert!(matches!(err, SyncError::Tree(TreeError::NodeNotFound(_))));
    assert!(h.backend.calls().await.is_empty());
}

// =============================================================================
// Deferred operations
// =============================================================================

#[tokio::test]
async fn test_delete_batches_groups_and_layers_then_refetches() {
    let h = harness(city_project(), RollbackPolicy::default()).await;

    h.sync
        .delete_nodes(&["group:Base".to_string(), "parcels".to_string()], true)
        .await
        .unwrap();

    let calls = h.backend.calls().await;
    assert_eq!(calls.len(), 2);
    let BackendCall::RemoveNodes(request) = &calls[0] else {
        panic!("expected remove_nodes first");
    };
    assert_eq!(request.groups, ["Base"]);
    assert_eq!(request.layers, ["parcels"]);
    assert!(request.remove_from_database);
    assert_eq!(calls[1].operation(), "fetch_tree");

    assert_eq!(root_ids(&h.sync).await, ["ortho"]);
    assert_eq!(h.notices.notices().last().unwrap().level, NoticeLevel::Success);
}

#[tokio::test]
async fn test_rejected_delete_leaves_tree_untouched() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let before = h.sync.snapshot().await;
    h.backend.fail_next("remove_nodes", 500, None).await;

    let err = h
        .sync
        .delete_nodes(&["parcels".to_string()], false)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Remote { operation: OperationKind::Delete, .. }));
    assert_eq!(h.sync.snapshot().await, before);
    let last = h.sync.history().await.pop().unwrap();
    assert!(matches!(last.outcome, Some(OperationOutcome::Failed { .. })));
}

#[tokio::test]
async fn test_empty_delete_is_validation_error() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let err = h.sync.delete_nodes(&[], false).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
    assert!(h.backend.calls().await.is_empty());
}

#[tokio::test]
async fn test_import_without_primary_file_makes_no_call() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let request = ImportRequest::new(
        ImportFormat::Shapefile,
        "plots",
        vec![
            ImportFile::new("plots.dbf", b"table".to_vec()),
            ImportFile::new("plots.prj", b"proj".to_vec()),
        ],
    );

    let err = h.sync.import_layer(request).await.unwrap_err();

    assert!(matches!(err, SyncError::Import(ImportError::MissingPrimaryFile)));
    assert!(h.backend.calls().await.is_empty());
    assert_eq!(h.notices.errors().len(), 1);
}

#[tokio::test]
async fn test_import_into_group() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let request = ImportRequest::new(
        ImportFormat::Shapefile,
        "Plots",
        vec![
            ImportFile::new("plots.shp", b"shape".to_vec()),
            ImportFile::new("plots.dbf", b"table".to_vec()),
        ],
    )
    .with_parent("group:Base");

    h.sync.import_layer(request).await.unwrap();

    let calls = h.backend.mutations().await;
    let BackendCall::ImportLayer(payload) = &calls[0] else {
        panic!("expected import_layer");
    };
    assert_eq!(payload.parent, "Base");
    assert_eq!(payload.epsg, Some(3857));
    assert_eq!(payload.files.len(), 2);

    let tree = h.sync.snapshot().await;
    let base = tree.resolve("group:Base").unwrap();
    let names: Vec<_> = tree
        .children(base)
        .iter()
        .map(|k| tree.get(*k).unwrap().name.clone())
        .collect();
    assert_eq!(names, ["Roads", "Rivers", "Plots"]);
}

#[tokio::test]
async fn test_import_into_layer_is_rejected() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let request = ImportRequest::new(
        ImportFormat::GeoJson,
        "Plots",
        vec![ImportFile::new("plots.geojson", b"{}".to_vec())],
    )
    .with_parent("parcels");

    let err = h.sync.import_layer(request).await.unwrap_err();
    assert!(matches!(err, SyncError::Tree(TreeError::NotAGroup(_))));
    assert!(h.backend.calls().await.is_empty());
}

#[tokio::test]
async fn test_add_layer_with_columns() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let layer = NewLayer::new("Trees", "Point")
        .with_column("species", "text")
        .with_column("height", "real");

    h.sync.add_layer(layer).await.unwrap();

    let calls = h.backend.mutations().await;
    let BackendCall::AddLayer(request) = &calls[0] else {
        panic!("expected add_layer");
    };
    assert_eq!(request.parent, "");
    assert_eq!(request.geometry_type, "Point");
    assert_eq!(request.properties.len(), 2);
    assert_eq!(request.properties[1].column_name, "height");

    let tree = h.sync.snapshot().await;
    let trees = tree.find_layer_by_name("Trees").unwrap();
    assert_eq!(tree.get(trees).unwrap().geometry.as_deref(), Some("Point"));
}

#[tokio::test]
async fn test_add_layer_requires_name() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let err = h.sync.add_layer(NewLayer::new(" ", "Point")).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
    assert!(h.backend.calls().await.is_empty());
    assert_eq!(h.notices.errors().len(), 1);
}

#[tokio::test]
async fn test_duplicate_group_surfaces_backend_message() {
    let h = harness(city_project(), RollbackPolicy::default()).await;

    let err = h.sync.add_group("Base", None).await.unwrap_err();

    match err {
        SyncError::Remote { message, .. } => assert_eq!(message, "Group 'Base' already exists"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(h.notices.errors()[0]
        .message
        .contains("Group 'Base' already exists"));
}

#[tokio::test]
async fn test_add_then_rename_group() {
    let h = harness(city_project(), RollbackPolicy::default()).await;

    h.sync.add_group("Hydro", Some("group:Base")).await.unwrap();
    assert!(h.sync.snapshot().await.node("group:Base/Hydro").is_some());

    h.sync
        .rename_group("group:Base/Hydro", "Water")
        .await
        .unwrap();

    let calls = h.backend.mutations().await;
    let BackendCall::RenameGroup(request) = calls.last().unwrap() else {
        panic!("expected rename_group");
    };
    assert_eq!(request.group_name, "Hydro");
    assert_eq!(request.new_name, "Water");

    let tree = h.sync.snapshot().await;
    assert!(tree.node("group:Base/Hydro").is_none());
    assert!(tree.node("group:Base/Water").is_some());
}

#[tokio::test]
async fn test_rename_layer_is_rejected() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let err = h.sync.rename_group("roads", "Streets").await.unwrap_err();
    assert!(matches!(err, SyncError::Tree(TreeError::NotAGroup(_))));
    assert!(h.backend.calls().await.is_empty());
}

#[tokio::test]
async fn test_refresh_keeps_expanded_groups() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    {
        let tree = h.sync.tree();
        let mut tree = tree.write().await;
        let base = tree.resolve("group:Base").unwrap();
        tree.toggle_expanded(base);
    }

    h.sync.refresh().await.unwrap();

    let tree = h.sync.snapshot().await;
    let base = tree.resolve("group:Base").unwrap();
    assert!(tree.expanded(base));
}

#[tokio::test]
async fn test_failed_refresh_notifies() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    h.backend.fail_next("fetch_tree", 502, Some("Bad gateway")).await;

    let err = h.sync.refresh().await.unwrap_err();

    assert!(matches!(err, SyncError::Refresh(_)));
    assert!(h.notices.errors()[0].message.contains("Bad gateway"));
    // Tree kept as it was
    assert_eq!(root_ids(&h.sync).await, ["group:Base", "parcels", "ortho"]);
}

// =============================================================================
// Zoom to feature
// =============================================================================

#[tokio::test]
async fn test_feature_bounds_in_geographic_frame() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let mut feature = Feature::new(Geometry::LineString {
        coordinates: vec![vec![1_000_000.0, 2_000_000.0], vec![1_500_000.0, 2_500_000.0]],
    });
    feature.id = Some(json!("42"));
    h.backend
        .set_features("roads", FeatureCollection::new(vec![feature]))
        .await;

    let fit = h.sync.feature_bounds("Roads", "42").await.unwrap().unwrap();

    assert_eq!(fit.bounds.frame, Frame::Geographic);
    let (west, south) = geo::mercator_to_lon_lat(1_000_000.0, 2_000_000.0);
    let (east, north) = geo::mercator_to_lon_lat(1_500_000.0, 2_500_000.0);
    let [[w, s], [e, n]] = fit.corners();
    assert!((w - west).abs() < 1e-9 && (s - south).abs() < 1e-9);
    assert!((e - east).abs() < 1e-9 && (n - north).abs() < 1e-9);
    assert_eq!(fit.padding, 100);
    assert_eq!(fit.max_zoom, 18.0);
    assert_eq!(fit.duration_ms, 1000);

    let calls = h.backend.calls().await;
    let BackendCall::SelectedFeatures(request) = &calls[0] else {
        panic!("expected selected_features");
    };
    assert_eq!(request.layer_id, "roads");
    assert_eq!(request.label, ["42"]);

    assert!(h.sync.feature_bounds("Roads", "7").await.unwrap().is_none());
}

#[tokio::test]
async fn test_feature_bounds_unknown_layer() {
    let h = harness(city_project(), RollbackPolicy::default()).await;
    let err = h.sync.feature_bounds("Lakes", "1").await.unwrap_err();
    assert!(matches!(err, SyncError::Tree(TreeError::NodeNotFound(_))));
    assert!(h.backend.calls().await.is_empty());
}
