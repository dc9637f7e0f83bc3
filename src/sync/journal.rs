//! In-flight and completed sync operations

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::OperationKind;

/// State needed to undo an optimistic mutation
#[derive(Debug, Clone, Default)]
pub enum OperationSnapshot {
    /// Deferred operations change nothing locally before confirmation
    #[default]
    None,
    /// Previous visibility of one layer, by client id
    Visibility { id: String, visible: bool },
    /// Where a moved node came from, by client ids (parent `None` = root)
    Position {
        id: String,
        parent: Option<String>,
        index: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationOutcome {
    Confirmed,
    /// Optimistic state was discarded
    RolledBack { reason: String },
    /// Deferred operation rejected; local state never changed
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub id: Uuid,
    pub kind: OperationKind,
    /// Client id of the node the operation targets
    pub node: Option<String>,
    pub snapshot: OperationSnapshot,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<OperationOutcome>,
}

/// Pending operations plus a bounded history of finished ones
#[derive(Debug)]
pub struct Journal {
    pending: HashMap<Uuid, PendingOperation>,
    completed: VecDeque<PendingOperation>,
    capacity: usize,
}

impl Journal {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: HashMap::new(),
            completed: VecDeque::new(),
            capacity,
        }
    }

    /// Register an operation; an older one on the same node is superseded,
    /// not blocked (last remote write wins)
    pub fn begin(
        &mut self,
        kind: OperationKind,
        node: Option<String>,
        snapshot: OperationSnapshot,
    ) -> Uuid {
        if let Some(node) = &node {
            if let Some(previous) = self
                .pending
                .values()
                .find(|op| op.node.as_ref() == Some(node))
            {
                tracing::warn!(
                    node = %node,
                    previous = %previous.kind,
                    next = %kind,
                    "operation supersedes one still in flight"
                );
            }
        }

        let id = Uuid::new_v4();
        self.pending.insert(
            id,
            PendingOperation {
                id,
                kind,
                node,
                snapshot,
                started_at: Utc::now(),
                finished_at: None,
                outcome: None,
            },
        );
        id
    }

    /// Close an operation, returning its snapshot to the caller
    pub fn finish(&mut self, id: Uuid, outcome: OperationOutcome) -> OperationSnapshot {
        let Some(mut op) = self.pending.remove(&id) else {
            return OperationSnapshot::None;
        };
        let snapshot = std::mem::take(&mut op.snapshot);
        op.finished_at = Some(Utc::now());
        op.outcome = Some(outcome);

        self.completed.push_back(op);
        while self.completed.len() > self.capacity {
            self.completed.pop_front();
        }
        snapshot
    }

    pub fn pending(&self) -> Vec<PendingOperation> {
        let mut ops: Vec<_> = self.pending.values().cloned().collect();
        ops.sort_by_key(|op| op.started_at);
        ops
    }

    pub fn is_pending(&self, node: &str) -> bool {
        self.pending
            .values()
            .any(|op| op.node.as_deref() == Some(node))
    }

    /// Finished operations, oldest first
    pub fn completed(&self) -> Vec<PendingOperation> {
        self.completed.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_returns_snapshot_and_records_outcome() {
        let mut journal = Journal::new(10);
        let id = journal.begin(
            OperationKind::Toggle,
            Some("roads".into()),
            OperationSnapshot::Visibility {
                id: "roads".into(),
                visible: true,
            },
        );
        assert!(journal.is_pending("roads"));

        let snapshot = journal.finish(id, OperationOutcome::Confirmed);
        assert!(matches!(snapshot, OperationSnapshot::Visibility { visible: true, .. }));
        assert!(!journal.is_pending("roads"));

        let done = journal.completed();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].outcome, Some(OperationOutcome::Confirmed));
        assert!(matches!(done[0].snapshot, OperationSnapshot::None));
        assert!(done[0].finished_at.is_some());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut journal = Journal::new(2);
        for _ in 0..5 {
            let id = journal.begin(OperationKind::AddGroup, None, OperationSnapshot::None);
            journal.finish(
                id,
                OperationOutcome::Failed {
                    reason: "x".into(),
                },
            );
        }
        assert_eq!(journal.completed().len(), 2);
        assert!(journal.pending().is_empty());
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let mut journal = Journal::new(2);
        let snapshot = journal.finish(Uuid::new_v4(), OperationOutcome::Confirmed);
        assert!(matches!(snapshot, OperationSnapshot::None));
        assert!(journal.completed().is_empty());
    }
}
