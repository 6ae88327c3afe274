//! Counter reconciler: keeps parent counters in step with child lifecycle events.
//!
//! Each event becomes exactly one atomic increment on the parent. There is no
//! local retry and no event deduplication; the delivery mechanism owns both.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_core::DocRef;
use tally_core::config::CountersConfig;
use tally_store::DocumentStore;

/// A child document was created or deleted under `parent`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEvent {
    pub parent: DocRef,
    pub child_collection: String,
    #[serde(default)]
    pub child_id: Option<String>,
}

impl ChildEvent {
    pub fn new(parent: DocRef, child_collection: impl Into<String>) -> Self {
        Self {
            parent,
            child_collection: child_collection.into(),
            child_id: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildEventKind {
    Created,
    Deleted,
}

impl ChildEventKind {
    pub fn delta(&self) -> i64 {
        match self {
            Self::Created => 1,
            Self::Deleted => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "child_created",
            Self::Deleted => "child_deleted",
        }
    }
}

/// What the reconciler did with an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The counter was adjusted; `value` is the new count.
    Applied { counter: String, value: i64 },
    /// The child collection has no counter.
    Unmapped,
    /// The parent no longer exists; the update was dropped.
    ParentMissing { counter: String },
}

impl ReconcileOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn counter(&self) -> Option<&str> {
        match self {
            Self::Applied { counter, .. } | Self::ParentMissing { counter } => Some(counter),
            Self::Unmapped => None,
        }
    }

    /// Metric label for this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Unmapped => "unmapped",
            Self::ParentMissing { .. } => "parent_missing",
        }
    }
}

/// Receives child lifecycle events from the trigger delivery mechanism.
#[async_trait]
pub trait ChildEventHandler: Send + Sync {
    async fn child_created(&self, event: &ChildEvent) -> SyncResult<ReconcileOutcome>;

    async fn child_deleted(&self, event: &ChildEvent) -> SyncResult<ReconcileOutcome>;
}

/// Applies +1/-1 to `counts[name]` on the parent with the store's atomic increment.
pub struct CounterReconciler {
    store: Arc<dyn DocumentStore>,
    config: CountersConfig,
}

impl CounterReconciler {
    pub fn new(store: Arc<dyn DocumentStore>, config: CountersConfig) -> Self {
        Self { store, config }
    }

    pub async fn apply(
        &self,
        kind: ChildEventKind,
        event: &ChildEvent,
    ) -> SyncResult<ReconcileOutcome> {
        let parent = &event.parent;
        // Rejects names that could not be a subcollection of the parent.
        parent
            .collection(&event.child_collection)
            .map_err(|e| SyncError::validation(parent.path(), e))?;

        let Some((counter, field)) = self.config.counter_field(&event.child_collection) else {
            tracing::debug!(
                event = kind.as_str(),
                parent = %parent,
                child_collection = %event.child_collection,
                "No counter mapped for child collection, ignoring"
            );
            return Ok(ReconcileOutcome::Unmapped);
        };
        let counter = counter.to_string();
        let field = field.map_err(|e| SyncError::validation(parent.path(), e))?;

        match self
            .store
            .atomic_increment(parent, &field, kind.delta())
            .await
            .map_err(SyncError::from)
        {
            Ok(value) => {
                tracing::debug!(
                    event = kind.as_str(),
                    parent = %parent,
                    counter = %field,
                    value,
                    "Counter updated"
                );
                Ok(ReconcileOutcome::Applied { counter, value })
            }
            Err(SyncError::DocumentMissing(_)) => {
                tracing::warn!(
                    event = kind.as_str(),
                    parent = %parent,
                    child_id = event.child_id.as_deref().unwrap_or(""),
                    counter = %field,
                    "Parent document missing, dropping counter update"
                );
                Ok(ReconcileOutcome::ParentMissing { counter })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ChildEventHandler for CounterReconciler {
    async fn child_created(&self, event: &ChildEvent) -> SyncResult<ReconcileOutcome> {
        self.apply(ChildEventKind::Created, event).await
    }

    async fn child_deleted(&self, event: &ChildEvent) -> SyncResult<ReconcileOutcome> {
        self.apply(ChildEventKind::Deleted, event).await
    }
}
