//! Run outcomes and progress events.
//!
//! Counts are aggregated from typed per-item outcomes; [`SyncEvent`]s are
//! an optional progress feed for a UI and never drive the counters.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use dxsync_core::{ArtifactType, RemoteItem};

use crate::error::HelperError;

/// One item that failed to transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Display name of the item (name, id or path).
    pub item: String,
    pub error: String,
}

/// Counts for one artifact type within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSummary {
    pub artifact_type: ArtifactType,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
    /// Type-level error recovered under continue-on-error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TypeSummary {
    pub fn new(artifact_type: ArtifactType) -> Self {
        Self {
            artifact_type,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn record_failure(&mut self, item: String, error: &HelperError) {
        self.failed += 1;
        self.failures.push(ItemFailure {
            item,
            error: error.to_string(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.error.is_none()
    }
}

/// Totals for a multi-type run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub types: Vec<TypeSummary>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.types.iter().map(|t| t.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.types.iter().map(|t| t.failed).sum()
    }

    pub fn get(&self, artifact_type: ArtifactType) -> Option<&TypeSummary> {
        self.types.iter().find(|t| t.artifact_type == artifact_type)
    }

    /// No failed items and no recovered type-level errors.
    pub fn is_success(&self) -> bool {
        self.types.iter().all(TypeSummary::is_success)
    }
}

/// Progress notifications emitted while a run executes.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    TypeStarted {
        artifact_type: ArtifactType,
        candidates: usize,
    },
    Pushed {
        artifact_type: ArtifactType,
        item: RemoteItem,
    },
    PushFailed {
        artifact_type: ArtifactType,
        item: String,
        error: HelperError,
    },
    Pulled {
        artifact_type: ArtifactType,
        item: RemoteItem,
    },
    PullFailed {
        artifact_type: ArtifactType,
        item: String,
        error: HelperError,
    },
    Deleted {
        artifact_type: ArtifactType,
        item: RemoteItem,
    },
    DeleteFailed {
        artifact_type: ArtifactType,
        item: String,
        error: HelperError,
    },
    TypeCompleted(TypeSummary),
}

/// Optional event sink; a dropped receiver silently disables reporting.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink(Option<UnboundedSender<SyncEvent>>);

impl EventSink {
    pub(crate) fn new(sender: Option<UnboundedSender<SyncEvent>>) -> Self {
        Self(sender)
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}
