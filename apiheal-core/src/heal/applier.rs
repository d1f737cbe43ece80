//! Patch applier
//!
//! Applying a proposal produces a structured [`AppliedEdit`] record; the
//! applier never rewrites artifact text directly. Writes to a given
//! artifact are serialized through a per-artifact lock so concurrent
//! approvals cannot interleave edits to the same file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::contract::OperationId;

use super::{HealError, HealingProposal, ProposedEdit, Result};

/// Maps operations to the generated test artifact covering them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactCatalog {
    targets: BTreeMap<OperationId, PathBuf>,
}

impl ArtifactCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: OperationId, artifact: impl Into<PathBuf>) {
        self.targets.insert(operation, artifact.into());
    }

    pub fn with_target(mut self, operation: OperationId, artifact: impl Into<PathBuf>) -> Self {
        self.register(operation, artifact);
        self
    }

    pub fn locate(&self, operation: &OperationId) -> Option<&Path> {
        self.targets.get(operation).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// One edit that was actually applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEdit {
    pub proposal_id: String,
    pub edit: ProposedEdit,
    pub applied_at: DateTime<Utc>,
}

/// Produces applied-edit records, one artifact writer at a time
pub struct PatchApplier {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    journal: Option<PathBuf>,
}

impl PatchApplier {
    pub fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()), journal: None }
    }

    /// Additionally append every applied edit, one JSON object per line,
    /// to `path` for the Reporter collaborator.
    pub fn with_journal(path: impl Into<PathBuf>) -> Self {
        Self { locks: Mutex::new(HashMap::new()), journal: Some(path.into()) }
    }

    /// Apply one proposal. The caller guarantees the proposal carries an
    /// edit; a missing target is handled upstream as a rejection.
    pub async fn apply(&self, proposal: &HealingProposal) -> Result<AppliedEdit> {
        let edit = proposal
            .edit
            .clone()
            .ok_or_else(|| HealError::TargetMissing(proposal.id.clone()))?;

        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(edit.artifact.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _artifact_guard = lock.lock().await;

        let applied = AppliedEdit {
            proposal_id: proposal.id.clone(),
            edit,
            applied_at: Utc::now(),
        };

        if let Some(journal) = &self.journal {
            let mut line = serde_json::to_string(&applied)?;
            line.push('\n');
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(journal)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
        }

        debug!(
            "applied {:?} at {} in {}",
            applied.edit.action,
            applied.edit.field_path,
            applied.edit.artifact.display()
        );
        Ok(applied)
    }
}

impl Default for PatchApplier {
    fn default() -> Self {
        Self::new()
    }
}
