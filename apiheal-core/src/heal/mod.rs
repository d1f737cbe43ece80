//! Healing pipeline: scoring, proposal, gated application
//!
//! Turns classified drift into [`HealingProposal`]s and applies them to
//! generated test artifacts subject to the configured mode, confidence
//! threshold and auto-heal cap. Every terminal proposal is written to the
//! audit ledger exactly once.

pub mod applier;
pub mod engine;
pub mod scorer;
pub mod session;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::contract::OperationId;
use crate::diff::{ChangeKind, ChangeValue, ClassifiedChange, RenamePolicy};

pub use applier::{AppliedEdit, ArtifactCatalog, PatchApplier};
pub use engine::{HealEngine, HealRun};
pub use scorer::{ConfidenceScorer, ScorePolicy};
pub use session::{DecisionOutcome, ReviewSession};

#[derive(Debug, Error)]
pub enum HealError {
    #[error(transparent)]
    MalformedContract(#[from] crate::contract::ContractError),

    #[error("invalid healing configuration: {0}")]
    Config(String),

    #[error("unknown proposal: {0}")]
    UnknownProposal(String),

    #[error("proposal {0} is not pending")]
    NotPending(String),

    #[error("no target artifact for proposal {0}")]
    TargetMissing(String),

    #[error("session is cancelled; remaining proposals stay pending")]
    SessionCancelled,

    #[error("interactive session expects a decision on {expected}, got {got}")]
    OutOfOrderDecision { expected: String, got: String },

    #[error("audit ledger error: {0}")]
    Audit(#[from] crate::audit::AuditError),

    #[error("journal I/O error: {0}")]
    Journal(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HealError>;

/// Operating mode of a healing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealMode {
    /// Apply at/above threshold immediately, reject the rest with reason
    Auto,
    /// Queue everything pending until explicit approval calls
    Review,
    /// One proposal at a time, decision required before the next
    Interactive,
}

impl fmt::Display for HealMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Review => write!(f, "review"),
            Self::Interactive => write!(f, "interactive"),
        }
    }
}

/// Immutable per-run configuration, passed explicitly into each run so
/// concurrent runs with different policies cannot interfere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealConfig {
    pub confidence_threshold: f64,
    pub mode: HealMode,
    /// Hard cap on auto-applied proposals per run; overflow is forced to
    /// review regardless of confidence
    pub max_auto_heals_per_run: usize,
    pub rename: RenamePolicy,
    pub scores: ScorePolicy,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            mode: HealMode::Review,
            max_auto_heals_per_run: 10,
            rename: RenamePolicy::default(),
            scores: ScorePolicy::default(),
        }
    }
}

impl HealConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(HealError::Config(format!(
                "confidence_threshold must be in [0,1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.rename.similarity_threshold)
            || !(0.0..=1.0).contains(&self.rename.ambiguity_band)
        {
            return Err(HealError::Config(
                "rename policy thresholds must be in [0,1]".to_string(),
            ));
        }
        if self.rename.ambiguity_band > self.rename.similarity_threshold {
            return Err(HealError::Config(format!(
                "rename ambiguity_band ({}) must not exceed similarity_threshold ({})",
                self.rename.ambiguity_band, self.rename.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Structured edit operation against a generated test artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    RenameField,
    AddAssertion,
    RemoveAssertion,
    RetypeAssertion,
    ToggleRequired,
    AddStatusCheck,
    RemoveStatusCheck,
    AddCoverage,
    /// Target test needs human rework; never applied automatically
    FlagForRewrite,
}

impl EditAction {
    pub fn for_kind(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::FieldRenamed => Self::RenameField,
            ChangeKind::FieldAdded => Self::AddAssertion,
            ChangeKind::FieldRemoved => Self::RemoveAssertion,
            ChangeKind::TypeChanged => Self::RetypeAssertion,
            ChangeKind::ParameterRequiredChanged => Self::ToggleRequired,
            ChangeKind::StatusCodeAdded => Self::AddStatusCheck,
            ChangeKind::StatusCodeRemoved => Self::RemoveStatusCheck,
            ChangeKind::OperationAdded => Self::AddCoverage,
            ChangeKind::OperationRemoved | ChangeKind::Unclassified => Self::FlagForRewrite,
        }
    }
}

/// Proposed edit: structured and independently re-checkable, never a free
/// text rewrite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedEdit {
    pub artifact: PathBuf,
    pub action: EditAction,
    pub field_path: String,
    pub before: Option<ChangeValue>,
    pub after: Option<ChangeValue>,
}

/// Lifecycle state of a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ProposalState {
    Pending,
    Applied,
    Rejected { reason: String },
    Expired,
}

/// Why a pending proposal is waiting on review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    /// Run mode queues every proposal
    ModeReview,
    /// Kind can never be auto-healed (removed operations, unclassified)
    NeverAutoHealable,
    /// max_auto_heals_per_run was reached before this proposal
    AutoHealCapReached,
}

/// One candidate fix for one diff entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingProposal {
    /// Stable identity derived from the diff entry key
    pub id: String,
    pub change: ClassifiedChange,
    pub confidence: f64,
    /// None when no target artifact is registered for the operation
    pub edit: Option<ProposedEdit>,
    pub state: ProposalState,
    pub review_reason: Option<ReviewReason>,
}

impl HealingProposal {
    pub fn operation(&self) -> &OperationId {
        &self.change.entry.operation
    }

    pub fn kind(&self) -> ChangeKind {
        self.change.entry.kind
    }

    pub fn is_pending(&self) -> bool {
        self.state == ProposalState::Pending
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_matches_cli_defaults() {
        let config = HealConfig::default();
        assert_eq!(config.confidence_threshold, 0.6);
        assert_eq!(config.mode, HealMode::Review);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_out_of_range_threshold() {
        let config = HealConfig { confidence_threshold: 1.5, ..HealConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_inverted_rename_policy() {
        let config = HealConfig {
            rename: RenamePolicy { similarity_threshold: 0.7, ambiguity_band: 0.9 },
            ..HealConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_edit_action_mapping_never_applies_removed_operations() {
        assert_eq!(
            EditAction::for_kind(ChangeKind::OperationRemoved),
            EditAction::FlagForRewrite
        );
        assert_eq!(EditAction::for_kind(ChangeKind::Unclassified), EditAction::FlagForRewrite);
        assert_eq!(EditAction::for_kind(ChangeKind::FieldRenamed), EditAction::RenameField);
    }
}
