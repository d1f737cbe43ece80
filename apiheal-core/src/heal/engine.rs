//! Healing engine
//!
//! Orchestrates one run: validate both contracts, diff, classify, score,
//! build proposals, then resolve them according to the configured mode.
//! Structural input errors abort the run before anything is applied;
//! per-proposal failures are isolated and recorded.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::AuditSink;
use crate::contract::ContractDocument;
use crate::diff::{ChangeClassifier, ContractDiffer, DriftWarning};

use super::{
    ArtifactCatalog, ConfidenceScorer, EditAction, HealConfig, HealMode, HealingProposal,
    PatchApplier, ProposalState, ProposedEdit, Result, ReviewReason, ReviewSession,
};

/// Result of one healing run
pub struct HealRun {
    pub run_id: Uuid,
    /// Non-fatal diff conditions (ambiguous renames)
    pub warnings: Vec<DriftWarning>,
    /// Proposal states and approval surface for this run
    pub session: ReviewSession,
}

/// Drives one (old, new) contract pair through the healing pipeline
pub struct HealEngine {
    config: HealConfig,
}

impl HealEngine {
    pub fn new(config: HealConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Execute a healing run with the default applier.
    pub async fn run(
        &self,
        old: &ContractDocument,
        new: &ContractDocument,
        artifacts: &ArtifactCatalog,
        audit: Arc<dyn AuditSink>,
    ) -> Result<HealRun> {
        self.run_with_applier(old, new, artifacts, audit, PatchApplier::new()).await
    }

    /// Execute a healing run with a caller-configured applier (e.g. one
    /// carrying a patch journal).
    pub async fn run_with_applier(
        &self,
        old: &ContractDocument,
        new: &ContractDocument,
        artifacts: &ArtifactCatalog,
        audit: Arc<dyn AuditSink>,
        applier: PatchApplier,
    ) -> Result<HealRun> {
        old.validate()?;
        new.validate()?;

        let run_id = Uuid::new_v4();
        info!(
            "healing run {} ({} mode): '{}' {} -> {}",
            run_id, self.config.mode, old.title, old.version, new.version
        );

        let differ = ContractDiffer::new(self.config.rename.clone());
        let report = differ.diff(old, new);

        let classifier = ChangeClassifier::new();
        let scorer = ConfidenceScorer::new(self.config.scores.clone());

        let mut proposals = Vec::with_capacity(report.entries.len());
        for entry in report.entries {
            let change = classifier.classify(entry);
            let confidence = scorer.score(&change);

            let edit = artifacts.locate(&change.entry.operation).map(|artifact| ProposedEdit {
                artifact: artifact.to_path_buf(),
                action: EditAction::for_kind(change.entry.kind),
                field_path: change.entry.path.to_string(),
                before: change.entry.before.clone(),
                after: change.entry.after.clone(),
            });

            let review_reason = match self.config.mode {
                HealMode::Auto => None,
                HealMode::Review | HealMode::Interactive => Some(ReviewReason::ModeReview),
            };

            debug!(
                "proposal {} ({}), confidence {:.2}",
                change.entry.key(),
                change.rationale.detail,
                confidence
            );
            proposals.push(HealingProposal {
                id: change.entry.key(),
                change,
                confidence,
                edit,
                state: ProposalState::Pending,
                review_reason,
            });
        }

        let mut session =
            ReviewSession::new(run_id, self.config.mode, proposals, applier, audit);

        if self.config.mode == HealMode::Auto {
            session
                .resolve_auto(
                    self.config.confidence_threshold,
                    self.config.max_auto_heals_per_run,
                )
                .await?;
        }

        info!(
            "run {} produced {} proposals ({} pending)",
            run_id,
            session.proposals().len(),
            session.pending().count()
        );
        Ok(HealRun { run_id, warnings: report.warnings, session })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditDecision, AuditFilter, MemoryLedger};
    use crate::contract::{
        FieldDef, FieldType, HttpMethod, Operation, OperationId, SchemaShape,
    };
    use crate::diff::ChangeKind;
    use crate::heal::DecisionOutcome;

    fn pets_contract(fields: Vec<FieldDef>) -> ContractDocument {
        let mut shape = SchemaShape::new();
        shape.fields = fields;
        ContractDocument::new("Pet Store", "1.0.0").with_operation(
            OperationId::new(HttpMethod::Get, "/pets"),
            Operation::new().with_response(200, shape),
        )
    }

    fn catalog() -> ArtifactCatalog {
        ArtifactCatalog::new()
            .with_target(OperationId::new(HttpMethod::Get, "/pets"), "tests/test_pets.py")
            .with_target(
                OperationId::new(HttpMethod::Delete, "/pets/{id}"),
                "tests/test_pets_delete.py",
            )
    }

    fn engine(mode: HealMode, threshold: f64) -> HealEngine {
        let config = HealConfig {
            mode,
            confidence_threshold: threshold,
            ..HealConfig::default()
        };
        HealEngine::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_scenario_a_rename_auto_applied() {
        let old = pets_contract(vec![FieldDef::new("petId", FieldType::Integer, true)]);
        let new = pets_contract(vec![FieldDef::new("petID", FieldType::Integer, true)]);
        let audit = Arc::new(MemoryLedger::new());

        let run = engine(HealMode::Auto, 0.6)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        let proposals = run.session.proposals();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].kind(), ChangeKind::FieldRenamed);
        assert!(proposals[0].confidence >= 0.8);
        assert_eq!(proposals[0].state, ProposalState::Applied);

        let records = audit
            .query(&AuditFilter::new().with_decision(AuditDecision::AutoApplied))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_b_operation_removed_routes_to_review() {
        let delete_id = OperationId::new(HttpMethod::Delete, "/pets/{id}");
        let old = ContractDocument::new("Pet Store", "1.0.0")
            .with_operation(delete_id.clone(), Operation::new());
        let new = ContractDocument::new("Pet Store", "1.1.0");
        let audit = Arc::new(MemoryLedger::new());

        // Threshold zero: even the most permissive policy must not apply it.
        let run = engine(HealMode::Auto, 0.0)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        let proposals = run.session.proposals();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].kind(), ChangeKind::OperationRemoved);
        assert_eq!(proposals[0].confidence, 0.0);
        assert_eq!(proposals[0].state, ProposalState::Pending);
        assert_eq!(proposals[0].review_reason, Some(ReviewReason::NeverAutoHealable));
        assert_eq!(audit.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scenario_c_optional_response_field_added() {
        let old = pets_contract(vec![FieldDef::new("petId", FieldType::Integer, true)]);
        let new = pets_contract(vec![
            FieldDef::new("petId", FieldType::Integer, true),
            FieldDef::new("nickname", FieldType::String, false),
        ]);
        let audit = Arc::new(MemoryLedger::new());

        let run = engine(HealMode::Auto, 0.6)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        let proposals = run.session.proposals();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].kind(), ChangeKind::FieldAdded);
        assert!(proposals[0].confidence >= 0.9);
        assert_eq!(proposals[0].state, ProposalState::Applied);
    }

    #[tokio::test]
    async fn test_scenario_d_cap_forces_overflow_to_review() {
        let old = pets_contract(vec![FieldDef::new("petId", FieldType::Integer, true)]);
        // Two optional response fields added, both scoring 0.9.
        let new = pets_contract(vec![
            FieldDef::new("petId", FieldType::Integer, true),
            FieldDef::new("nickname", FieldType::String, false),
            FieldDef::new("ownerName", FieldType::String, false),
        ]);
        let audit = Arc::new(MemoryLedger::new());

        let config = HealConfig {
            mode: HealMode::Auto,
            confidence_threshold: 0.9,
            max_auto_heals_per_run: 1,
            ..HealConfig::default()
        };
        let run = HealEngine::new(config)
            .unwrap()
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        let applied: Vec<_> = run
            .session
            .proposals()
            .iter()
            .filter(|p| p.state == ProposalState::Applied)
            .collect();
        let capped: Vec<_> = run
            .session
            .proposals()
            .iter()
            .filter(|p| p.review_reason == Some(ReviewReason::AutoHealCapReached))
            .collect();
        assert_eq!(applied.len(), 1);
        assert_eq!(capped.len(), 1);
        assert!(capped[0].is_pending());
        assert_eq!(audit.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_auto_mode_rejects_below_threshold_with_reason() {
        let old = pets_contract(vec![FieldDef::new("petId", FieldType::Integer, true)]);
        let new = pets_contract(vec![]);
        let audit = Arc::new(MemoryLedger::new());

        let run = engine(HealMode::Auto, 0.6)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        let proposals = run.session.proposals();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].kind(), ChangeKind::FieldRemoved);
        assert_eq!(
            proposals[0].state,
            ProposalState::Rejected { reason: "below confidence threshold".to_string() }
        );

        let denied = audit
            .query(&AuditFilter::new().with_decision(AuditDecision::Denied))
            .await
            .unwrap();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].reason.as_deref(), Some("below confidence threshold"));
    }

    #[tokio::test]
    async fn test_review_mode_applies_nothing_without_approval() {
        let old = pets_contract(vec![FieldDef::new("petId", FieldType::Integer, true)]);
        let new = pets_contract(vec![FieldDef::new("petID", FieldType::Integer, true)]);
        let audit = Arc::new(MemoryLedger::new());

        let run = engine(HealMode::Review, 0.0)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        assert!(run.session.proposals().iter().all(|p| p.is_pending()));
        assert_eq!(audit.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_review_approval_applies_and_records() {
        let old = pets_contract(vec![FieldDef::new("petId", FieldType::Integer, true)]);
        let new = pets_contract(vec![FieldDef::new("petID", FieldType::Integer, true)]);
        let audit = Arc::new(MemoryLedger::new());

        let mut run = engine(HealMode::Review, 0.6)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        let id = run.session.proposals()[0].id.clone();
        let outcome = run.session.approve(&id).await.unwrap();
        assert!(matches!(outcome, DecisionOutcome::Applied(_)));
        assert_eq!(run.session.applied_edits().len(), 1);

        let approved = audit
            .query(&AuditFilter::new().with_decision(AuditDecision::Approved))
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);

        // A second decision on the same proposal is refused.
        assert!(run.session.deny(&id, "changed my mind").await.is_err());
    }

    #[tokio::test]
    async fn test_expire_is_terminal_and_recorded() {
        let old = pets_contract(vec![FieldDef::new("petId", FieldType::Integer, true)]);
        let new = pets_contract(vec![FieldDef::new("petID", FieldType::Integer, true)]);
        let audit = Arc::new(MemoryLedger::new());

        let mut run = engine(HealMode::Review, 0.6)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        let id = run.session.proposals()[0].id.clone();
        run.session.expire(&id).await.unwrap();
        assert_eq!(run.session.proposals()[0].state, ProposalState::Expired);
        assert_eq!(run.session.pending().count(), 0);

        let expired = audit
            .query(&AuditFilter::new().with_decision(AuditDecision::Expired))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);

        // An expired proposal takes no further decisions.
        assert!(matches!(
            run.session.expire(&id).await.unwrap_err(),
            crate::heal::HealError::NotPending(_)
        ));
        assert!(run.session.approve(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_audit_record_is_skipped_with_warning() {
        let old = pets_contract(vec![FieldDef::new("petId", FieldType::Integer, true)]);
        let new = pets_contract(vec![FieldDef::new("petID", FieldType::Integer, true)]);
        let audit = Arc::new(MemoryLedger::new());

        // Two runs over the same drift share one ledger, so the second run
        // re-records the same proposal identity.
        let first = engine(HealMode::Auto, 0.6)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();
        assert!(first.session.audit_warnings().is_empty());

        let second = engine(HealMode::Auto, 0.6)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        assert_eq!(second.session.proposals()[0].state, ProposalState::Applied);
        assert_eq!(second.session.audit_warnings().len(), 1);
        assert!(second.session.audit_warnings()[0].contains("duplicate audit record"));
        assert_eq!(audit.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_interactive_mode_enforces_one_at_a_time() {
        let old = pets_contract(vec![
            FieldDef::new("petId", FieldType::Integer, true),
            FieldDef::new("name", FieldType::String, true),
        ]);
        let new = pets_contract(vec![]);
        let audit = Arc::new(MemoryLedger::new());

        let mut run = engine(HealMode::Interactive, 0.6)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();
        assert_eq!(run.session.proposals().len(), 2);

        let second = run.session.proposals()[1].id.clone();
        let err = run.session.deny(&second, "not yet").await.unwrap_err();
        assert!(matches!(err, crate::heal::HealError::OutOfOrderDecision { .. }));

        let first = run.session.current().unwrap().id.clone();
        run.session.deny(&first, "keep the assertion").await.unwrap();
        assert_eq!(run.session.current().unwrap().id, second);
    }

    #[tokio::test]
    async fn test_cancel_leaves_remaining_pending() {
        let old = pets_contract(vec![
            FieldDef::new("petId", FieldType::Integer, true),
            FieldDef::new("name", FieldType::String, true),
        ]);
        let new = pets_contract(vec![]);
        let audit = Arc::new(MemoryLedger::new());

        let mut run = engine(HealMode::Interactive, 0.6)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        let first = run.session.current().unwrap().id.clone();
        run.session.deny(&first, "no").await.unwrap();
        run.session.cancel();

        assert_eq!(run.session.pending().count(), 1);
        let remaining = run.session.current().unwrap().id.clone();
        assert!(matches!(
            run.session.approve(&remaining).await.unwrap_err(),
            crate::heal::HealError::SessionCancelled
        ));
        assert_eq!(run.session.pending().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_target_artifact_rejects_proposal_only() {
        let old = pets_contract(vec![FieldDef::new("petId", FieldType::Integer, true)]);
        let new = pets_contract(vec![FieldDef::new("petID", FieldType::Integer, true)]);
        let audit = Arc::new(MemoryLedger::new());

        // Empty catalog: no artifact covers GET /pets.
        let run = engine(HealMode::Auto, 0.6)
            .run(&old, &new, &ArtifactCatalog::new(), audit.clone())
            .await
            .unwrap();

        let proposals = run.session.proposals();
        assert_eq!(proposals.len(), 1);
        assert_eq!(
            proposals[0].state,
            ProposalState::Rejected { reason: "target artifact missing".to_string() }
        );
        assert_eq!(audit.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_contract_aborts_run() {
        let bad = ContractDocument::new("Pet Store", "1.0.0")
            .with_operation(OperationId::new(HttpMethod::Get, "pets"), Operation::new());
        let good = ContractDocument::new("Pet Store", "1.0.0");
        let audit = Arc::new(MemoryLedger::new());

        let result = engine(HealMode::Auto, 0.6).run(&bad, &good, &catalog(), audit.clone()).await;
        assert!(result.is_err());
        assert_eq!(audit.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_rename_surfaces_warning_and_is_not_auto_applied() {
        let old = pets_contract(vec![FieldDef::new("petName", FieldType::String, true)]);
        let new = pets_contract(vec![
            FieldDef::new("petNames", FieldType::String, true),
            FieldDef::new("petName2", FieldType::String, true),
        ]);
        let audit = Arc::new(MemoryLedger::new());

        let run = engine(HealMode::Auto, 0.6)
            .run(&old, &new, &catalog(), audit.clone())
            .await
            .unwrap();

        assert_eq!(run.warnings.len(), 1);
        let rename = run
            .session
            .proposals()
            .iter()
            .find(|p| p.kind() == ChangeKind::FieldRenamed)
            .unwrap();
        // Ambiguous rename scores 0.4 with default policy, below 0.6.
        assert_eq!(
            rename.state,
            ProposalState::Rejected { reason: "below confidence threshold".to_string() }
        );
    }
}
