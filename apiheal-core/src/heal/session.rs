//! Review session
//!
//! Explicit state machine (`pending -> {applied, rejected, expired}`)
//! driven by discrete external calls, so approval flows are testable
//! without simulating terminal input. In interactive mode decisions must
//! target the current proposal; cancelling mid-sequence leaves remaining
//! proposals pending so a resumed run can continue.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditDecision, AuditError, AuditRecord, AuditSink};
use crate::diff::ChangeKind;

use super::{
    AppliedEdit, HealError, HealMode, HealingProposal, PatchApplier, ProposalState, Result,
    ReviewReason,
};

/// Outcome of an approval call
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Applied(AppliedEdit),
    /// Approval arrived but the target artifact is gone; the proposal was
    /// rejected with reason instead
    TargetMissing,
}

/// Holds a run's proposals and drives them to terminal states
pub struct ReviewSession {
    run_id: Uuid,
    mode: HealMode,
    proposals: Vec<HealingProposal>,
    applied: Vec<AppliedEdit>,
    audit_warnings: Vec<String>,
    cancelled: bool,
    applier: PatchApplier,
    audit: Arc<dyn AuditSink>,
}

impl ReviewSession {
    pub(crate) fn new(
        run_id: Uuid,
        mode: HealMode,
        proposals: Vec<HealingProposal>,
        applier: PatchApplier,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            run_id,
            mode,
            proposals,
            applied: Vec::new(),
            audit_warnings: Vec::new(),
            cancelled: false,
            applier,
            audit,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn mode(&self) -> HealMode {
        self.mode
    }

    pub fn proposals(&self) -> &[HealingProposal] {
        &self.proposals
    }

    pub fn pending(&self) -> impl Iterator<Item = &HealingProposal> {
        self.proposals.iter().filter(|p| p.is_pending())
    }

    pub fn applied_edits(&self) -> &[AppliedEdit] {
        &self.applied
    }

    /// Non-fatal audit conditions surfaced during this session
    pub fn audit_warnings(&self) -> &[String] {
        &self.audit_warnings
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The proposal a caller in interactive mode must decide next.
    pub fn current(&self) -> Option<&HealingProposal> {
        self.pending().next()
    }

    /// Approve one pending proposal. Applies it and records the decision,
    /// or rejects it when the target artifact no longer exists.
    pub async fn approve(&mut self, id: &str) -> Result<DecisionOutcome> {
        let idx = self.checked_index(id)?;

        if self.proposals[idx].edit.is_none() {
            let reason = "target artifact missing";
            warn!("proposal {} approved but {}", id, reason);
            self.proposals[idx].state = ProposalState::Rejected { reason: reason.to_string() };
            let record =
                self.audit_record(idx, AuditDecision::Denied, Some(reason.to_string()));
            self.push_audit(record).await?;
            return Ok(DecisionOutcome::TargetMissing);
        }

        let snapshot = self.proposals[idx].clone();
        let applied = self.applier.apply(&snapshot).await?;
        self.proposals[idx].state = ProposalState::Applied;
        self.applied.push(applied.clone());
        info!("proposal {} approved and applied", id);

        let record = self.audit_record(idx, AuditDecision::Approved, None);
        self.push_audit(record).await?;
        Ok(DecisionOutcome::Applied(applied))
    }

    /// Deny one pending proposal with a reason.
    pub async fn deny(&mut self, id: &str, reason: impl Into<String>) -> Result<()> {
        let idx = self.checked_index(id)?;
        let reason = reason.into();

        self.proposals[idx].state = ProposalState::Rejected { reason: reason.clone() };
        info!("proposal {} denied: {}", id, reason);

        let record = self.audit_record(idx, AuditDecision::Denied, Some(reason));
        self.push_audit(record).await?;
        Ok(())
    }

    /// Expire a pending proposal, e.g. when a newer healing run supersedes
    /// this session.
    pub async fn expire(&mut self, id: &str) -> Result<()> {
        let idx = self.checked_index(id)?;

        self.proposals[idx].state = ProposalState::Expired;
        info!("proposal {} expired", id);

        let record = self.audit_record(idx, AuditDecision::Expired, None);
        self.push_audit(record).await?;
        Ok(())
    }

    /// Stop reviewing. Remaining proposals stay pending, not rejected.
    pub fn cancel(&mut self) {
        let remaining = self.pending().count();
        info!("session {} cancelled with {} proposals pending", self.run_id, remaining);
        self.cancelled = true;
    }

    /// Auto-mode resolution: apply at/above the threshold up to the cap,
    /// reject below-threshold proposals with reason, and route
    /// never-auto-healable kinds to review.
    pub(crate) async fn resolve_auto(&mut self, threshold: f64, cap: usize) -> Result<()> {
        let mut auto_applied = 0usize;

        for idx in 0..self.proposals.len() {
            if !self.proposals[idx].is_pending() {
                continue;
            }

            let confidence = self.proposals[idx].confidence;
            let kind = self.proposals[idx].kind();
            let never_auto =
                matches!(kind, ChangeKind::OperationRemoved | ChangeKind::Unclassified);

            if never_auto {
                // Removed operations and unclassified changes are flagged,
                // never silently dropped or auto-rejected.
                self.proposals[idx].review_reason = Some(ReviewReason::NeverAutoHealable);
                continue;
            }

            if self.proposals[idx].edit.is_none() {
                let reason = "target artifact missing";
                self.proposals[idx].state =
                    ProposalState::Rejected { reason: reason.to_string() };
                let record =
                    self.audit_record(idx, AuditDecision::Denied, Some(reason.to_string()));
                self.push_audit(record).await?;
                continue;
            }

            if confidence >= threshold {
                if auto_applied >= cap {
                    warn!(
                        "auto-heal cap ({}) reached; {} forced to review",
                        cap, self.proposals[idx].id
                    );
                    self.proposals[idx].review_reason = Some(ReviewReason::AutoHealCapReached);
                    continue;
                }

                let snapshot = self.proposals[idx].clone();
                let applied = self.applier.apply(&snapshot).await?;
                self.proposals[idx].state = ProposalState::Applied;
                self.applied.push(applied);
                auto_applied += 1;

                let record = self.audit_record(idx, AuditDecision::AutoApplied, None);
                self.push_audit(record).await?;
            } else {
                let reason = "below confidence threshold";
                self.proposals[idx].state =
                    ProposalState::Rejected { reason: reason.to_string() };
                let record =
                    self.audit_record(idx, AuditDecision::Denied, Some(reason.to_string()));
                self.push_audit(record).await?;
            }
        }

        info!("auto resolution applied {} proposals", auto_applied);
        Ok(())
    }

    /// Locate a pending proposal by id, enforcing interactive ordering.
    fn checked_index(&self, id: &str) -> Result<usize> {
        if self.cancelled {
            return Err(HealError::SessionCancelled);
        }

        if self.mode == HealMode::Interactive {
            let current = self
                .current()
                .ok_or_else(|| HealError::UnknownProposal(id.to_string()))?;
            if current.id != id {
                return Err(HealError::OutOfOrderDecision {
                    expected: current.id.clone(),
                    got: id.to_string(),
                });
            }
        }

        let idx = self
            .proposals
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| HealError::UnknownProposal(id.to_string()))?;
        if !self.proposals[idx].is_pending() {
            return Err(HealError::NotPending(id.to_string()));
        }
        Ok(idx)
    }

    fn audit_record(
        &self,
        idx: usize,
        decision: AuditDecision,
        reason: Option<String>,
    ) -> AuditRecord {
        let proposal = &self.proposals[idx];
        AuditRecord {
            run_id: self.run_id,
            proposal_id: proposal.id.clone(),
            operation: proposal.operation().clone(),
            kind: proposal.kind(),
            confidence: proposal.confidence,
            edit: proposal.edit.clone(),
            decision,
            reason,
            recorded_at: chrono::Utc::now(),
        }
    }

    /// Append to the ledger; a duplicate identity is skipped with a
    /// surfaced warning rather than aborting the batch.
    async fn push_audit(&mut self, record: AuditRecord) -> Result<()> {
        match self.audit.record(&record).await {
            Ok(()) => Ok(()),
            Err(AuditError::Duplicate(id)) => {
                warn!("duplicate audit record skipped: {}", id);
                self.audit_warnings.push(format!("duplicate audit record skipped: {}", id));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
