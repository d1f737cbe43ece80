//! Append-only audit ledger of healing decisions
//!
//! Every terminal proposal produces exactly one [`AuditRecord`]. Records
//! are never mutated after creation; re-recording a proposal identity is
//! rejected with [`AuditError::Duplicate`]. Queries expose a filtered,
//! non-mutating read of the ledger.

pub mod ledger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::contract::OperationId;
use crate::diff::ChangeKind;
use crate::heal::ProposedEdit;

pub use ledger::{JsonlLedger, MemoryLedger};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("duplicate audit record for proposal {0}")]
    Duplicate(String),

    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Decision captured alongside a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditDecision {
    AutoApplied,
    Approved,
    Denied,
    Expired,
}

impl fmt::Display for AuditDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AutoApplied => "auto-applied",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Expired => "expired",
        };
        write!(f, "{}", name)
    }
}

/// Immutable ledger entry for one terminal proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub run_id: Uuid,
    pub proposal_id: String,
    pub operation: OperationId,
    pub kind: ChangeKind,
    pub confidence: f64,
    pub edit: Option<ProposedEdit>,
    pub decision: AuditDecision,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Filter for ledger queries; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub operation: Option<OperationId>,
    pub kind: Option<ChangeKind>,
    pub decision: Option<AuditDecision>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: OperationId) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_kind(mut self, kind: ChangeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_decision(mut self, decision: AuditDecision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn since(mut self, instant: DateTime<Utc>) -> Self {
        self.since = Some(instant);
        self
    }

    pub fn until(mut self, instant: DateTime<Utc>) -> Self {
        self.until = Some(instant);
        self
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(operation) = &self.operation {
            if &record.operation != operation {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(decision) = self.decision {
            if record.decision != decision {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.recorded_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.recorded_at > until {
                return false;
            }
        }
        true
    }
}

/// Append-only sink for audit records
///
/// `record` must reject a proposal identity it has already seen; `query`
/// exposes no mutation. The sink is the single serialization point of a
/// healing run.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record; duplicate proposal identities are rejected.
    async fn record(&self, record: &AuditRecord) -> Result<()>;

    /// All records matching `filter`, in insertion order.
    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>>;

    /// Number of records in the ledger.
    async fn count(&self) -> Result<usize>;
}
