//! Core engine for healing API test suites against contract drift
//!
//! Given two versions of an API contract, this crate diffs them, classifies
//! each difference, scores how safely it can be fixed automatically, and
//! applies structured edits to generated test artifacts gated by confidence
//! and human approval. Every decision lands in an append-only audit ledger.
//!
//! The CLI, dashboard and report renderers are collaborators that consume
//! this engine's outputs; they live outside this crate.

pub mod audit;
pub mod contract;
pub mod diff;
pub mod heal;

pub use audit::{AuditDecision, AuditFilter, AuditRecord, AuditSink, JsonlLedger, MemoryLedger};
pub use contract::{ContractDocument, HttpMethod, OpenApiIngester, OperationId};
pub use diff::{ChangeKind, ContractDiffer, DiffEntry, RenamePolicy};
pub use heal::{
    ArtifactCatalog, HealConfig, HealEngine, HealMode, HealRun, HealingProposal, ScorePolicy,
};
