//! Confidence scorer
//!
//! Deterministic function of a classified change and its structural
//! context. Base scores per kind are policy and configurable; two kinds
//! are pinned regardless of policy: `unclassified` and `operation_removed`
//! always score 0 and are never auto-healed.

use serde::{Deserialize, Serialize};

use crate::diff::{ChangeKind, ChangeValue, ClassifiedChange, FieldScope, MatchRule};

/// Per-kind base scores. Ordering between the constants matters more than
/// their exact values; all outputs are clamped to [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePolicy {
    pub field_renamed: f64,
    /// Multiplier applied to rename candidates the differ flagged ambiguous
    pub ambiguous_rename_factor: f64,
    pub field_added_response: f64,
    pub field_added_optional: f64,
    pub field_added_required: f64,
    pub field_removed: f64,
    pub field_removed_required: f64,
    pub type_widened: f64,
    pub type_narrowed: f64,
    pub type_changed: f64,
    pub required_relaxed: f64,
    pub required_tightened: f64,
    pub status_code_added: f64,
    pub status_code_removed: f64,
    pub operation_added: f64,
}

impl Default for ScorePolicy {
    fn default() -> Self {
        Self {
            field_renamed: 0.8,
            ambiguous_rename_factor: 0.5,
            field_added_response: 0.9,
            field_added_optional: 0.7,
            field_added_required: 0.2,
            field_removed: 0.3,
            field_removed_required: 0.1,
            type_widened: 0.6,
            type_narrowed: 0.2,
            type_changed: 0.3,
            required_relaxed: 0.7,
            required_tightened: 0.2,
            status_code_added: 0.85,
            status_code_removed: 0.3,
            operation_added: 0.75,
        }
    }
}

/// Computes confidence that an automatic fix preserves test intent
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    policy: ScorePolicy,
}

impl ConfidenceScorer {
    pub fn new(policy: ScorePolicy) -> Self {
        Self { policy }
    }

    /// Score one classified change. Pure; same input, same output.
    pub fn score(&self, change: &ClassifiedChange) -> f64 {
        let entry = &change.entry;
        let raw = match entry.kind {
            // Pinned: a dropped operation must be flagged for humans, and
            // unmatched changes carry no safety evidence at all.
            ChangeKind::OperationRemoved | ChangeKind::Unclassified => return 0.0,

            ChangeKind::FieldRenamed => {
                let base = self.policy.field_renamed;
                if entry.ambiguous {
                    base * self.policy.ambiguous_rename_factor
                } else {
                    base
                }
            }

            ChangeKind::FieldAdded => match entry.path.scope {
                FieldScope::Response(_) => self.policy.field_added_response,
                _ => {
                    if required_flag(&entry.after) {
                        self.policy.field_added_required
                    } else {
                        self.policy.field_added_optional
                    }
                }
            },

            ChangeKind::FieldRemoved => {
                if required_flag(&entry.before) {
                    self.policy.field_removed_required
                } else {
                    self.policy.field_removed
                }
            }

            ChangeKind::TypeChanged => match change.rationale.rule {
                MatchRule::TypeWidened => self.policy.type_widened,
                MatchRule::TypeNarrowed => self.policy.type_narrowed,
                _ => self.policy.type_changed,
            },

            ChangeKind::ParameterRequiredChanged => {
                if required_flag(&entry.after) {
                    self.policy.required_tightened
                } else {
                    self.policy.required_relaxed
                }
            }

            ChangeKind::StatusCodeAdded => self.policy.status_code_added,
            ChangeKind::StatusCodeRemoved => self.policy.status_code_removed,
            ChangeKind::OperationAdded => self.policy.operation_added,
        };

        raw.clamp(0.0, 1.0)
    }
}

fn required_flag(value: &Option<ChangeValue>) -> bool {
    match value {
        Some(ChangeValue::Field(field)) => field.required,
        Some(ChangeValue::Required(flag)) => *flag,
        _ => false,
    }
}
