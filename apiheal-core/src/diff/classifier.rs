//! Change classifier
//!
//! Finalizes the [`ChangeKind`] of each diff entry and attaches a
//! structured rationale naming the rule that fired. Rules run in fixed
//! priority order, most specific first; an entry matched by no rule is
//! downgraded to `unclassified` and never auto-healed downstream.

use serde::{Deserialize, Serialize};

use crate::contract::TypeTransition;

use super::{ChangeKind, ChangeValue, DiffEntry};

/// Which classification rule fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    RenameSignature,
    AmbiguousRename,
    TypeWidened,
    TypeNarrowed,
    TypeChanged,
    RequiredFlipped,
    Additive,
    Removal,
    OperationLifecycle,
    NoRule,
}

/// Structured reason attached to a classified change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub rule: MatchRule,
    pub detail: String,
}

impl Rationale {
    fn new(rule: MatchRule, detail: impl Into<String>) -> Self {
        Self { rule, detail: detail.into() }
    }
}

/// A diff entry with finalized kind and rationale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedChange {
    pub entry: DiffEntry,
    pub rationale: Rationale,
}

/// Assigns each [`DiffEntry`] its final kind and rationale
#[derive(Debug, Clone, Default)]
pub struct ChangeClassifier {}

impl ChangeClassifier {
    pub fn new() -> Self {
        Self {}
    }

    /// Classify one entry. Deterministic: same entry, same result.
    pub fn classify(&self, entry: DiffEntry) -> ClassifiedChange {
        // Rule 1: exact rename signature (same type, same required-ness on
        // both sides of the candidate pair).
        if entry.kind == ChangeKind::FieldRenamed {
            return self.classify_rename(entry);
        }

        // Rule 2: type change, split by transition direction.
        if entry.kind == ChangeKind::TypeChanged {
            return self.classify_type_change(entry);
        }

        // Rule 3: required-ness flip.
        if entry.kind == ChangeKind::ParameterRequiredChanged {
            let detail = match (&entry.before, &entry.after) {
                (Some(ChangeValue::Required(false)), Some(ChangeValue::Required(true))) => {
                    "optional -> required".to_string()
                }
                (Some(ChangeValue::Required(true)), Some(ChangeValue::Required(false))) => {
                    "required -> optional".to_string()
                }
                _ => {
                    return self.unclassified(entry, "required flip without before/after flags");
                }
            };
            return ClassifiedChange {
                entry,
                rationale: Rationale::new(MatchRule::RequiredFlipped, detail),
            };
        }

        // Rule 4: additions and removals.
        match entry.kind {
            ChangeKind::FieldAdded | ChangeKind::StatusCodeAdded | ChangeKind::OperationAdded => {
                let detail = format!("additive change at {}", entry.path);
                ClassifiedChange {
                    entry,
                    rationale: Rationale::new(MatchRule::Additive, detail),
                }
            }
            ChangeKind::FieldRemoved | ChangeKind::StatusCodeRemoved => {
                let detail = format!("removal at {}", entry.path);
                ClassifiedChange { entry, rationale: Rationale::new(MatchRule::Removal, detail) }
            }
            ChangeKind::OperationRemoved => {
                let detail = format!("operation {} no longer exists", entry.operation);
                ClassifiedChange {
                    entry,
                    rationale: Rationale::new(MatchRule::OperationLifecycle, detail),
                }
            }
            _ => self.unclassified(entry, "no classification rule matched"),
        }
    }

    fn classify_rename(&self, entry: DiffEntry) -> ClassifiedChange {
        let (before, after) = match (&entry.before, &entry.after) {
            (Some(ChangeValue::Field(b)), Some(ChangeValue::Field(a))) => (b.clone(), a.clone()),
            _ => return self.unclassified(entry, "rename candidate without field pair"),
        };

        if before.data_type != after.data_type || before.required != after.required {
            return self.unclassified(entry, "rename candidate with mismatched signature");
        }

        let detail = format!("'{}' -> '{}'", before.name, after.name);
        let rule = if entry.ambiguous {
            MatchRule::AmbiguousRename
        } else {
            MatchRule::RenameSignature
        };
        ClassifiedChange { entry, rationale: Rationale::new(rule, detail) }
    }

    fn classify_type_change(&self, entry: DiffEntry) -> ClassifiedChange {
        let (before, after) = match (&entry.before, &entry.after) {
            (Some(ChangeValue::Type(b)), Some(ChangeValue::Type(a))) => (b.clone(), a.clone()),
            _ => return self.unclassified(entry, "type change without before/after types"),
        };

        let (rule, word) = match TypeTransition::between(&before, &after) {
            TypeTransition::Widening => (MatchRule::TypeWidened, "widened"),
            TypeTransition::Narrowing => (MatchRule::TypeNarrowed, "narrowed"),
            TypeTransition::Unrelated => (MatchRule::TypeChanged, "changed"),
        };
        let detail = format!("{} from {} to {}", word, before, after);
        ClassifiedChange { entry, rationale: Rationale::new(rule, detail) }
    }

    fn unclassified(&self, mut entry: DiffEntry, detail: &str) -> ClassifiedChange {
        entry.kind = ChangeKind::Unclassified;
        ClassifiedChange { entry, rationale: Rationale::new(MatchRule::NoRule, detail) }
    }
}
