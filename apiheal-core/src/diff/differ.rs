//! Contract differ
//!
//! Pure structural comparison of two [`ContractDocument`]s. Operations are
//! matched by (method, path); within a matched operation, parameters are
//! matched by (location, name) and body fields by name. Renames are inferred heuristically from
//! removed/added pairs sharing type and required-ness; ambiguous candidates
//! are emitted alongside the weaker add+remove pair, never silently dropped.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use similar::TextDiff;
use tracing::debug;

use crate::contract::{
    ContractDocument, FieldDef, Operation, OperationId, ParamLocation, SchemaShape,
};

use super::{
    ChangeKind, ChangeValue, DiffEntry, DriftWarning, FieldPath, FieldScope, RenamePolicy,
};

/// Complete diff of one contract pair
#[derive(Debug, Clone, PartialEq)]
pub struct DiffReport {
    pub entries: Vec<DiffEntry>,
    pub warnings: Vec<DriftWarning>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Computes the set of differences between two contract versions
#[derive(Debug, Clone, Default)]
pub struct ContractDiffer {
    rename: RenamePolicy,
}

impl ContractDiffer {
    pub fn new(rename: RenamePolicy) -> Self {
        Self { rename }
    }

    /// Diff `old` against `new`. No side effects; `diff(x, x)` is empty.
    pub fn diff(&self, old: &ContractDocument, new: &ContractDocument) -> DiffReport {
        let mut entries: BTreeMap<String, DiffEntry> = BTreeMap::new();
        let mut warnings = Vec::new();

        for id in old.operations.keys() {
            if !new.operations.contains_key(id) {
                insert(
                    &mut entries,
                    DiffEntry {
                        operation: id.clone(),
                        kind: ChangeKind::OperationRemoved,
                        path: FieldPath::operation(),
                        before: Some(ChangeValue::Operation(id.clone())),
                        after: None,
                        ambiguous: false,
                    },
                );
            }
        }

        for id in new.operations.keys() {
            if !old.operations.contains_key(id) {
                insert(
                    &mut entries,
                    DiffEntry {
                        operation: id.clone(),
                        kind: ChangeKind::OperationAdded,
                        path: FieldPath::operation(),
                        before: None,
                        after: Some(ChangeValue::Operation(id.clone())),
                        ambiguous: false,
                    },
                );
            }
        }

        for (id, old_op) in &old.operations {
            if let Some(new_op) = new.operations.get(id) {
                self.diff_operation(id, old_op, new_op, &mut entries, &mut warnings);
            }
        }

        debug!(
            "diffed '{}' {} -> {}: {} entries, {} warnings",
            old.title,
            old.version,
            new.version,
            entries.len(),
            warnings.len()
        );

        DiffReport { entries: entries.into_values().collect(), warnings }
    }

    fn diff_operation(
        &self,
        id: &OperationId,
        old: &Operation,
        new: &Operation,
        entries: &mut BTreeMap<String, DiffEntry>,
        warnings: &mut Vec<DriftWarning>,
    ) {
        // Parameters are matched per (location, name): the contract model
        // allows the same name in different locations, and those must never
        // shadow each other in the diff.
        for location in ParamLocation::ALL {
            let old_params = params_at(old, location);
            let new_params = params_at(new, location);
            if old_params.is_empty() && new_params.is_empty() {
                continue;
            }
            self.diff_fields(
                id,
                FieldScope::Parameters(location),
                &old_params,
                &new_params,
                entries,
                warnings,
            );
        }

        let empty = SchemaShape::new();
        let old_req = old.request.as_ref().unwrap_or(&empty);
        let new_req = new.request.as_ref().unwrap_or(&empty);
        self.diff_fields(
            id,
            FieldScope::Request,
            &old_req.fields,
            &new_req.fields,
            entries,
            warnings,
        );

        for status in old.responses.keys() {
            if !new.responses.contains_key(status) {
                insert(
                    entries,
                    DiffEntry {
                        operation: id.clone(),
                        kind: ChangeKind::StatusCodeRemoved,
                        path: FieldPath::response(*status),
                        before: Some(ChangeValue::Status(*status)),
                        after: None,
                        ambiguous: false,
                    },
                );
            }
        }

        for status in new.responses.keys() {
            if !old.responses.contains_key(status) {
                insert(
                    entries,
                    DiffEntry {
                        operation: id.clone(),
                        kind: ChangeKind::StatusCodeAdded,
                        path: FieldPath::response(*status),
                        before: None,
                        after: Some(ChangeValue::Status(*status)),
                        ambiguous: false,
                    },
                );
            }
        }

        for (status, old_shape) in &old.responses {
            if let Some(new_shape) = new.responses.get(status) {
                self.diff_fields(
                    id,
                    FieldScope::Response(*status),
                    &old_shape.fields,
                    &new_shape.fields,
                    entries,
                    warnings,
                );
            }
        }
    }

    fn diff_fields(
        &self,
        id: &OperationId,
        scope: FieldScope,
        old_fields: &[FieldDef],
        new_fields: &[FieldDef],
        entries: &mut BTreeMap<String, DiffEntry>,
        warnings: &mut Vec<DriftWarning>,
    ) {
        let old_names: BTreeMap<&str, &FieldDef> =
            old_fields.iter().map(|f| (f.name.as_str(), f)).collect();
        let new_names: BTreeMap<&str, &FieldDef> =
            new_fields.iter().map(|f| (f.name.as_str(), f)).collect();

        for (name, old_field) in &old_names {
            if let Some(new_field) = new_names.get(name) {
                if old_field.data_type != new_field.data_type {
                    insert(
                        entries,
                        DiffEntry {
                            operation: id.clone(),
                            kind: ChangeKind::TypeChanged,
                            path: path_for(scope, name),
                            before: Some(ChangeValue::Type(old_field.data_type.clone())),
                            after: Some(ChangeValue::Type(new_field.data_type.clone())),
                            ambiguous: false,
                        },
                    );
                } else if old_field.required != new_field.required {
                    insert(
                        entries,
                        DiffEntry {
                            operation: id.clone(),
                            kind: ChangeKind::ParameterRequiredChanged,
                            path: path_for(scope, name),
                            before: Some(ChangeValue::Required(old_field.required)),
                            after: Some(ChangeValue::Required(new_field.required)),
                            ambiguous: false,
                        },
                    );
                }
            }
        }

        let removed: Vec<&FieldDef> = old_fields
            .iter()
            .filter(|f| !new_names.contains_key(f.name.as_str()))
            .collect();
        let added: Vec<&FieldDef> = new_fields
            .iter()
            .filter(|f| !old_names.contains_key(f.name.as_str()))
            .collect();

        self.match_renames(id, scope, &removed, &added, entries, warnings);
    }

    /// Pair up removed and added fields that look like renames. A unique
    /// candidate at or above the similarity threshold becomes a single
    /// `field_renamed` entry; weaker or contested candidates are flagged
    /// ambiguous and the add+remove pair is kept.
    fn match_renames(
        &self,
        id: &OperationId,
        scope: FieldScope,
        removed: &[&FieldDef],
        added: &[&FieldDef],
        entries: &mut BTreeMap<String, DiffEntry>,
        warnings: &mut Vec<DriftWarning>,
    ) {
        let mut claimed: HashSet<String> = HashSet::new();

        for old_field in removed {
            let mut scored: Vec<(&FieldDef, f64)> = added
                .iter()
                .filter(|f| !claimed.contains(&f.name))
                .filter(|f| {
                    f.data_type == old_field.data_type && f.required == old_field.required
                })
                .map(|f| (*f, similarity(&old_field.name, &f.name)))
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

            let best = scored.first().copied();
            let runner_up = scored.get(1).map(|(_, s)| *s).unwrap_or(0.0);

            match best {
                Some((new_field, sim))
                    if sim >= self.rename.similarity_threshold
                        && runner_up < self.rename.similarity_threshold =>
                {
                    insert(
                        entries,
                        DiffEntry {
                            operation: id.clone(),
                            kind: ChangeKind::FieldRenamed,
                            path: path_for(scope, &old_field.name),
                            before: Some(ChangeValue::Field((*old_field).clone())),
                            after: Some(ChangeValue::Field(new_field.clone())),
                            ambiguous: false,
                        },
                    );
                    claimed.insert(new_field.name.clone());
                }
                Some((new_field, sim)) if sim >= self.rename.ambiguity_band => {
                    // Candidate exists but the heuristic cannot settle it:
                    // emit the flagged rename plus the add+remove pair.
                    insert(
                        entries,
                        DiffEntry {
                            operation: id.clone(),
                            kind: ChangeKind::FieldRenamed,
                            path: path_for(scope, &old_field.name),
                            before: Some(ChangeValue::Field((*old_field).clone())),
                            after: Some(ChangeValue::Field(new_field.clone())),
                            ambiguous: true,
                        },
                    );
                    insert(
                        entries,
                        DiffEntry {
                            operation: id.clone(),
                            kind: ChangeKind::FieldRemoved,
                            path: path_for(scope, &old_field.name),
                            before: Some(ChangeValue::Field((*old_field).clone())),
                            after: None,
                            ambiguous: false,
                        },
                    );
                    warnings.push(DriftWarning::AmbiguousRename {
                        operation: id.clone(),
                        path: path_for(scope, &old_field.name),
                        from: old_field.name.clone(),
                        to: new_field.name.clone(),
                        similarity: sim,
                    });
                }
                _ => {
                    insert(
                        entries,
                        DiffEntry {
                            operation: id.clone(),
                            kind: ChangeKind::FieldRemoved,
                            path: path_for(scope, &old_field.name),
                            before: Some(ChangeValue::Field((*old_field).clone())),
                            after: None,
                            ambiguous: false,
                        },
                    );
                }
            }
        }

        for new_field in added {
            if !claimed.contains(&new_field.name) {
                insert(
                    entries,
                    DiffEntry {
                        operation: id.clone(),
                        kind: ChangeKind::FieldAdded,
                        path: path_for(scope, &new_field.name),
                        before: None,
                        after: Some(ChangeValue::Field((*new_field).clone())),
                        ambiguous: false,
                    },
                );
            }
        }
    }
}

fn params_at(operation: &Operation, location: ParamLocation) -> Vec<FieldDef> {
    operation
        .parameters
        .iter()
        .filter(|p| p.location == location)
        .map(|p| FieldDef::new(p.name.clone(), p.data_type.clone(), p.required))
        .collect()
}

fn insert(entries: &mut BTreeMap<String, DiffEntry>, entry: DiffEntry) {
    entries.entry(entry.key()).or_insert(entry);
}

fn path_for(scope: FieldScope, name: &str) -> FieldPath {
    FieldPath { scope, field: Some(name.to_string()) }
}

/// Char-level diff ratio over lowercased names, in [0,1].
fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    f64::from(TextDiff::from_chars(a.as_str(), b.as_str()).ratio())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FieldType, HttpMethod, Operation, ParamLocation, Parameter};

    fn pets_get(shape: SchemaShape) -> ContractDocument {
        ContractDocument::new("Pet Store", "1.0.0").with_operation(
            OperationId::new(HttpMethod::Get, "/pets"),
            Operation::new().with_response(200, shape),
        )
    }

    #[test]
    fn test_diff_of_identical_contracts_is_empty() {
        let contract = pets_get(
            SchemaShape::new().with_field(FieldDef::new("petId", FieldType::Integer, true)),
        );
        let report = ContractDiffer::default().diff(&contract, &contract);
        assert!(report.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_case_change_is_a_confident_rename() {
        let old = pets_get(
            SchemaShape::new().with_field(FieldDef::new("petId", FieldType::Integer, true)),
        );
        let new = pets_get(
            SchemaShape::new().with_field(FieldDef::new("petID", FieldType::Integer, true)),
        );

        let report = ContractDiffer::default().diff(&old, &new);
        assert_eq!(report.entries.len(), 1);
        let entry = &report.entries[0];
        assert_eq!(entry.kind, ChangeKind::FieldRenamed);
        assert!(!entry.ambiguous);
        assert_eq!(entry.path.to_string(), "responses.200.petId");
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_type_mismatch_blocks_rename_inference() {
        let old = pets_get(
            SchemaShape::new().with_field(FieldDef::new("petId", FieldType::Integer, true)),
        );
        let new = pets_get(
            SchemaShape::new().with_field(FieldDef::new("petID", FieldType::String, true)),
        );

        let report = ContractDiffer::default().diff(&old, &new);
        let kinds: Vec<ChangeKind> = report.entries.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&ChangeKind::FieldRemoved));
        assert!(kinds.contains(&ChangeKind::FieldAdded));
        assert!(!kinds.contains(&ChangeKind::FieldRenamed));
    }

    #[test]
    fn test_contested_rename_is_flagged_ambiguous() {
        let old = pets_get(
            SchemaShape::new().with_field(FieldDef::new("petName", FieldType::String, true)),
        );
        // Two candidates of the same type and required-ness, both close.
        let new = pets_get(
            SchemaShape::new()
                .with_field(FieldDef::new("petNames", FieldType::String, true))
                .with_field(FieldDef::new("petName2", FieldType::String, true)),
        );

        let report = ContractDiffer::default().diff(&old, &new);
        let rename = report
            .entries
            .iter()
            .find(|e| e.kind == ChangeKind::FieldRenamed)
            .unwrap();
        assert!(rename.ambiguous);

        let kinds: Vec<ChangeKind> = report.entries.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&ChangeKind::FieldRemoved));
        assert!(kinds.contains(&ChangeKind::FieldAdded));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_operation_removed_and_added() {
        let delete_id = OperationId::new(HttpMethod::Delete, "/pets/{id}");
        let put_id = OperationId::new(HttpMethod::Put, "/pets/{id}");
        let old = ContractDocument::new("Pet Store", "1.0.0")
            .with_operation(delete_id.clone(), Operation::new());
        let new = ContractDocument::new("Pet Store", "1.1.0")
            .with_operation(put_id.clone(), Operation::new());

        let report = ContractDiffer::default().diff(&old, &new);
        assert_eq!(report.entries.len(), 2);
        assert!(report
            .entries
            .iter()
            .any(|e| e.kind == ChangeKind::OperationRemoved && e.operation == delete_id));
        assert!(report
            .entries
            .iter()
            .any(|e| e.kind == ChangeKind::OperationAdded && e.operation == put_id));
    }

    #[test]
    fn test_status_code_added() {
        let old = pets_get(SchemaShape::new());
        let mut new = old.clone();
        new.operations
            .get_mut(&OperationId::new(HttpMethod::Get, "/pets"))
            .unwrap()
            .responses
            .insert(404, SchemaShape::new());

        let report = ContractDiffer::default().diff(&old, &new);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].kind, ChangeKind::StatusCodeAdded);
        assert_eq!(report.entries[0].path.to_string(), "responses.404");
    }

    #[test]
    fn test_parameter_required_flip() {
        let make = |required| {
            ContractDocument::new("Pet Store", "1.0.0").with_operation(
                OperationId::new(HttpMethod::Get, "/pets"),
                Operation::new().with_parameter(Parameter::new(
                    "limit",
                    ParamLocation::Query,
                    FieldType::Integer,
                    required,
                )),
            )
        };

        let report = ContractDiffer::default().diff(&make(false), &make(true));
        assert_eq!(report.entries.len(), 1);
        let entry = &report.entries[0];
        assert_eq!(entry.kind, ChangeKind::ParameterRequiredChanged);
        assert_eq!(entry.before, Some(ChangeValue::Required(false)));
        assert_eq!(entry.after, Some(ChangeValue::Required(true)));
    }

    #[test]
    fn test_same_named_parameters_in_different_locations_do_not_shadow() {
        let make = |path_type: FieldType| {
            ContractDocument::new("Pet Store", "1.0.0").with_operation(
                OperationId::new(HttpMethod::Get, "/pets/{id}"),
                Operation::new()
                    .with_parameter(Parameter::new("id", ParamLocation::Path, path_type, true))
                    .with_parameter(Parameter::new(
                        "id",
                        ParamLocation::Query,
                        FieldType::String,
                        false,
                    )),
            )
        };

        let report =
            ContractDiffer::default().diff(&make(FieldType::Integer), &make(FieldType::String));
        assert_eq!(report.entries.len(), 1);
        let entry = &report.entries[0];
        assert_eq!(entry.kind, ChangeKind::TypeChanged);
        assert_eq!(entry.path.to_string(), "parameters.path.id");
        assert_eq!(entry.before, Some(ChangeValue::Type(FieldType::Integer)));
    }

    #[test]
    fn test_entries_are_unique_per_key() {
        let old = pets_get(
            SchemaShape::new().with_field(FieldDef::new("petId", FieldType::Integer, true)),
        );
        let new = pets_get(
            SchemaShape::new().with_field(FieldDef::new("identifier", FieldType::Integer, true)),
        );

        let report = ContractDiffer::default().diff(&old, &new);
        let mut keys: Vec<String> = report.entries.iter().map(|e| e.key()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_similarity_is_symmetric_enough_for_case_changes() {
        assert!(similarity("petId", "petID") > 0.99);
        assert!(similarity("petId", "ownerEmail") < 0.5);
    }
}
