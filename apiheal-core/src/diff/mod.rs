//! Structural diffing between two contract versions
//!
//! The differ produces an order-independent, duplicate-free set of
//! [`DiffEntry`] values; the classifier finalizes each entry's
//! [`ChangeKind`] and attaches a structured rationale. Both are pure
//! functions of their inputs.

pub mod classifier;
pub mod differ;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::contract::{FieldDef, FieldType, OperationId, ParamLocation};

pub use classifier::{ChangeClassifier, ClassifiedChange, MatchRule, Rationale};
pub use differ::{ContractDiffer, DiffReport};

/// Taxonomy of detected contract changes
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    FieldRenamed,
    FieldAdded,
    FieldRemoved,
    TypeChanged,
    StatusCodeAdded,
    StatusCodeRemoved,
    OperationAdded,
    OperationRemoved,
    ParameterRequiredChanged,
    Unclassified,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FieldRenamed => "field_renamed",
            Self::FieldAdded => "field_added",
            Self::FieldRemoved => "field_removed",
            Self::TypeChanged => "type_changed",
            Self::StatusCodeAdded => "status_code_added",
            Self::StatusCodeRemoved => "status_code_removed",
            Self::OperationAdded => "operation_added",
            Self::OperationRemoved => "operation_removed",
            Self::ParameterRequiredChanged => "parameter_required_changed",
            Self::Unclassified => "unclassified",
        };
        write!(f, "{}", name)
    }
}

/// Region of an operation a diff entry points into
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldScope {
    /// Two parameters may legally share a name across locations, so the
    /// location is part of diff identity.
    Parameters(ParamLocation),
    Request,
    Response(u16),
    Operation,
}

/// Path to the affected field within an operation
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FieldPath {
    pub scope: FieldScope,
    pub field: Option<String>,
}

impl FieldPath {
    pub fn parameter(location: ParamLocation, name: impl Into<String>) -> Self {
        Self { scope: FieldScope::Parameters(location), field: Some(name.into()) }
    }

    pub fn request_field(name: impl Into<String>) -> Self {
        Self { scope: FieldScope::Request, field: Some(name.into()) }
    }

    pub fn response_field(status: u16, name: impl Into<String>) -> Self {
        Self { scope: FieldScope::Response(status), field: Some(name.into()) }
    }

    pub fn response(status: u16) -> Self {
        Self { scope: FieldScope::Response(status), field: None }
    }

    pub fn operation() -> Self {
        Self { scope: FieldScope::Operation, field: None }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            FieldScope::Parameters(location) => write!(f, "parameters.{}", location)?,
            FieldScope::Request => write!(f, "request")?,
            FieldScope::Response(status) => write!(f, "responses.{}", status)?,
            FieldScope::Operation => write!(f, "operation")?,
        }
        if let Some(field) = &self.field {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

/// Before/after payload of a diff entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeValue {
    Field(FieldDef),
    Type(FieldType),
    Status(u16),
    Required(bool),
    Operation(OperationId),
}

/// One detected difference between the old and new contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub operation: OperationId,
    pub kind: ChangeKind,
    pub path: FieldPath,
    pub before: Option<ChangeValue>,
    pub after: Option<ChangeValue>,
    /// Set on rename candidates the heuristic could not settle
    pub ambiguous: bool,
}

impl DiffEntry {
    /// Unique identity: one entry per (operation, field path, kind).
    pub fn key(&self) -> String {
        format!("{}::{}::{}", self.operation, self.path, self.kind)
    }
}

/// Non-fatal condition surfaced alongside the diff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "warning")]
pub enum DriftWarning {
    AmbiguousRename {
        operation: OperationId,
        path: FieldPath,
        from: String,
        to: String,
        similarity: f64,
    },
}

impl fmt::Display for DriftWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousRename { operation, from, to, similarity, .. } => write!(
                f,
                "{}: ambiguous rename '{}' -> '{}' (similarity {:.2})",
                operation, from, to, similarity
            ),
        }
    }
}

/// Tunables for the rename heuristic. Similarity is a char-level diff
/// ratio over lowercased names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenamePolicy {
    /// At or above this ratio a unique candidate is treated as a rename
    pub similarity_threshold: f64,
    /// Ratios in [ambiguity_band, similarity_threshold) flag an ambiguous
    /// candidate instead
    pub ambiguity_band: f64,
}

impl Default for RenamePolicy {
    fn default() -> Self {
        Self { similarity_threshold: 0.75, ambiguity_band: 0.6 }
    }
}
