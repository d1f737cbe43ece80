//! In-memory model of an API contract
//!
//! A `ContractDocument` is the immutable, already-parsed view of one version
//! of an API description. Two instances (old and new) are compared per
//! healing run. The engine never reads contract files itself; the
//! [`openapi`] submodule converts a parsed OpenAPI document into this model.

pub mod openapi;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

pub use openapi::OpenApiIngester;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("malformed contract: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ContractError>;

/// HTTP method of an operation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        };
        write!(f, "{}", name)
    }
}

/// Identity of an operation: method plus path template
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OperationId {
    pub method: HttpMethod,
    pub path: String,
}

impl OperationId {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self { method, path: path.into() }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Wire type of a parameter or schema field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Closed set of allowed string values
    Enumeration(Vec<String>),
    Any,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Array => write!(f, "array"),
            Self::Object => write!(f, "object"),
            Self::Enumeration(values) => write!(f, "enum[{}]", values.join(",")),
            Self::Any => write!(f, "any"),
        }
    }
}

/// Direction of a type change between two contract versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTransition {
    /// New type accepts every value the old type accepted
    Widening,
    /// New type accepts a strict subset of the old values
    Narrowing,
    /// No subset relation between old and new
    Unrelated,
}

impl TypeTransition {
    /// Classify the transition from `old` to `new`.
    pub fn between(old: &FieldType, new: &FieldType) -> Self {
        use FieldType::*;

        if old == new {
            return Self::Widening;
        }

        match (old, new) {
            (Integer, Number) => Self::Widening,
            (Number, Integer) => Self::Narrowing,
            (Enumeration(_), String) => Self::Widening,
            (String, Enumeration(_)) => Self::Narrowing,
            (Enumeration(a), Enumeration(b)) => {
                let a: BTreeSet<_> = a.iter().collect();
                let b: BTreeSet<_> = b.iter().collect();
                if a.is_subset(&b) {
                    Self::Widening
                } else if b.is_subset(&a) {
                    Self::Narrowing
                } else {
                    Self::Unrelated
                }
            }
            (_, Any) => Self::Widening,
            _ => Self::Unrelated,
        }
    }
}

/// Where a parameter is carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamLocation {
    Query,
    Path,
    Header,
}

impl ParamLocation {
    pub const ALL: [Self; 3] = [Self::Query, Self::Path, Self::Header];
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Query => "query",
            Self::Path => "path",
            Self::Header => "header",
        };
        write!(f, "{}", name)
    }
}

/// One declared operation parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub data_type: FieldType,
    pub required: bool,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        location: ParamLocation,
        data_type: FieldType,
        required: bool,
    ) -> Self {
        Self { name: name.into(), location, data_type, required }
    }
}

/// One named field of a request or response schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub data_type: FieldType,
    pub required: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, data_type: FieldType, required: bool) -> Self {
        Self { name: name.into(), data_type, required }
    }
}

/// Flat field set of a request or response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaShape {
    pub fields: Vec<FieldDef>,
}

impl SchemaShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One operation of a contract
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub parameters: Vec<Parameter>,
    pub request: Option<SchemaShape>,
    pub responses: BTreeMap<u16, SchemaShape>,
}

impl Operation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_request(mut self, shape: SchemaShape) -> Self {
        self.request = Some(shape);
        self
    }

    pub fn with_response(mut self, status: u16, shape: SchemaShape) -> Self {
        self.responses.insert(status, shape);
        self
    }
}

/// A versioned API description, immutable once loaded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractDocument {
    pub title: String,
    pub version: String,
    pub operations: BTreeMap<OperationId, Operation>,
}

impl ContractDocument {
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self { title: title.into(), version: version.into(), operations: BTreeMap::new() }
    }

    pub fn with_operation(mut self, id: OperationId, operation: Operation) -> Self {
        self.operations.insert(id, operation);
        self
    }

    pub fn operation(&self, id: &OperationId) -> Option<&Operation> {
        self.operations.get(id)
    }

    /// Structural validation. A failure here aborts a healing run before
    /// anything is diffed or applied.
    pub fn validate(&self) -> Result<()> {
        for (id, operation) in &self.operations {
            if id.path.is_empty() || !id.path.starts_with('/') {
                return Err(ContractError::Malformed(format!(
                    "operation path must start with '/': '{}'",
                    id.path
                )));
            }

            let mut seen = BTreeSet::new();
            for parameter in &operation.parameters {
                if parameter.name.is_empty() {
                    return Err(ContractError::Malformed(format!(
                        "{}: parameter with empty name",
                        id
                    )));
                }
                if !seen.insert((parameter.location, parameter.name.clone())) {
                    return Err(ContractError::Malformed(format!(
                        "{}: duplicate parameter '{}'",
                        id, parameter.name
                    )));
                }
            }

            for (status, shape) in &operation.responses {
                if !(100..=599).contains(status) {
                    return Err(ContractError::Malformed(format!(
                        "{}: response status {} out of range",
                        id, status
                    )));
                }
                for field in &shape.fields {
                    if field.name.is_empty() {
                        return Err(ContractError::Malformed(format!(
                            "{}: response {} has a field with empty name",
                            id, status
                        )));
                    }
                }
            }

            if let Some(request) = &operation.request {
                for field in &request.fields {
                    if field.name.is_empty() {
                        return Err(ContractError::Malformed(format!(
                            "{}: request body has a field with empty name",
                            id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
