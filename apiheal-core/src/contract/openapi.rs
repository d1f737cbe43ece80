//! OpenAPI ingestion into the contract model
//!
//! Converts a parsed `openapiv3` document into a [`ContractDocument`].
//! References are skipped rather than resolved; only inline schemas
//! contribute fields.

use anyhow::{Context, Result};
use openapiv3::{OpenAPI, ParameterSchemaOrContent, ReferenceOr, Schema as OpenApiSchema};

use super::{
    ContractDocument, FieldDef, FieldType, HttpMethod, Operation, OperationId, ParamLocation,
    Parameter, SchemaShape,
};

/// Builds [`ContractDocument`] values from OpenAPI input
#[derive(Debug)]
pub struct OpenApiIngester {}

impl OpenApiIngester {
    pub fn new() -> Self {
        Self {}
    }

    /// Parse an OpenAPI document from JSON and convert it.
    pub fn parse_json(&self, content: &str) -> Result<ContractDocument> {
        let openapi: OpenAPI =
            serde_json::from_str(content).context("Failed to parse OpenAPI JSON")?;

        self.ingest(&openapi)
    }

    /// Parse an OpenAPI document from YAML and convert it.
    pub fn parse_yaml(&self, content: &str) -> Result<ContractDocument> {
        let openapi: OpenAPI =
            serde_yaml::from_str(content).context("Failed to parse OpenAPI YAML")?;

        self.ingest(&openapi)
    }

    /// Convert an already-parsed OpenAPI document.
    pub fn ingest(&self, openapi: &OpenAPI) -> Result<ContractDocument> {
        let mut contract =
            ContractDocument::new(openapi.info.title.clone(), openapi.info.version.clone());

        for (path, path_item) in &openapi.paths.paths {
            let path_item = match path_item {
                ReferenceOr::Reference { .. } => continue,
                ReferenceOr::Item(item) => item,
            };

            if let Some(operation) = &path_item.get {
                self.ingest_operation(&mut contract, path, HttpMethod::Get, operation)?;
            }
            if let Some(operation) = &path_item.post {
                self.ingest_operation(&mut contract, path, HttpMethod::Post, operation)?;
            }
            if let Some(operation) = &path_item.put {
                self.ingest_operation(&mut contract, path, HttpMethod::Put, operation)?;
            }
            if let Some(operation) = &path_item.delete {
                self.ingest_operation(&mut contract, path, HttpMethod::Delete, operation)?;
            }
            if let Some(operation) = &path_item.patch {
                self.ingest_operation(&mut contract, path, HttpMethod::Patch, operation)?;
            }
        }

        Ok(contract)
    }

    fn ingest_operation(
        &self,
        contract: &mut ContractDocument,
        path: &str,
        method: HttpMethod,
        operation: &openapiv3::Operation,
    ) -> Result<()> {
        let mut op = Operation::new();

        for param_ref in &operation.parameters {
            let param = match param_ref {
                ReferenceOr::Reference { .. } => continue,
                ReferenceOr::Item(param) => param,
            };

            let (location, param_data) = match param {
                openapiv3::Parameter::Query { parameter_data, .. } => {
                    (ParamLocation::Query, parameter_data)
                }
                openapiv3::Parameter::Path { parameter_data, .. } => {
                    (ParamLocation::Path, parameter_data)
                }
                openapiv3::Parameter::Header { parameter_data, .. } => {
                    (ParamLocation::Header, parameter_data)
                }
                openapiv3::Parameter::Cookie { .. } => continue,
            };

            let data_type = match &param_data.format {
                ParameterSchemaOrContent::Schema(ReferenceOr::Item(schema)) => {
                    self.schema_type(schema)
                }
                _ => FieldType::String,
            };

            op.parameters.push(Parameter {
                name: param_data.name.clone(),
                location,
                data_type,
                required: param_data.required,
            });
        }

        if let Some(ReferenceOr::Item(request_body)) = &operation.request_body {
            for (media_type, media) in &request_body.content {
                if media_type == "application/json" {
                    if let Some(ReferenceOr::Item(schema)) = &media.schema {
                        op.request = self.schema_shape(schema);
                    }
                }
            }
        }

        for (status_code, response_ref) in &operation.responses.responses {
            let status = match status_code {
                openapiv3::StatusCode::Code(code) => *code,
                openapiv3::StatusCode::Range(_) => continue,
            };

            let mut shape = SchemaShape::new();
            if let ReferenceOr::Item(response) = response_ref {
                for (media_type, media) in &response.content {
                    if media_type == "application/json" {
                        if let Some(ReferenceOr::Item(schema)) = &media.schema {
                            if let Some(parsed) = self.schema_shape(schema) {
                                shape = parsed;
                            }
                        }
                    }
                }
            }
            op.responses.insert(status, shape);
        }

        contract.operations.insert(OperationId::new(method, path), op);
        Ok(())
    }

    /// Flatten an object schema into a field set. Non-object schemas carry
    /// no named fields and yield `None`.
    fn schema_shape(&self, schema: &OpenApiSchema) -> Option<SchemaShape> {
        match &schema.schema_kind {
            openapiv3::SchemaKind::Type(openapiv3::Type::Object(obj)) => {
                let mut shape = SchemaShape::new();
                for (prop_name, prop_schema_ref) in &obj.properties {
                    if let ReferenceOr::Item(prop_schema) = prop_schema_ref {
                        shape.fields.push(FieldDef {
                            name: prop_name.clone(),
                            data_type: self.schema_type(prop_schema),
                            required: obj.required.contains(prop_name),
                        });
                    }
                }
                Some(shape)
            }
            _ => None,
        }
    }

    fn schema_type(&self, schema: &OpenApiSchema) -> FieldType {
        match &schema.schema_kind {
            openapiv3::SchemaKind::Type(t) => match t {
                openapiv3::Type::String(_) => FieldType::String,
                openapiv3::Type::Number(_) => FieldType::Number,
                openapiv3::Type::Integer(_) => FieldType::Integer,
                openapiv3::Type::Boolean(_) => FieldType::Boolean,
                openapiv3::Type::Array(_) => FieldType::Array,
                openapiv3::Type::Object(_) => FieldType::Object,
            },
            _ => FieldType::Any,
        }
    }
}

impl Default for OpenApiIngester {
    fn default() -> Self {
        Self::new()
    }
}
