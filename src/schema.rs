//! Per-endpoint input schemas (JSON Schema, draft 7).

use crate::key::Endpoint;
use crate::{Error, ErrorContext, Result};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::collections::HashMap;

/// Input schemas keyed by endpoint.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: HashMap<Endpoint, JSONSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and store the schema for `endpoint`, replacing any previous one.
    pub fn insert(&mut self, endpoint: Endpoint, schema: &Value) -> Result<()> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("failed to compile schema: {e}"),
                    ErrorContext::new()
                        .with_field_path(endpoint.to_string())
                        .with_source("schema_registry"),
                )
            })?;
        self.schemas.insert(endpoint, compiled);
        Ok(())
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.schemas.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Check `input` against the endpoint's schema.
    ///
    /// Fails with [`Error::SchemaMissing`] when none is registered.
    pub fn validate(&self, endpoint: &Endpoint, input: &Value) -> Result<()> {
        let schema = self.schemas.get(endpoint).ok_or_else(|| Error::SchemaMissing {
            path: endpoint.path.clone(),
            method: endpoint.method.to_string(),
        })?;

        if let Err(errors) = schema.validate(input) {
            let mut first_path = None;
            let messages: Vec<String> = errors
                .map(|e| {
                    if first_path.is_none() {
                        first_path = Some(e.instance_path.to_string());
                    }
                    e.to_string()
                })
                .collect();
            let mut ctx = ErrorContext::new()
                .with_details(messages.join("; "))
                .with_source("schema_registry");
            if let Some(path) = first_path.filter(|p| !p.is_empty()) {
                ctx = ctx.with_field_path(path);
            }
            return Err(Error::validation_with_context(
                format!("input for {endpoint} does not match its schema"),
                ctx,
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("endpoints", &self.schemas.keys().collect::<Vec<_>>())
            .finish()
    }
}
