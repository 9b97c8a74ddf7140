use super::Registry;
use crate::config::OrchestratorConfig;
use crate::dispatch::BatchPolicy;
use crate::key::{batch_key, Endpoint};
use crate::schema::SchemaRegistry;
use crate::transport::Transport;
use crate::{Error, ErrorContext, Result};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for [`Registry`].
///
/// Only the transport is required. Batching policies and schemas are fixed at
/// build time.
pub struct RegistryBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: OrchestratorConfig,
    policies: HashMap<String, Arc<dyn BatchPolicy>>,
    schemas: SchemaRegistry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            config: OrchestratorConfig::default(),
            policies: HashMap::new(),
            schemas: SchemaRegistry::new(),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the whole config. Call before [`RegistryBuilder::validate_inputs`].
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Declare how inputs for `(path, method)` may be batched.
    pub fn batch_policy(mut self, path: &str, method: Method, policy: Arc<dyn BatchPolicy>) -> Self {
        self.policies.insert(batch_key(path, &method), policy);
        self
    }

    /// Register the input schema for `(path, method)`.
    pub fn schema(mut self, path: &str, method: Method, schema: &Value) -> Result<Self> {
        self.schemas.insert(Endpoint::new(path, method), schema)?;
        Ok(self)
    }

    pub fn validate_inputs(mut self, enable: bool) -> Self {
        self.config.validate_inputs = enable;
        self
    }

    pub fn build(self) -> Result<Registry> {
        let transport = self.transport.ok_or_else(|| {
            Error::configuration_with_context(
                "registry requires a transport",
                ErrorContext::new()
                    .with_field_path("transport")
                    .with_source("registry_builder"),
            )
        })?;
        self.config.validate()?;
        tracing::debug!(
            batching = self.policies.len(),
            schemas = self.schemas.len(),
            validate_inputs = self.config.validate_inputs,
            "registry built"
        );
        Ok(Registry::from_parts(
            transport,
            self.config,
            self.policies,
            self.schemas,
        ))
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NoBatching;
    use crate::transport::Response;
    use async_trait::async_trait;

    struct Null;

    #[async_trait]
    impl Transport for Null {
        async fn request(&self, _path: &str, _method: &Method, _input: &Value) -> Result<Response> {
            Ok(Response::new(204, ""))
        }
    }

    #[test]
    fn test_transport_required() {
        let err = RegistryBuilder::new().build().unwrap_err();
        assert_eq!(err.context().unwrap().field_path.as_deref(), Some("transport"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let res = Registry::builder()
            .transport(Arc::new(Null))
            .config(OrchestratorConfig::default().with_max_concurrent(0))
            .build();
        assert!(matches!(res, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_policy_attached_to_dispatcher_key() {
        let reg = Registry::builder()
            .transport(Arc::new(Null))
            .batch_policy("/items", Method::GET, Arc::new(NoBatching))
            .build()
            .unwrap();
        assert!(reg.policies.contains_key("/items_GET"));
        assert_eq!(reg.dispatcher_count(), 0);
    }
}
