use crate::transport::{Response, TransportError};
use std::sync::Arc;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Key or field that caused the error (e.g., "config.max_concurrent", "input.ids[0]")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "dispatcher", "schema_registry")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the request orchestration layer.
///
/// Errors are `Clone` because a single outcome is fanned out to every caller
/// waiting on the same deduplicated query or batch window.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Cache operation on a key that was never registered. Programmer error.
    #[error("The key {key} is not registered in the cache")]
    UnregisteredKey { key: String },

    /// No validation schema is registered for the endpoint.
    #[error("No schema registered for {method} {path}")]
    SchemaMissing { path: String, method: String },

    /// The endpoint answered, but with `ok == false`.
    #[error("Request failed with HTTP {}", .response.status)]
    RequestFailed { response: Response },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(e))
    }
}

impl Error {
    pub fn unregistered(key: impl Into<String>) -> Self {
        Error::UnregisteredKey { key: key.into() }
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The failed response carried by a body-level failure, if any.
    pub fn failed_response(&self) -> Option<&Response> {
        match self {
            Error::RequestFailed { response } => Some(response),
            _ => None,
        }
    }

    /// Whether this error is a programmer error rather than a runtime condition.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Error::UnregisteredKey { .. } | Error::SchemaMissing { .. }
        )
    }
}
