//! Schema & tool adapter.
//!
//! Discovers the operations a provider exposes, resolves a step's target to one of them,
//! validates and coerces its input, and flattens provider result envelopes.

mod adapter;
mod catalog;
mod normalize;
mod resolve;
mod validate;

pub use adapter::{ResolvedOperation, SchemaAdapter, Selection};
pub use catalog::SchemaCatalog;
pub use normalize::normalize_result;
pub use validate::{into_arguments, validate_arguments};

use crate::types::CallError;
use thiserror::Error;

/// Errors from discovery, resolution and input validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Operation not found on provider '{provider}': {operation}")]
    OperationNotFound { provider: String, operation: String },

    #[error("Discovery failed for provider '{provider}': {source}")]
    Discovery {
        provider: String,
        #[source]
        source: CallError,
    },

    #[error("Invalid input for '{operation}': {reason}")]
    InvalidInput { operation: String, reason: String },
}

impl SchemaError {
    pub(crate) fn invalid_input(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}
