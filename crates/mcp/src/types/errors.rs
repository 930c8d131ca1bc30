//! Error types for provider connections and calls.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single remote operation call.
///
/// `Transport` and `Timeout` are eligible for retry; `Operation` is the provider reporting a
/// logical failure and is never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallError {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Call to '{operation}' timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("Operation '{operation}' failed: {message}")]
    Operation { operation: String, message: String },
}

impl CallError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Create an operation error.
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallError::Transport { .. } | CallError::Timeout { .. })
    }
}

/// Failure to establish or keep a provider connection.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Provider '{name}' failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Provider '{name}' handshake failed: {reason}")]
    Handshake { name: String, reason: String },

    #[error("Provider '{name}' is unreachable after reconnect: {reason}")]
    Unreachable { name: String, reason: String },

    #[error("Provider '{name}' is disabled: {reason}")]
    Disabled { name: String, reason: String },

    #[error("Connection manager is shut down")]
    ShutDown,
}

impl ConnectionError {
    /// Create a startup failure error.
    pub fn startup_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a handshake error.
    pub fn handshake(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handshake {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors related to log capture and export.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log export failed: {reason}")]
    ExportFailed { reason: String },
}

impl LogError {
    /// Create a log export failed error.
    pub fn export_failed(reason: impl Into<String>) -> Self {
        Self::ExportFailed { reason: reason.into() }
    }
}
