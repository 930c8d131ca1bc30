//! Log entries captured from providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Where a log line came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// Standard error of a subprocess provider.
    Stderr,
    /// Lifecycle messages emitted by the connection manager.
    System,
}

/// A single captured log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source: LogSource,
    pub provider: String,
}

impl ProviderLogEntry {
    pub fn new(level: LogLevel, message: String, source: LogSource, provider: String) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message,
            source,
            provider,
        }
    }
}
