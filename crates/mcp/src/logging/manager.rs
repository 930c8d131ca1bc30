//! Per-provider log buffers and stderr capture.

use crate::logging::LogRingBuffer;
use crate::types::{LogError, LogLevel, LogSource, ProviderLogEntry};
use relay_util::redact_sensitive_with;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_MAX_LOG_ENTRIES_PER_PROVIDER: usize = 1000;

/// Stores captured log lines for every provider.
#[derive(Debug)]
pub struct LogManager {
    buffers: Arc<Mutex<HashMap<String, LogRingBuffer>>>,
    max_entries_per_provider: usize,
}

impl LogManager {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_LOG_ENTRIES_PER_PROVIDER)
    }

    /// Constructs a manager keeping at most `max_entries_per_provider` lines per provider.
    pub fn with_capacity(max_entries_per_provider: usize) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(HashMap::new())),
            max_entries_per_provider,
        }
    }

    /// Adds a log entry to the provider-specific ring buffer.
    pub async fn add_log(&self, provider: &str, entry: ProviderLogEntry) {
        let mut buffers = self.buffers.lock().await;
        buffers
            .entry(provider.to_string())
            .or_insert_with(|| LogRingBuffer::new(self.max_entries_per_provider))
            .add_entry(entry);
    }

    /// Records a lifecycle message for `provider`.
    pub async fn add_system_log(&self, provider: &str, level: LogLevel, message: impl Into<String>) {
        let entry = ProviderLogEntry::new(level, message.into(), LogSource::System, provider.to_string());
        self.add_log(provider, entry).await;
    }

    /// Returns up to `count` most recent log entries for `provider`, with secrets redacted.
    pub async fn get_recent_logs(&self, provider: &str, count: usize) -> Vec<ProviderLogEntry> {
        let buffers = self.buffers.lock().await;
        buffers
            .get(provider)
            .map_or_else(Vec::new, |buffer| buffer.get_recent(count))
            .into_iter()
            .map(redact_entry)
            .collect()
    }

    /// Clears all buffered entries for `provider`.
    pub async fn clear_logs(&self, provider: &str) {
        let mut buffers = self.buffers.lock().await;
        if let Some(buffer) = buffers.get_mut(provider) {
            buffer.clear();
        }
    }

    /// Exports all logs for `provider` as redacted text lines.
    pub async fn export_logs(&self, provider: &str, path: &Path) -> Result<(), LogError> {
        let logs = {
            let buffers = self.buffers.lock().await;
            buffers.get(provider).map_or_else(Vec::new, LogRingBuffer::get_all)
        };
        let mut content = String::new();
        for entry in logs {
            content.push_str(&format_entry(&entry));
            content.push('\n');
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|error| LogError::export_failed(error.to_string()))
    }

    /// Spawn a background task that forwards a provider's stderr lines into its buffer.
    pub fn spawn_stderr_logger<R>(self: &Arc<Self>, provider: String, stderr: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let log_manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(provider = %provider, "{}", sanitize_log_text(&line));
                let entry = ProviderLogEntry::new(LogLevel::Info, line, LogSource::Stderr, provider.clone());
                log_manager.add_log(&provider, entry).await;
            }
        });
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

fn redact_entry(mut entry: ProviderLogEntry) -> ProviderLogEntry {
    entry.message = sanitize_log_text(&entry.message);
    entry
}

fn format_entry(entry: &ProviderLogEntry) -> String {
    format!(
        "{} [{:?}] [{}] {}",
        entry.timestamp.to_rfc3339(),
        entry.level,
        entry.provider,
        sanitize_log_text(&entry.message)
    )
}

/// Redacts sensitive text for safe log display and export.
pub fn sanitize_log_text(text: &str) -> String {
    redact_sensitive_with(text, "[REDACTED]")
}
