//! Ring buffer implementation for provider logs.

use crate::types::{LogLevel, ProviderLogEntry};
use std::collections::VecDeque;

/// A ring buffer for storing log entries with a maximum capacity.
#[derive(Debug)]
pub struct LogRingBuffer {
    buffer: VecDeque<ProviderLogEntry>,
    max_size: usize,
}

impl LogRingBuffer {
    /// Create a new ring buffer with the specified maximum size.
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Add a log entry, evicting the oldest entry when full.
    pub fn add_entry(&mut self, entry: ProviderLogEntry) {
        if self.max_size == 0 {
            return;
        }
        if self.buffer.len() >= self.max_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(entry);
    }

    /// Get the most recent log entries, oldest first.
    pub fn get_recent(&self, count: usize) -> Vec<ProviderLogEntry> {
        let start = self.buffer.len().saturating_sub(count);
        self.buffer.iter().skip(start).cloned().collect()
    }

    /// Get all log entries.
    pub fn get_all(&self) -> Vec<ProviderLogEntry> {
        self.buffer.iter().cloned().collect()
    }

    /// Get log entries by level.
    pub fn get_by_level(&self, level: LogLevel) -> Vec<ProviderLogEntry> {
        self.buffer.iter().filter(|entry| entry.level == level).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogSource;

    fn entry(level: LogLevel, message: &str) -> ProviderLogEntry {
        ProviderLogEntry::new(level, message.to_string(), LogSource::Stderr, "weather".to_string())
    }

    #[test]
    fn evicts_oldest_entries_when_full() {
        let mut buffer = LogRingBuffer::new(2);
        buffer.add_entry(entry(LogLevel::Info, "one"));
        buffer.add_entry(entry(LogLevel::Info, "two"));
        buffer.add_entry(entry(LogLevel::Error, "three"));

        let messages: Vec<_> = buffer.get_all().into_iter().map(|entry| entry.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(buffer.get_by_level(LogLevel::Error).len(), 1);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut buffer = LogRingBuffer::new(10);
        for message in ["a", "b", "c"] {
            buffer.add_entry(entry(LogLevel::Info, message));
        }
        let recent: Vec<_> = buffer.get_recent(2).into_iter().map(|entry| entry.message).collect();
        assert_eq!(recent, vec!["b", "c"]);
        assert_eq!(buffer.get_recent(50).len(), 3);
    }
}
