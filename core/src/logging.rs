//! Injectable logger for the retry engine and upload driver.
//!
//! `TracingLogger` is the default and forwards to `tracing` under the `vsapi`
//! target. `MemoryLogger` keeps every record, for callers that want to
//! inspect what the engine reported.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Debug,
    Warning,
    Error,
}

pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "vsapi", "{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!(target: "vsapi", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "vsapi", "{message}");
    }
}

/// Records messages in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    records: Arc<Mutex<Vec<(Level, String)>>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn count(&self, level: Level) -> usize {
        self.messages(level).len()
    }

    fn push(&self, level: Level, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push((level, message.to_string()));
        }
    }
}

impl Logger for MemoryLogger {
    fn debug(&self, message: &str) {
        self.push(Level::Debug, message);
    }

    fn warning(&self, message: &str) {
        self.push(Level::Warning, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_logger_clones_share_records() {
        let logger = MemoryLogger::new();
        let handle = logger.clone();
        logger.warning("first");
        logger.error("second");
        logger.warning("third");
        assert_eq!(handle.count(Level::Warning), 2);
        assert_eq!(handle.messages(Level::Error), vec!["second".to_string()]);
    }
}
