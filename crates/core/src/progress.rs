//! Progress reporting for long-running chats.
//!
//! The orchestration loop emits short status lines ("thinking... (iteration 2)",
//! "using tool: execute_promql") through a [`ProgressSink`]. Sinks are
//! best-effort: an error from `emit` is logged by the caller and otherwise
//! ignored, and implementations must not block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Receives progress messages.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, message: &str) -> Result<(), String>;
}

/// Adapts a closure into a sink.
pub struct FnProgress<F>(pub F);

impl<F> ProgressSink for FnProgress<F>
where
    F: Fn(&str) -> Result<(), String> + Send + Sync,
{
    fn emit(&self, message: &str) -> Result<(), String> {
        (self.0)(message)
    }
}

/// A timestamped progress message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Records every message it receives.
#[derive(Debug, Default)]
pub struct ProgressLog {
    entries: Mutex<Vec<ProgressEntry>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything recorded so far.
    pub fn entries(&self) -> Vec<ProgressEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Just the message texts, in order.
    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }
}

impl ProgressSink for ProgressLog {
    fn emit(&self, message: &str) -> Result<(), String> {
        let mut entries = self.entries.lock().map_err(|e| e.to_string())?;
        entries.push(ProgressEntry {
            timestamp: Utc::now(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// Sends to several sinks; the first error is reported after all have run.
pub struct Tee(pub Vec<Arc<dyn ProgressSink>>);

impl ProgressSink for Tee {
    fn emit(&self, message: &str) -> Result<(), String> {
        let mut first_err = None;
        for sink in &self.0 {
            if let Err(e) = sink.emit(message) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
