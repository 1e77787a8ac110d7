//! The per-run execution log.
//!
//! Every real filter dispatch produces one [`LogEntry`] stamped with
//! elapsed time and success. The buffer is cleared at the start of each
//! `execute`, so it always describes the most recent run. Filters
//! receive their in-flight entry and may attach notes to it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::command::PipelineCommand;

/// One dispatched command's record in the execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Normalized qualified name of the dispatched command.
    pub command_name: String,

    /// The source text the command was parsed from.
    pub command_text: String,

    /// The source text of the factory-matched command this one was
    /// emitted from, if any.
    pub factory_source: Option<String>,

    /// Wall-clock time spent in the dispatch, including hooks.
    pub elapsed: Duration,

    /// Whether the dispatch completed and its output was stored.
    pub success: bool,

    /// Free-form notes attached by the filter body.
    pub notes: Vec<String>,
}

impl LogEntry {
    /// Start an entry for a command about to be dispatched.
    pub(crate) fn begin(command: &PipelineCommand) -> Self {
        Self {
            command_name: command.normalized_name(),
            command_text: command.original_text.clone(),
            factory_source: command.factory_source.clone(),
            elapsed: Duration::ZERO,
            success: false,
            notes: Vec::new(),
        }
    }

    /// Attach a note to this entry.
    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }
}

/// The ordered buffer of log entries for one pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// The entries recorded by the most recent run, in dispatch order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent entry, if any.
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_captures_provenance() {
        let cmd = PipelineCommand::new("Text.Append")
            .with_text("Text.Append BAR")
            .with_arg(0, "BAR");
        let mut entry = LogEntry::begin(&cmd);

        assert_eq!(entry.command_name, "text.append");
        assert_eq!(entry.command_text, "Text.Append BAR");
        assert!(entry.factory_source.is_none());
        assert!(!entry.success);

        entry.note("retried once");
        assert_eq!(entry.notes, vec!["retried once"]);
    }

    #[test]
    fn test_log_clear_and_push() {
        let mut log = ExecutionLog::new();
        assert!(log.is_empty());

        let cmd = PipelineCommand::new("text.upper");
        log.push(LogEntry::begin(&cmd));
        log.push(LogEntry::begin(&cmd));
        assert_eq!(log.len(), 2);
        assert_eq!(log.last().unwrap().command_name, "text.upper");

        log.clear();
        assert!(log.is_empty());
    }
}
