//! Bounded history of tool failures.
//!
//! Each failure observed by the dispatch loop is recorded with the text the
//! model saw, the raw diagnostic the tool produced and a snapshot of the
//! conversation at the time. The journal is a ring buffer: once `capacity`
//! records are held, recording a new one evicts the oldest. Ids are assigned
//! from a monotonically increasing counter and are never reused, so an id held
//! by the conversation state either resolves to its record or to nothing.

use std::collections::VecDeque;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::config::DEFAULT_ERROR_JOURNAL_CAPACITY;
use crate::tools::context::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The model asked for a tool the registry does not know.
    ToolNotFound,
    /// The tool ran and reported failure.
    ToolExecutionFailure,
    /// The tool raised unexpectedly.
    ToolExecutionException,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ToolNotFound => "tool_not_found",
            ErrorKind::ToolExecutionFailure => "tool_execution_failure",
            ErrorKind::ToolExecutionException => "tool_execution_exception",
        }
    }
}

/// State of the conversation when a failure was recorded.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ContextSnapshot {
    pub current_artifact: Option<String>,
    pub last_visualization_tool: Option<String>,
    /// Raw arguments of the failing call.
    pub arguments: String,
    pub consecutive_errors: u32,
    pub message_count: usize,
}

/// Failure details supplied by the caller of [`ErrorJournal::record`].
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetails {
    pub kind: ErrorKind,
    pub category: Option<FailureKind>,
    pub raw_message: String,
    pub diagnostic: Option<String>,
    pub user_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub kind: ErrorKind,
    pub category: Option<FailureKind>,
    pub raw_message: String,
    pub diagnostic: Option<String>,
    pub user_message: String,
    pub context: ContextSnapshot,
    auto_fixed: bool,
}

impl ErrorRecord {
    /// Whether a later success of the same tool resolved this failure.
    pub fn auto_fixed(&self) -> bool {
        self.auto_fixed
    }
}

#[derive(Debug, Clone)]
pub struct ErrorJournal {
    records: VecDeque<ErrorRecord>,
    capacity: usize,
    next_id: u64,
}

impl Default for ErrorJournal {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_JOURNAL_CAPACITY)
    }
}

impl ErrorJournal {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    /// Appends a record, evicting the oldest one when full, and returns it so
    /// the caller can keep its id.
    pub fn record(
        &mut self,
        tool_name: &str,
        details: ErrorDetails,
        context: ContextSnapshot,
    ) -> &ErrorRecord {
        let ErrorDetails {
            kind,
            category,
            raw_message,
            diagnostic,
            user_message,
        } = details;

        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);

        while self.records.len() >= self.capacity {
            match self.records.pop_front() {
                Some(evicted) => {
                    tracing::trace!(error_id = evicted.id, "evicting oldest error record");
                }
                None => break,
            }
        }

        self.records.push_back(ErrorRecord {
            id,
            timestamp: Utc::now(),
            tool_name: tool_name.to_string(),
            kind,
            category,
            raw_message,
            diagnostic,
            user_message,
            context,
            auto_fixed: false,
        });
        &self.records[self.records.len() - 1]
    }

    /// Flags record `id` as auto-fixed. Returns `true` only for the call that
    /// flipped the flag; unknown or evicted ids and records already flagged
    /// return `false`.
    pub fn mark_auto_fixed(&mut self, id: u64) -> bool {
        match self.records.iter_mut().find(|record| record.id == id) {
            Some(record) if !record.auto_fixed => {
                record.auto_fixed = true;
                true
            }
            _ => false,
        }
    }

    pub fn get_by_id(&self, id: u64) -> Option<&ErrorRecord> {
        // Ids are assigned in insertion order, so the offset from the oldest
        // retained id is the index.
        let first = self.records.front()?.id;
        let idx = usize::try_from(id.checked_sub(first)?).ok()?;
        self.records.get(idx).filter(|record| record.id == id)
    }

    pub fn get_last(&self) -> Option<&ErrorRecord> {
        self.records.back()
    }

    /// Records from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    /// Up to `n` of the most recent records, newest first.
    pub fn recent(&self, n: usize) -> Vec<&ErrorRecord> {
        self.records.iter().rev().take(n).collect()
    }

    pub fn auto_fixed_count(&self) -> usize {
        self.records.iter().filter(|record| record.auto_fixed).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
