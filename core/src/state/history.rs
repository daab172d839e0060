use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success,
    Failure { error_id: Option<u64> },
}

/// One tool execution, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionEntry {
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: ExecutionOutcome,
}

impl ExecutionEntry {
    pub(crate) fn success(tool_name: &str) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            timestamp: Utc::now(),
            outcome: ExecutionOutcome::Success,
        }
    }

    pub(crate) fn failure(tool_name: &str, error_id: Option<u64>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            timestamp: Utc::now(),
            outcome: ExecutionOutcome::Failure { error_id },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Failure { .. })
    }
}

/// If a success of `tool_name` right now would complete an auto-fix, returns
/// the journal id of the failure it fixes.
///
/// Only the immediately preceding execution counts: a failure of tool X
/// followed by a success of tool Y and then of X is not an auto-fix.
pub(crate) fn auto_fix_candidate(history: &[ExecutionEntry], tool_name: &str) -> Option<u64> {
    match history.last() {
        Some(ExecutionEntry {
            tool_name: previous,
            outcome: ExecutionOutcome::Failure { error_id },
            ..
        }) if previous == tool_name => *error_id,
        _ => None,
    }
}

/// Counts failures that were immediately followed by a success of the same
/// tool, by the same rule as [`auto_fix_candidate`].
pub(crate) fn count_auto_fixes(history: &[ExecutionEntry]) -> usize {
    history
        .windows(2)
        .filter(|pair| {
            pair[1].outcome == ExecutionOutcome::Success
                && auto_fix_candidate(&pair[..1], &pair[1].tool_name).is_some()
        })
        .count()
}
