use std::collections::BTreeMap;

use serde::Serialize;

use crate::state::history::ExecutionEntry;
use crate::state::history::count_auto_fixes;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolStats {
    pub successes: usize,
    pub failures: usize,
}

/// Aggregate view of a session's execution history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub auto_fixes: usize,
    pub per_tool: BTreeMap<String, ToolStats>,
}

impl ExecutionStats {
    pub fn from_history(history: &[ExecutionEntry]) -> Self {
        let mut stats = ExecutionStats {
            auto_fixes: count_auto_fixes(history),
            ..Default::default()
        };
        for entry in history {
            let tool = stats.per_tool.entry(entry.tool_name.clone()).or_default();
            if entry.is_failure() {
                tool.failures += 1;
                stats.failures += 1;
            } else {
                tool.successes += 1;
                stats.successes += 1;
            }
            stats.total += 1;
        }
        stats
    }

    /// Share of executions that succeeded, in percent. `None` before the
    /// first execution.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.successes as f64 * 100.0 / self.total as f64)
        }
    }
}
