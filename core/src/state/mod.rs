//! Session-scoped conversation state carried across turns.

mod history;
mod stats;

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::warn;

pub use history::ExecutionEntry;
pub use history::ExecutionOutcome;
pub use stats::ExecutionStats;
pub use stats::ToolStats;

use crate::error_journal::ContextSnapshot;
use crate::models::Role;
use crate::models::TurnRecord;
use crate::tools::context::AnalysisPayload;
use crate::tools::context::ResultContract;
use crate::tools::context::StatisticsPayload;
use crate::tools::context::ToolCategory;
use crate::tools::context::ToolPayload;

/// The most recent successful visualization call, so that parameter tweaks
/// can re-invoke the same tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationConfig {
    pub tool_name: String,
    pub parameters: Map<String, Value>,
}

/// Mutable record owned by one session.
///
/// The message log and execution history only ever grow; artifact and
/// visualization references are overwritten by later successes. A fresh
/// state replaces this one on reset rather than being emptied in place.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<TurnRecord>,
    current_artifact_path: Option<String>,
    last_visualization: Option<VisualizationConfig>,
    last_statistics: Option<StatisticsPayload>,
    last_analysis: Option<AnalysisPayload>,
    session_artifacts: BTreeSet<String>,
    consecutive_error_count: u32,
    execution_history: Vec<ExecutionEntry>,
    pending_error_id: Option<u64>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[TurnRecord] {
        &self.messages
    }

    pub fn current_artifact_path(&self) -> Option<&str> {
        self.current_artifact_path.as_deref()
    }

    pub fn last_visualization(&self) -> Option<&VisualizationConfig> {
        self.last_visualization.as_ref()
    }

    pub fn last_statistics(&self) -> Option<&StatisticsPayload> {
        self.last_statistics.as_ref()
    }

    pub fn last_analysis(&self) -> Option<&AnalysisPayload> {
        self.last_analysis.as_ref()
    }

    pub fn session_artifacts(&self) -> impl Iterator<Item = &str> {
        self.session_artifacts.iter().map(String::as_str)
    }

    pub fn consecutive_error_count(&self) -> u32 {
        self.consecutive_error_count
    }

    pub fn execution_history(&self) -> &[ExecutionEntry] {
        &self.execution_history
    }

    pub fn pending_error_id(&self) -> Option<u64> {
        self.pending_error_id
    }

    /// Text of the latest assistant message that is not a tool request.
    pub fn last_response(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|record| record.is_assistant_text())
            .map(|record| record.content.as_str())
    }

    pub fn user_turn_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|record| record.role == Role::User)
            .count()
    }

    pub(crate) fn push_message(&mut self, record: TurnRecord) {
        self.messages.push(record);
    }

    /// Starts a full-path turn with a fresh retry budget.
    pub(crate) fn begin_turn(&mut self) {
        self.consecutive_error_count = 0;
    }

    /// Books a tool success. Returns the journal id of the failure this
    /// success auto-fixes, if the previous execution was a failure of the
    /// same tool.
    pub(crate) fn record_tool_success(&mut self, tool_name: &str) -> Option<u64> {
        let fixed = history::auto_fix_candidate(&self.execution_history, tool_name);
        self.execution_history.push(ExecutionEntry::success(tool_name));
        self.consecutive_error_count = 0;
        self.pending_error_id = None;
        fixed
    }

    /// Books a tool failure and returns the new consecutive error count.
    pub(crate) fn record_tool_failure(&mut self, tool_name: &str, error_id: Option<u64>) -> u32 {
        self.execution_history
            .push(ExecutionEntry::failure(tool_name, error_id));
        self.consecutive_error_count = self.consecutive_error_count.saturating_add(1);
        if error_id.is_some() {
            self.pending_error_id = error_id;
        }
        self.consecutive_error_count
    }

    /// Merges a successful tool's payload into state according to the tool's
    /// category. Payloads that break the tool's declared contract are dropped.
    pub(crate) fn apply_payload(
        &mut self,
        tool_name: &str,
        category: ToolCategory,
        contract: ResultContract,
        payload: ToolPayload,
        arguments: &Map<String, Value>,
    ) {
        if !contract.accepts(&payload) {
            warn!(
                tool = tool_name,
                category = category.as_str(),
                "tool result does not match its contract; state left unchanged"
            );
            return;
        }

        match (category, payload) {
            (ToolCategory::Data, ToolPayload::Data(data)) => {
                self.session_artifacts.insert(data.artifact_path.clone());
                self.current_artifact_path = Some(data.artifact_path);
            }
            (ToolCategory::Visualization, ToolPayload::Visualization(vis)) => {
                let parameters = if vis.parameters.is_empty() {
                    arguments.clone()
                } else {
                    vis.parameters
                };
                if let Some(output) = vis.output_path {
                    self.session_artifacts.insert(output);
                }
                self.set_visualization(VisualizationConfig {
                    tool_name: tool_name.to_string(),
                    parameters,
                });
            }
            (ToolCategory::Statistics, ToolPayload::Statistics(stats)) => {
                self.last_statistics = Some(stats);
            }
            (ToolCategory::Analysis, ToolPayload::Analysis(analysis)) => {
                self.last_analysis = Some(analysis);
            }
            (_, ToolPayload::None) => {}
            (category, _) => {
                warn!(
                    tool = tool_name,
                    category = category.as_str(),
                    "tool payload does not belong to its category; state left unchanged"
                );
            }
        }
    }

    pub(crate) fn set_visualization(&mut self, config: VisualizationConfig) {
        self.last_visualization = Some(config);
    }

    pub(crate) fn snapshot(&self, arguments: &str) -> ContextSnapshot {
        ContextSnapshot {
            current_artifact: self.current_artifact_path.clone(),
            last_visualization_tool: self
                .last_visualization
                .as_ref()
                .map(|vis| vis.tool_name.clone()),
            arguments: arguments.to_string(),
            consecutive_errors: self.consecutive_error_count,
            message_count: self.messages.len(),
        }
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            user_turns: self.user_turn_count(),
            message_count: self.messages.len(),
            current_artifact_path: self.current_artifact_path.clone(),
            last_visualization: self.last_visualization.clone(),
            has_statistics: self.last_statistics.is_some(),
            has_analysis: self.last_analysis.is_some(),
            session_artifact_count: self.session_artifacts.len(),
            consecutive_error_count: self.consecutive_error_count,
            pending_error_id: self.pending_error_id,
            executions: self.execution_history.len(),
        }
    }
}

/// Read-only overview of a session, as shown by `/context`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub user_turns: usize,
    pub message_count: usize,
    pub current_artifact_path: Option<String>,
    pub last_visualization: Option<VisualizationConfig>,
    pub has_statistics: bool,
    pub has_analysis: bool,
    pub session_artifact_count: usize,
    pub consecutive_error_count: u32,
    pub pending_error_id: Option<u64>,
    pub executions: usize,
}
