use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::artifact_store::ArtifactStore;
use crate::client::ModelClient;
use crate::config::Config;
use crate::dispatch::OutputMode;
use crate::dispatch::ToolDispatchGraph;
use crate::dispatch::TurnEnd;
use crate::error::Result;
use crate::error_journal::ErrorJournal;
use crate::fast_path::FastPath;
use crate::fast_path::FastPathResult;
use crate::models::TurnRecord;
use crate::state::ContextSummary;
use crate::state::ConversationState;
use crate::state::ExecutionStats;
use crate::tools::registry::ToolRegistry;

/// Outcome of [`ConversationSession::clear`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub removed: usize,
    /// Artifacts the store could not delete, with the reason.
    pub failed: Vec<(String, String)>,
}

/// One conversation, driven turn by turn.
///
/// `send` takes `&mut self`, so a session cannot run two turns at once.
/// Independent sessions only share the read-only tool registry and may run
/// concurrently.
pub struct ConversationSession {
    state: ConversationState,
    journal: ErrorJournal,
    graph: ToolDispatchGraph,
    fast_path: FastPath,
    artifact_store: Arc<dyn ArtifactStore>,
    mode: OutputMode,
    last_turn_end: Option<TurnEnd>,
}

impl ConversationSession {
    pub fn new(
        config: &Config,
        client: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        artifact_store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            state: ConversationState::new(),
            journal: ErrorJournal::new(config.error_journal_capacity),
            graph: ToolDispatchGraph::from_config(config, client, Arc::clone(&registry)),
            fast_path: FastPath::new(registry),
            artifact_store,
            mode: OutputMode {
                debug: config.debug,
                verbose: config.verbose,
            },
            last_turn_end: None,
        }
    }

    /// Handles one user utterance and returns the updated state.
    ///
    /// Parameter commands against the last visualization are applied without
    /// the model. Everything else, including commands that cannot be applied,
    /// runs the full dispatch loop. A completion-service failure is returned
    /// as an error; whatever the turn recorded before it stays in the state.
    pub async fn send(&mut self, utterance: &str) -> Result<&ConversationState> {
        match self
            .fast_path
            .try_apply(utterance, &mut self.state, &mut self.journal)
            .await
        {
            FastPathResult::Applied(command) => {
                debug!(parameter = command.parameter.as_str(), "handled by fast path");
                self.last_turn_end = Some(TurnEnd::Answered);
                return Ok(&self.state);
            }
            FastPathResult::Failed(reason) => {
                debug!(%reason, "fast path declined after re-render failure");
            }
            FastPathResult::NoVisualization | FastPathResult::NoMatch => {}
        }

        self.state.push_message(TurnRecord::user(utterance));
        self.last_turn_end = None;
        let end = self
            .graph
            .run(&mut self.state, &mut self.journal, self.mode)
            .await?;
        self.last_turn_end = Some(end);
        Ok(&self.state)
    }

    /// Starts over with a fresh state. Artifacts stay on disk and the error
    /// journal is kept.
    pub fn reset(&mut self) {
        info!(
            messages = self.state.messages().len(),
            "resetting conversation state"
        );
        self.state = ConversationState::new();
        self.last_turn_end = None;
    }

    /// Deletes every artifact created this session, then resets. Deletion
    /// failures are reported but do not stop the rest.
    pub async fn clear(&mut self) -> ClearReport {
        let mut report = ClearReport::default();
        let paths: Vec<String> = self
            .state
            .session_artifacts()
            .map(str::to_string)
            .collect();
        for path in paths {
            match self.artifact_store.delete(&path).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "failed to delete artifact");
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        self.reset();
        report
    }

    pub fn last_response(&self) -> Option<&str> {
        self.state.last_response()
    }

    pub fn context_summary(&self) -> ContextSummary {
        self.state.summary()
    }

    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats::from_history(self.state.execution_history())
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn journal(&self) -> &ErrorJournal {
        &self.journal
    }

    /// How the most recent full-path turn ended. `None` before the first
    /// turn, after a reset, or when the last turn failed to reach the model.
    pub fn last_turn_end(&self) -> Option<TurnEnd> {
        self.last_turn_end
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.mode.debug = debug;
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.mode.verbose = verbose;
    }
}
